//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde::Serialize;

use crate::state::SessionState;

/// What subscribers of a session are told
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Joined {
        user: String,
        joined_count: usize,
        participant_count: usize,
    },
    StatusMap {
        status: BTreeMap<String, bool>,
    },
    Proceed {
        user: String,
        proceed: bool,
    },
    Training {
        user: String,
        training: bool,
    },
    Uploaded {
        user: String,
        uploaded_count: usize,
    },
    StateChanged {
        state: SessionState,
    },
    Completed,
    Failed {
        message: String,
    },
}
