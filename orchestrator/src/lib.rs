//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod assignment;
pub mod config;
pub mod error;
pub mod events;
pub mod logtail;
pub mod results;
pub mod service;
pub mod state;
pub mod store;
pub mod supervisor;

pub use config::OrchestratorConfig;
pub use config::RunConfig;
pub use error::ErrorKind;
pub use error::SessionError;
pub use service::Orchestrator;
pub use state::can_access_path;
pub use state::SessionState;
