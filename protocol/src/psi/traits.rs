//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use crypto::prelude::ByteBuffer;
use crypto::prelude::TPayload;

use crate::shared::ProtocolError;

/// One participant of the commutative-encryption intersection
pub trait PsiParty {
    fn index(&self) -> usize;

    /// Own identifiers, hashed to the group and keyed once
    fn encrypted_set(&self) -> TPayload;

    /// Multiplies every point of someone else's set by the own key
    fn re_encrypt(&self, payload: &[ByteBuffer]) -> Result<TPayload, ProtocolError>;
}
