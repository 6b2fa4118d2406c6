//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Error, Formatter};

/// Canonical byte encoding of a compressed curve point.
///
/// Equality (and ordering) of two buffers is the only comparison the
/// intersection logic relies on.
#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Debug, Serialize, Deserialize)]
pub struct ByteBuffer {
    pub buffer: Vec<u8>,
}

impl ByteBuffer {
    pub fn from_slice(v: &[u8]) -> ByteBuffer {
        ByteBuffer { buffer: v.to_vec() }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Display for ByteBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", hex::encode(&self.buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytebuffer_display() {
        let b = ByteBuffer {
            buffer: 0x12345678u32.to_le_bytes().to_vec(),
        };
        assert_eq!(
            format!("The ByteBuffer is: {}", b),
            "The ByteBuffer is: 78563412"
        );
    }

    #[test]
    fn test_bytebuffer_ordering_is_lexicographic() {
        let a = ByteBuffer::from_slice(&[0, 1, 2]);
        let b = ByteBuffer::from_slice(&[0, 2, 0]);
        assert!(a < b);
        assert_eq!(a.len(), 3);
        assert!(!a.is_empty());
    }
}
