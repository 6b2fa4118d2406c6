//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

pub use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar,
    scalar::Scalar,
};

pub use crate::eccipher::EphemeralKey;
pub use crate::spoint::ByteBuffer;

pub type Bytes = Vec<ByteBuffer>;
pub type TPayload = Bytes;
pub type TPoint = RistrettoPoint;
pub type TScalar = Scalar;

/// Raw ring element carrying one additive share of a fixed-point value
pub type TShare = u64;
