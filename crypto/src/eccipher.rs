//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::fmt::Error;
use std::fmt::Formatter;
use std::ops::Deref;

use rand::rngs::OsRng;
use rand::RngCore;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use sha2::Sha512;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::prelude::ByteBuffer;
use crate::prelude::CompressedRistretto;
use crate::prelude::RistrettoPoint;
use crate::prelude::Scalar;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("point encoding has {0} bytes, expected 32")]
    InvalidLength(usize),
    #[error("bytes {0} do not decode to a group element")]
    InvalidPoint(String),
}

/// Base curve operations of the commutative cipher used by the PSI
///
/// The trait aims to interface sequential and parallel implementations
///
/// Actual EC curve operations are driven by [Dalek](https://doc.dalek.rs/curve25519_dalek/index.html)
pub trait ECCipher {
    type Item;

    /// Given the points on a curve, multiplies each of them by `pow`
    fn encrypt(&self, points: &[Self::Item], pow: &Scalar) -> Vec<Self::Item>;

    /// Mapping plain text to the group using Sha512
    fn hash(&self, plaintext: &[String]) -> Vec<Self::Item>;

    /// Mapping plain text to the group and multiplying the point by `key`
    fn hash_encrypt(&self, plaintext: &[String], key: &Scalar) -> Vec<Self::Item>;

    /// Serializes the points to their canonical compressed encoding
    fn to_bytes(&self, points: &[Self::Item]) -> Vec<ByteBuffer>;

    /// Multiplies and serializes the points
    fn encrypt_to_bytes(&self, points: &[Self::Item], pow: &Scalar) -> Vec<ByteBuffer>;

    /// Combining hashing, encryption and serialization in one pass
    fn hash_encrypt_to_bytes(&self, plaintext: &[String], key: &Scalar) -> Vec<ByteBuffer>;

    /// Deserializes the points, failing on the first malformed encoding
    fn to_points(&self, payload: &[ByteBuffer]) -> Result<Vec<Self::Item>, CipherError>;

    /// Deserializes the points and multiplies them by `pow`
    fn to_points_encrypt(
        &self,
        payload: &[ByteBuffer],
        pow: &Scalar,
    ) -> Result<Vec<Self::Item>, CipherError>;
}

fn hash_to_point(text: &str) -> RistrettoPoint {
    RistrettoPoint::hash_from_bytes::<Sha512>(text.as_bytes())
}

fn point_to_bytes(p: &RistrettoPoint) -> ByteBuffer {
    ByteBuffer::from_slice(&p.compress().to_bytes())
}

fn decode_point(b: &ByteBuffer) -> Result<RistrettoPoint, CipherError> {
    CompressedRistretto::from_slice(&b.buffer)
        .map_err(|_| CipherError::InvalidLength(b.buffer.len()))?
        .decompress()
        .ok_or_else(|| CipherError::InvalidPoint(b.to_string()))
}

/// Sequential impl of `ECCipher`
///
/// All transformations are single-threaded
#[derive(Default)]
pub struct ECRistrettoSequential {}

impl ECRistrettoSequential {
    pub fn new() -> ECRistrettoSequential {
        ECRistrettoSequential {}
    }
}

impl ECCipher for ECRistrettoSequential {
    type Item = RistrettoPoint;

    fn hash(&self, plaintext: &[String]) -> Vec<Self::Item> {
        plaintext.iter().map(|text| hash_to_point(text)).collect()
    }

    fn hash_encrypt(&self, plaintext: &[String], key: &Scalar) -> Vec<Self::Item> {
        plaintext
            .iter()
            .map(|text| hash_to_point(text) * key)
            .collect()
    }

    fn hash_encrypt_to_bytes(&self, plaintext: &[String], key: &Scalar) -> Vec<ByteBuffer> {
        plaintext
            .iter()
            .map(|text| point_to_bytes(&(hash_to_point(text) * key)))
            .collect()
    }

    fn encrypt(&self, points: &[Self::Item], pow: &Scalar) -> Vec<Self::Item> {
        points.iter().map(|p| p * pow).collect()
    }

    fn encrypt_to_bytes(&self, points: &[Self::Item], pow: &Scalar) -> Vec<ByteBuffer> {
        points.iter().map(|p| point_to_bytes(&(p * pow))).collect()
    }

    fn to_bytes(&self, points: &[Self::Item]) -> Vec<ByteBuffer> {
        points.iter().map(point_to_bytes).collect()
    }

    fn to_points(&self, payload: &[ByteBuffer]) -> Result<Vec<Self::Item>, CipherError> {
        payload.iter().map(decode_point).collect()
    }

    fn to_points_encrypt(
        &self,
        payload: &[ByteBuffer],
        pow: &Scalar,
    ) -> Result<Vec<Self::Item>, CipherError> {
        payload
            .iter()
            .map(|b| decode_point(b).map(|p| p * pow))
            .collect()
    }
}

/// Parallel impl of `ECCipher`
///
/// Multithreaded component happens via `rayon` crate, order of the
/// outputs always matches the order of the inputs.
///
/// # Example
///
/// ```
/// use crypto::eccipher::{gen_scalar, ECCipher, ECRistrettoParallel};
///
/// let cipher = ECRistrettoParallel::default();
/// let (k1, k2) = (gen_scalar(), gen_scalar());
/// let text = vec![String::from("alice"), String::from("bob")];
///
/// let one_way = cipher.encrypt_to_bytes(&cipher.hash_encrypt(&text, &k1), &k2);
/// let other_way = cipher.encrypt_to_bytes(&cipher.hash_encrypt(&text, &k2), &k1);
/// assert_eq!(one_way, other_way);
/// ```
#[derive(Default)]
pub struct ECRistrettoParallel {}

impl ECRistrettoParallel {
    pub fn new() -> ECRistrettoParallel {
        ECRistrettoParallel {}
    }
}

impl ECCipher for ECRistrettoParallel {
    type Item = RistrettoPoint;

    fn hash(&self, plaintext: &[String]) -> Vec<Self::Item> {
        plaintext
            .into_par_iter()
            .map(|item| hash_to_point(item))
            .collect()
    }

    /// Encryption is a two-step operation
    ///
    /// - Step1: Each string maps to the group (Sha512 is used)
    ///
    /// - Step2: The point is multiplied by `key`
    fn hash_encrypt(&self, plaintext: &[String], key: &Scalar) -> Vec<Self::Item> {
        plaintext
            .into_par_iter()
            .map_with(key, |ctx, item| hash_to_point(item) * (*ctx))
            .collect()
    }

    fn encrypt(&self, points: &[Self::Item], pow: &Scalar) -> Vec<Self::Item> {
        points
            .into_par_iter()
            .map_with(pow, |ctx, item| item * (*ctx))
            .collect()
    }

    fn to_bytes(&self, points: &[Self::Item]) -> Vec<ByteBuffer> {
        points.into_par_iter().map(point_to_bytes).collect()
    }

    fn to_points(&self, payload: &[ByteBuffer]) -> Result<Vec<Self::Item>, CipherError> {
        payload.into_par_iter().map(decode_point).collect()
    }

    fn hash_encrypt_to_bytes(&self, plaintext: &[String], key: &Scalar) -> Vec<ByteBuffer> {
        plaintext
            .into_par_iter()
            .map_with(key, |ctx, item| point_to_bytes(&(hash_to_point(item) * (*ctx))))
            .collect()
    }

    fn encrypt_to_bytes(&self, points: &[Self::Item], pow: &Scalar) -> Vec<ByteBuffer> {
        points
            .into_par_iter()
            .map_with(pow, |ctx, item| point_to_bytes(&(item * (*ctx))))
            .collect()
    }

    fn to_points_encrypt(
        &self,
        payload: &[ByteBuffer],
        pow: &Scalar,
    ) -> Result<Vec<Self::Item>, CipherError> {
        payload
            .into_par_iter()
            .map_with(pow, |ctx, item| decode_point(item).map(|p| p * (*ctx)))
            .collect()
    }
}

impl Debug for ECRistrettoSequential {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "Ristretto EC ops sequential implementation")
    }
}

impl Debug for ECRistrettoParallel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "Ristretto EC ops parallel implementation")
    }
}

/// Generates a random non-zero Scalar
///
/// the method uses the OS
/// [CSPRNG](https://rust-random.github.io/book/guide-rngs.html#cryptographically-secure-pseudo-random-number-generators-csprngs)
/// and reduces 64 uniform bytes modulo the group order.
pub fn gen_scalar() -> Scalar {
    let mut rng = OsRng;
    loop {
        let mut scalar_bytes = [0u8; 64];
        rng.fill_bytes(&mut scalar_bytes);
        let s = Scalar::from_bytes_mod_order_wide(&scalar_bytes);
        if s != Scalar::ZERO {
            return s;
        }
    }
}

/// Per-run private key of one PSI participant
///
/// The scalar is wiped when the key is dropped and never printed.
pub struct EphemeralKey(Zeroizing<Scalar>);

impl EphemeralKey {
    pub fn generate() -> EphemeralKey {
        EphemeralKey(Zeroizing::new(gen_scalar()))
    }

    pub fn scalar(&self) -> &Scalar {
        self.0.deref()
    }
}

impl Debug for EphemeralKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "EphemeralKey(<redacted>)")
    }
}

/// Product of every participant's key, the exponent of a fully keyed point
pub fn key_product<'a>(keys: impl IntoIterator<Item = &'a EphemeralKey>) -> Zeroizing<Scalar> {
    let mut acc = Zeroizing::new(Scalar::ONE);
    for k in keys {
        *acc *= k.scalar();
    }
    acc
}
