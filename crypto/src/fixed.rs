//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Fixed-point encoding of reals into the ring Z/2^64.
//!
//! A real `x` is represented by `round(x * 2^FRACTION_BITS)` in two's
//! complement, so addition and subtraction are plain wrapping ring ops.
//! A product of two encodings carries `2 * FRACTION_BITS` fractional bits
//! and has to be divided by `SCALE` before it can be used again.

use rand_core::CryptoRng;
use rand_core::RngCore;

use crate::prelude::TShare;

pub const FRACTION_BITS: u32 = 16;
pub const SCALE: f64 = (1u64 << FRACTION_BITS) as f64;

/// Encodes a real. Values outside the representable range saturate.
pub fn encode(x: f64) -> TShare {
    (x * SCALE).round() as i64 as u64
}

pub fn decode(v: TShare) -> f64 {
    (v as i64) as f64 / SCALE
}

/// Encodes an integer without fractional scaling.
pub fn encode_int(x: i64) -> TShare {
    x as u64
}

/// Splits `value` into `n` uniformly random additive shares.
pub fn split<R: RngCore + CryptoRng>(value: TShare, n: usize, rng: &mut R) -> Vec<TShare> {
    assert!(n > 0, "cannot split into zero shares");
    let mut shares = (0..n - 1).map(|_| rng.next_u64()).collect::<Vec<_>>();
    let partial = combine(&shares);
    shares.push(value.wrapping_sub(partial));
    shares
}

pub fn combine(shares: &[TShare]) -> TShare {
    shares.iter().fold(0u64, |acc, s| acc.wrapping_add(*s))
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn encode_decode_is_exact_on_grid() {
        for x in [0.0, 1.0, -1.0, 0.5, -2.25, 1234.0625] {
            assert_eq!(decode(encode(x)), x);
        }
    }

    #[test]
    fn encoding_error_is_bounded() {
        let x = std::f64::consts::PI;
        assert!((decode(encode(x)) - x).abs() <= 0.5 / SCALE);
    }

    #[test]
    fn negative_values_wrap() {
        assert_eq!(encode(-1.0), u64::MAX - (SCALE as u64) + 1);
        assert_eq!(encode(1.5).wrapping_add(encode(-1.5)), 0);
    }

    #[test]
    fn split_then_combine() {
        let mut rng = OsRng;
        let v = encode(-3.75);
        for n in 1..5 {
            let shares = split(v, n, &mut rng);
            assert_eq!(shares.len(), n);
            assert_eq!(combine(&shares), v);
        }
    }
}
