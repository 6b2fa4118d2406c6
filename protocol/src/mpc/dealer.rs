//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Correlated randomness for multiplication, division and comparison.
//!
//! Every party seeds an identical `SeededDealer` from the session seed
//! and draws the same values in the same order; each party keeps only its
//! own additive share. The arithmetic is sound, but any party can
//! recompute the other shares from the seed, so this stands in for an
//! honest preprocessing phase and gives no confidentiality on its own.

use rand::rngs::StdRng;
use rand::Rng;
use rand::RngCore;
use rand::SeedableRng;

use crypto::prelude::TShare;

/// Upper bound (exclusive) of division masks
pub const DIV_MASK_BOUND: u64 = 1 << 62;

/// Upper bound (exclusive) of comparison multipliers
pub const CMP_MASK_BOUND: u64 = 1 << 16;

pub type Seed = [u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triple {
    pub a: TShare,
    pub b: TShare,
    pub c: TShare,
}

/// Share of a mask `r` and of `floor(r / d)` for a public divisor `d`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivMask {
    pub r: TShare,
    pub q: TShare,
}

pub struct SeededDealer {
    rng: StdRng,
    party: usize,
    parties: usize,
}

impl SeededDealer {
    pub fn new(seed: Seed, party: usize, parties: usize) -> SeededDealer {
        SeededDealer {
            rng: StdRng::from_seed(seed),
            party,
            parties,
        }
    }

    /// Splits `value` and returns this party's share. Draws exactly
    /// `parties - 1` words regardless of the caller.
    fn share_of(&mut self, value: TShare) -> TShare {
        let mut own = 0u64;
        let mut acc = 0u64;
        for p in 0..self.parties - 1 {
            let s = self.rng.next_u64();
            acc = acc.wrapping_add(s);
            if p == self.party {
                own = s;
            }
        }
        if self.party == self.parties - 1 {
            own = value.wrapping_sub(acc);
        }
        own
    }

    /// Beaver triples over the raw ring: `c = a * b mod 2^64`
    pub fn triples(&mut self, n: usize) -> Vec<Triple> {
        (0..n)
            .map(|_| {
                let a = self.rng.next_u64();
                let b = self.rng.next_u64();
                Triple {
                    a: self.share_of(a),
                    b: self.share_of(b),
                    c: self.share_of(a.wrapping_mul(b)),
                }
            })
            .collect()
    }

    pub fn division_masks(&mut self, divisors: &[u64]) -> Vec<DivMask> {
        divisors
            .iter()
            .map(|&d| {
                let r = self.rng.gen_range(0..DIV_MASK_BOUND);
                DivMask {
                    r: self.share_of(r),
                    q: self.share_of(r / d),
                }
            })
            .collect()
    }

    /// Shares of secret positive integers in `[1, CMP_MASK_BOUND)`
    pub fn multipliers(&mut self, n: usize) -> Vec<TShare> {
        (0..n)
            .map(|_| {
                let m = self.rng.gen_range(1..CMP_MASK_BOUND);
                self.share_of(m)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crypto::fixed::combine;

    use super::*;

    fn dealers(n: usize) -> Vec<SeededDealer> {
        (0..n).map(|p| SeededDealer::new([7u8; 32], p, n)).collect()
    }

    #[test]
    fn triples_are_consistent() {
        let mut ds = dealers(3);
        let per_party = ds.iter_mut().map(|d| d.triples(4)).collect::<Vec<_>>();
        for i in 0..4 {
            let a = combine(&per_party.iter().map(|t| t[i].a).collect::<Vec<_>>());
            let b = combine(&per_party.iter().map(|t| t[i].b).collect::<Vec<_>>());
            let c = combine(&per_party.iter().map(|t| t[i].c).collect::<Vec<_>>());
            assert_eq!(a.wrapping_mul(b), c);
        }
    }

    #[test]
    fn division_masks_are_consistent() {
        let mut ds = dealers(2);
        let divisors = [3u64, 1 << 16, 480];
        let per_party = ds
            .iter_mut()
            .map(|d| d.division_masks(&divisors))
            .collect::<Vec<_>>();
        for (i, d) in divisors.iter().enumerate() {
            let r = combine(&[per_party[0][i].r, per_party[1][i].r]);
            let q = combine(&[per_party[0][i].q, per_party[1][i].q]);
            assert!(r < DIV_MASK_BOUND);
            assert_eq!(q, r / d);
        }
    }

    #[test]
    fn multipliers_are_positive() {
        let mut ds = dealers(4);
        let per_party = ds.iter_mut().map(|d| d.multipliers(8)).collect::<Vec<_>>();
        for i in 0..8 {
            let m = combine(&per_party.iter().map(|v| v[i]).collect::<Vec<_>>());
            assert!((1..CMP_MASK_BOUND).contains(&m));
        }
    }
}
