//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use rand::seq::SliceRandom;
use rand::thread_rng;

/// Returns a uniformly random permutation of `0..n`
///
/// `(0 1 2 3) -> (2 3 0 1)`
pub fn gen_permute_pattern(n: usize) -> Vec<usize> {
    let mut pattern = (0..n).collect::<Vec<usize>>();
    pattern.shuffle(&mut thread_rng());
    pattern
}

/// Applies the permutation on a vector _in place_: the item at
/// position `i` moves to position `permutation[i]`
///
/// # Example
///
/// ```
/// use common::permutations;
/// let mut v = vec!['a', 'b', 'c'];
/// let p = vec![2, 0, 1];
///
/// permutations::permute(&p, &mut v);
/// assert_eq!(v, vec!['b', 'c', 'a']);
/// ```
pub fn permute<T: Clone>(permutation: &[usize], items: &mut Vec<T>) {
    assert_eq!(permutation.len(), items.len());
    let mut output = items.clone();
    for (idx, &dst) in permutation.iter().enumerate() {
        output[dst] = items[idx].clone();
    }
    *items = output;
}

/// Un-Applies the permutation on a vector _in place_
///
/// # Example
///
/// ```
/// use common::permutations;
/// let mut v = vec!['b', 'c', 'a'];
/// let p = vec![2, 0, 1];
///
/// permutations::undo_permute(&p, &mut v);
/// assert_eq!(v, vec!['a', 'b', 'c']);
/// ```
pub fn undo_permute<T: Clone>(permutation: &[usize], items: &mut Vec<T>) {
    assert_eq!(permutation.len(), items.len());
    *items = permutation.iter().map(|&src| items[src].clone()).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    const NUM_TEST_ITERATIONS: i32 = 100;

    #[test]
    fn pattern_is_a_permutation() {
        const N: usize = 50;
        for _ in 0..NUM_TEST_ITERATIONS {
            let mut p = gen_permute_pattern(N);
            p.sort_unstable();
            assert_eq!(p, (0..N).collect::<Vec<_>>());
        }
        assert!(gen_permute_pattern(0).is_empty());
    }

    #[test]
    fn permute_and_undo_permutation() {
        let v = vec!['a', 'b', 'c', 'd'];
        let p = vec![1, 0, 3, 2];

        let mut a = v.to_vec();
        permute(&p, &mut a);
        assert_eq!(a, vec!['b', 'a', 'd', 'c']);

        undo_permute(&p, &mut a);
        assert_eq!(a, v);
    }

    #[test]
    fn permute_and_undo_random_permutation() {
        const N: usize = 100;
        let v: Vec<usize> = (0..N).collect();
        for _ in 0..NUM_TEST_ITERATIONS {
            let p = gen_permute_pattern(N);

            let mut a = v.to_vec();
            permute(&p, &mut a);
            undo_permute(&p, &mut a);
            assert_eq!(a, v);
        }
    }
}
