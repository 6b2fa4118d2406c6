//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;

use crypto::prelude::ByteBuffer;
use crypto::prelude::TPayload;

use super::party::Party;
use super::traits::PsiParty;
use crate::shared::ProtocolError;

/// Intersection of byte-encoded point sets
pub fn intersect_sets(sets: &[TPayload]) -> HashSet<ByteBuffer> {
    let mut it = sets.iter();
    let mut acc = match it.next() {
        Some(first) => first.iter().cloned().collect::<HashSet<ByteBuffer>>(),
        None => return HashSet::new(),
    };
    for s in it {
        let other = s.iter().collect::<HashSet<&ByteBuffer>>();
        acc.retain(|p| other.contains(p));
    }
    acc
}

/// Runs the whole protocol over parties living in one process.
///
/// Every party's set is re-encrypted by all the others, the fully keyed
/// sets are intersected, and party 0 maps the matches back to its own
/// identifiers. The result follows party 0's identifier order.
pub fn run_n_party_psi(parties: &[Party]) -> Result<Vec<String>, ProtocolError> {
    if parties.len() < 2 {
        return Err(ProtocolError::ErrorConfig(format!(
            "intersection needs at least two parties, got {}",
            parties.len()
        )));
    }
    let mut final_sets = Vec::with_capacity(parties.len());
    for owner in parties.iter() {
        let mut data = owner.encrypted_set();
        for other in parties.iter().filter(|p| p.index() != owner.index()) {
            data = other.re_encrypt(&data)?;
        }
        final_sets.push(data);
    }

    let intersection = intersect_sets(&final_sets);
    let mut seen = HashSet::new();
    let matched = parties[0]
        .fully_keyed_items(parties)
        .into_iter()
        .filter(|(point, _)| intersection.contains(point))
        .filter(|(_, id)| seen.insert(id.clone()))
        .map(|(_, id)| id)
        .collect::<Vec<String>>();
    debug!(
        "{} parties, {} matched identifiers",
        parties.len(),
        matched.len()
    );
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(index: usize, v: &[&str]) -> Party {
        Party::new(index, v.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn two_party_intersection_is_exact() {
        let a = party(0, &["1", "2", "3", "4", "5"]);
        let b = party(1, &["9", "5", "3", "1", "8"]);
        assert_eq!(run_n_party_psi(&[a, b]).unwrap(), vec!["1", "3", "5"]);
    }

    #[test]
    fn three_parties() {
        let parties = [
            party(0, &["a", "b", "c", "d"]),
            party(1, &["d", "c", "b"]),
            party(2, &["c", "x", "b"]),
        ];
        assert_eq!(run_n_party_psi(&parties).unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn empty_intersection_is_not_an_error() {
        let parties = [party(0, &["a"]), party(1, &["b"])];
        assert!(run_n_party_psi(&parties).unwrap().is_empty());
        let parties = [party(0, &[]), party(1, &["b"])];
        assert!(run_n_party_psi(&parties).unwrap().is_empty());
    }

    #[test]
    fn single_party_is_rejected() {
        assert!(run_n_party_psi(&[party(0, &["a"])]).is_err());
    }

    #[test]
    fn intersect_sets_of_bytes() {
        let b = |v: u8| ByteBuffer::from_slice(&[v]);
        let s = intersect_sets(&[vec![b(1), b(2), b(3)], vec![b(3), b(1)], vec![b(1), b(3), b(4)]]);
        assert_eq!(s.len(), 2);
        assert!(s.contains(&b(1)) && s.contains(&b(3)));
        assert!(intersect_sets(&[]).is_empty());
    }

    #[test]
    fn result_does_not_depend_on_the_keys() {
        let tables: [&[&str]; 3] = [&["a", "b", "c", "d"], &["d", "b", "q"], &["b", "d", "e"]];
        let first = tables.iter().enumerate().map(|(i, t)| party(i, t)).collect::<Vec<_>>();
        let second = tables.iter().enumerate().map(|(i, t)| party(i, t)).collect::<Vec<_>>();

        for (p, q) in first.iter().zip(second.iter()) {
            assert_ne!(p.encrypted_set(), q.encrypted_set());
        }
        assert_ne!(
            first[0].fully_keyed_items(&first)[0].0,
            second[0].fully_keyed_items(&second)[0].0
        );
        assert_eq!(run_n_party_psi(&first).unwrap(), vec!["b", "d"]);
        assert_eq!(
            run_n_party_psi(&first).unwrap(),
            run_n_party_psi(&second).unwrap()
        );
    }
}

