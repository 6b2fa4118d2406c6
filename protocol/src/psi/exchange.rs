//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use common::permutations::gen_permute_pattern;
use common::permutations::permute;
use common::timer;
use crypto::eccipher::ECCipher;
use crypto::eccipher::ECRistrettoParallel as ECRistretto;
use crypto::prelude::*;
use serde::Deserialize;
use serde::Serialize;

use super::multiparty::intersect_sets;
use super::multiparty::run_n_party_psi;
use super::party::Party;
use crate::mpc::Channel;
use crate::mpc::Runtime;
use crate::shared::ProtocolError;

/// Where the identifiers travel during the intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PsiMode {
    /// Raw identifier lists are broadcast to everybody, then every party
    /// simulates all parties locally. Discloses every identifier.
    Broadcast,
    /// Identifiers stay with their owner; only keyed points move, around
    /// a ring of parties.
    Distributed,
}

impl Default for PsiMode {
    fn default() -> Self {
        PsiMode::Distributed
    }
}

impl FromStr for PsiMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(PsiMode::Broadcast),
            "distributed" => Ok(PsiMode::Distributed),
            other => Err(ProtocolError::ErrorConfig(format!("unknown psi mode {}", other))),
        }
    }
}

impl fmt::Display for PsiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsiMode::Broadcast => write!(f, "broadcast"),
            PsiMode::Distributed => write!(f, "distributed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PsiTimings {
    pub id_exchange_secs: f64,
    pub intersection_secs: f64,
}

/// Matched identifiers in the join order every party agrees on, with
/// this party's local row of each
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intersection {
    pub identifiers: Vec<String>,
    pub rows: Vec<usize>,
    pub timings: PsiTimings,
}

impl Intersection {
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

/// Computes the intersection of every party's identifiers.
///
/// Must be called by all parties of the runtime with the same `mode`.
pub async fn intersect<C: Channel>(
    rt: &mut Runtime<C>,
    identifiers: &[String],
    mode: PsiMode,
) -> Result<Intersection, ProtocolError> {
    match mode {
        PsiMode::Broadcast => broadcast_intersect(rt, identifiers).await,
        PsiMode::Distributed => distributed_intersect(rt, identifiers).await,
    }
}

async fn broadcast_intersect<C: Channel>(
    rt: &mut Runtime<C>,
    identifiers: &[String],
) -> Result<Intersection, ProtocolError> {
    let mut t = timer::Timer::new_silent("psi");
    let everyone = (0..rt.parties()).collect::<Vec<usize>>();
    let gathered = rt
        .broadcast(Some(identifiers.to_vec()), &everyone)
        .await?;
    let id_exchange_secs = t.lap("ID Exchange");
    info!("Received user ID lists from all parties.");

    let parties = gathered
        .into_iter()
        .enumerate()
        .map(|(i, ids)| Party::new(i, ids))
        .collect::<Vec<Party>>();
    let matched = run_n_party_psi(&parties)?;

    let own_rows = identifiers
        .iter()
        .enumerate()
        .map(|(r, id)| (id.as_str(), r))
        .rev()
        .collect::<HashMap<&str, usize>>();
    let rows = matched
        .iter()
        .filter_map(|id| own_rows.get(id.as_str()).copied())
        .collect::<Vec<usize>>();
    if rows.len() != matched.len() {
        return Err(ProtocolError::ErrorData(String::from(
            "matched identifier missing from the local table",
        )));
    }
    let intersection_secs = t.lap("Intersection Computation");
    Ok(Intersection {
        identifiers: matched,
        rows,
        timings: PsiTimings {
            id_exchange_secs,
            intersection_secs,
        },
    })
}

/// Ring protocol: in round `k` each party re-encrypts the set it got from
/// its predecessor and passes it on. After `N - 1` rounds party `i` holds
/// the fully keyed set of party `i + 1`, which it publishes.
async fn distributed_intersect<C: Channel>(
    rt: &mut Runtime<C>,
    identifiers: &[String],
) -> Result<Intersection, ProtocolError> {
    let mut t = timer::Timer::new_silent("psi");
    let (me, n) = (rt.party(), rt.parties());
    let successor = (me + 1) % n;
    let predecessor = (me + n - 1) % n;

    let key = EphemeralKey::generate();
    let ec_cipher = ECRistretto::default();

    let permutation = gen_permute_pattern(identifiers.len());
    let mut shuffled = identifiers.to_vec();
    permute(&permutation, &mut shuffled);
    let mut shuffled_rows = (0..identifiers.len()).collect::<Vec<usize>>();
    permute(&permutation, &mut shuffled_rows);

    let mut current = ec_cipher.hash_encrypt_to_bytes(&shuffled, key.scalar());
    t.qps("hash+encrypt", current.len());

    for round in 1..n {
        let phase = format!("psi ring round {}", round);
        rt.send_to(successor, &phase, &current).await?;
        let received: TPayload = rt.recv_from(predecessor, &phase).await?;
        let points = ec_cipher.to_points_encrypt(&received, key.scalar())?;
        current = ec_cipher.to_bytes(&points);
    }

    let everyone = (0..n).collect::<Vec<usize>>();
    let finals = rt.broadcast(Some(current), &everyone).await?;
    let id_exchange_secs = t.lap("ID Exchange");

    let intersection = intersect_sets(&finals);
    // the set of owner `me` ended with party `me - 1`
    let own_final = &finals[predecessor];
    if own_final.len() != identifiers.len() {
        return Err(ProtocolError::ErrorData(format!(
            "own keyed set came back with {} items, expected {}",
            own_final.len(),
            identifiers.len()
        )));
    }

    let mut seen = HashSet::new();
    let mut matches = own_final
        .iter()
        .zip(shuffled_rows.iter())
        .filter(|(point, _)| intersection.contains(*point))
        .filter(|(point, _)| seen.insert((*point).clone()))
        .map(|(point, row)| (point.clone(), *row))
        .collect::<Vec<(ByteBuffer, usize)>>();
    matches.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let rows = matches.iter().map(|(_, r)| *r).collect::<Vec<usize>>();
    let intersection_secs = t.lap("Intersection Computation");
    Ok(Intersection {
        identifiers: rows.iter().map(|&r| identifiers[r].clone()).collect(),
        rows,
        timings: PsiTimings {
            id_exchange_secs,
            intersection_secs,
        },
    })
}
