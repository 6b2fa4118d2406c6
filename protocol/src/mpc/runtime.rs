//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use crypto::fixed;
use crypto::prelude::TShare;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::channel::Channel;
use super::channel::MsgChannel;
use super::dealer::Seed;
use super::dealer::SeededDealer;
use super::share::SecFxp;
use crate::shared::ProtocolError;
use crate::shared::TFeatures;

/// Added by party 0 before a masked opening so the opened value is a
/// non-negative integer
const DIV_OFFSET: u64 = 1 << 61;

const TRUNCATION: u64 = 1 << fixed::FRACTION_BITS;

/// An in-range value plus offset plus mask stays below this bound. Any
/// opening that wrapped around the ring lands above it.
const OPENED_BOUND: u64 = 1 << 63;

/// Handle of one party on the secret-sharing substrate.
///
/// All parties must issue the same sequence of calls with the same
/// shapes; every call that communicates is a synchronisation point.
pub struct Runtime<C: Channel> {
    chan: MsgChannel<C>,
    party: usize,
    parties: usize,
    dealer: SeededDealer,
}

impl<C: Channel> Runtime<C> {
    /// Connects the parties' view of the session: party 0 draws the
    /// dealer seed and hands it to everybody else.
    pub async fn start(channel: C, party: usize, parties: usize) -> Result<Self, ProtocolError> {
        if parties < 2 || party >= parties {
            return Err(ProtocolError::ErrorConfig(format!(
                "party {} of {} is not a valid configuration",
                party, parties
            )));
        }
        let mut chan = MsgChannel(channel);
        let seed: Seed = if party == 0 {
            let mut seed = [0u8; 32];
            OsRng.fill_bytes(&mut seed);
            for p in 1..parties {
                chan.send_to(p, "seed", &seed).await?;
            }
            seed
        } else {
            chan.recv_from(0, "seed").await?
        };
        debug!("Runtime started for party {} of {}", party, parties);
        Ok(Runtime {
            chan,
            party,
            parties,
            dealer: SeededDealer::new(seed, party, parties),
        })
    }

    pub fn party(&self) -> usize {
        self.party
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    fn others(&self) -> Vec<usize> {
        (0..self.parties).filter(|p| *p != self.party).collect()
    }

    /// Publishes every sender's value to all parties; the result is
    /// ordered like `senders`
    pub async fn broadcast<T>(
        &mut self,
        value: Option<T>,
        senders: &[usize],
    ) -> Result<Vec<T>, ProtocolError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        if let Some(bad) = senders.iter().find(|s| **s >= self.parties) {
            return Err(ProtocolError::ErrorConfig(format!("no sender {}", bad)));
        }
        let mut own = None;
        if senders.contains(&self.party) {
            let v = value.ok_or_else(|| {
                ProtocolError::ErrorConfig(format!(
                    "party {} broadcasts without a value",
                    self.party
                ))
            })?;
            for p in self.others() {
                self.chan.send_to(p, "broadcast", &v).await?;
            }
            own = Some(v);
        }
        let mut out = Vec::with_capacity(senders.len());
        for &s in senders {
            if s == self.party {
                out.push(own.take().ok_or_else(|| {
                    ProtocolError::ErrorConfig(format!("sender {} listed twice", s))
                })?);
            } else {
                out.push(self.chan.recv_from(s, "broadcast").await?);
            }
        }
        Ok(out)
    }

    /// Point-to-point message to one party
    pub async fn send_to<T>(&mut self, party: usize, phase: &str, value: &T) -> Result<(), ProtocolError>
    where
        T: Serialize + Sync,
    {
        self.chan.send_to(party, phase, value).await
    }

    pub async fn recv_from<T>(&mut self, party: usize, phase: &str) -> Result<T, ProtocolError>
    where
        T: DeserializeOwned,
    {
        self.chan.recv_from(party, phase).await
    }

    /// Sends this party's shares to everybody and sums what comes back
    async fn open(&mut self, shares: &[TShare], phase: &str) -> Result<Vec<TShare>, ProtocolError> {
        for p in self.others() {
            self.chan.send_to(p, phase, &shares).await?;
        }
        let mut acc = shares.to_vec();
        for p in self.others() {
            let theirs: Vec<TShare> = self.chan.recv_vec_from(p, phase, shares.len()).await?;
            for (a, t) in acc.iter_mut().zip(theirs) {
                *a = a.wrapping_add(t);
            }
        }
        Ok(acc)
    }

    /// Secret-shares `owner`'s private values. Every party must agree on
    /// `len`; only the owner passes `Some(values)`.
    pub async fn input(
        &mut self,
        values: Option<&[f64]>,
        owner: usize,
        len: usize,
    ) -> Result<Vec<SecFxp>, ProtocolError> {
        if self.party != owner {
            let own: Vec<TShare> = self.chan.recv_vec_from(owner, "input", len).await?;
            return Ok(own.into_iter().map(SecFxp).collect());
        }
        let values = values.ok_or_else(|| {
            ProtocolError::ErrorConfig(format!("party {} inputs without values", owner))
        })?;
        if values.len() != len {
            return Err(ProtocolError::ErrorData(format!(
                "input has {} values, announced {}",
                values.len(),
                len
            )));
        }
        let mut rng = OsRng;
        let mut per_party = vec![Vec::with_capacity(len); self.parties];
        for v in values {
            for (p, s) in fixed::split(fixed::encode(*v), self.parties, &mut rng)
                .into_iter()
                .enumerate()
            {
                per_party[p].push(s);
            }
        }
        for p in self.others() {
            self.chan.send_to(p, "input", &per_party[p]).await?;
        }
        let own = std::mem::take(&mut per_party[self.party]);
        Ok(own.into_iter().map(SecFxp).collect())
    }

    /// Row-major variant of [`Runtime::input`]
    pub async fn input_matrix(
        &mut self,
        rows: Option<&TFeatures>,
        owner: usize,
        n_rows: usize,
        n_cols: usize,
    ) -> Result<Vec<Vec<SecFxp>>, ProtocolError> {
        let flat = rows.map(|r| r.iter().flatten().copied().collect::<Vec<f64>>());
        let shared = self
            .input(flat.as_deref(), owner, n_rows * n_cols)
            .await?;
        if n_cols == 0 {
            return Ok(vec![vec![]; n_rows]);
        }
        Ok(shared.chunks(n_cols).map(|c| c.to_vec()).collect())
    }

    /// Public constant as a sharing: party 0 holds the value
    pub fn constant(&self, v: f64) -> SecFxp {
        if self.party == 0 {
            SecFxp(fixed::encode(v))
        } else {
            SecFxp::zero()
        }
    }

    pub fn add_public(&self, x: SecFxp, c: f64) -> SecFxp {
        x + self.constant(c)
    }

    /// Divides each value by its public positive integer divisor.
    ///
    /// The value is masked with a dealer mask `r`, opened, divided in the
    /// clear and corrected by the shared `floor(r / d)`. Values must lie
    /// in `[-2^61, 2^61)` as raw ring elements; the result is off by at
    /// most two units in the last place. A value whose opening wrapped
    /// around the ring is reported as an error instead of a wrong quotient.
    pub async fn divide(
        &mut self,
        xs: &[SecFxp],
        divisors: &[u64],
    ) -> Result<Vec<SecFxp>, ProtocolError> {
        if xs.len() != divisors.len() || divisors.contains(&0) {
            return Err(ProtocolError::ErrorConfig(String::from(
                "one positive divisor per value is required",
            )));
        }
        let masks = self.dealer.division_masks(divisors);
        let lead = self.party == 0;
        let masked = xs
            .iter()
            .zip(masks.iter())
            .map(|(x, m)| {
                let z = x.0.wrapping_add(m.r);
                if lead {
                    z.wrapping_add(DIV_OFFSET)
                } else {
                    z
                }
            })
            .collect::<Vec<TShare>>();
        let opened = self.open(&masked, "divide").await?;
        if opened.iter().any(|c| *c >= OPENED_BOUND) {
            return Err(ProtocolError::ErrorData(String::from(
                "fixed-point overflow: a value left the supported range, normalize the features",
            )));
        }
        Ok(opened
            .iter()
            .zip(masks.iter())
            .zip(divisors)
            .map(|((c, m), d)| {
                let y = m.q.wrapping_neg();
                if lead {
                    SecFxp(y.wrapping_add(c / d).wrapping_sub(DIV_OFFSET / d))
                } else {
                    SecFxp(y)
                }
            })
            .collect())
    }

    pub async fn div_public(&mut self, xs: &[SecFxp], d: u64) -> Result<Vec<SecFxp>, ProtocolError> {
        self.divide(xs, &vec![d; xs.len()]).await
    }

    /// Drops the extra fractional bits of a raw product
    async fn truncate(&mut self, raw: Vec<TShare>) -> Result<Vec<SecFxp>, ProtocolError> {
        let xs = raw.into_iter().map(SecFxp).collect::<Vec<_>>();
        self.div_public(&xs, TRUNCATION).await
    }

    /// Beaver multiplication without truncation
    async fn beaver(&mut self, xs: &[TShare], ys: &[TShare]) -> Result<Vec<TShare>, ProtocolError> {
        let triples = self.dealer.triples(xs.len());
        let de = xs
            .iter()
            .zip(ys)
            .zip(triples.iter())
            .flat_map(|((x, y), t)| [x.wrapping_sub(t.a), y.wrapping_sub(t.b)])
            .collect::<Vec<TShare>>();
        let opened = self.open(&de, "beaver").await?;
        let lead = self.party == 0;
        Ok(triples
            .iter()
            .zip(opened.chunks(2))
            .map(|(t, de)| {
                let (d, e) = (de[0], de[1]);
                let z = t
                    .c
                    .wrapping_add(d.wrapping_mul(t.b))
                    .wrapping_add(e.wrapping_mul(t.a));
                if lead {
                    z.wrapping_add(d.wrapping_mul(e))
                } else {
                    z
                }
            })
            .collect())
    }

    pub async fn mul(&mut self, xs: &[SecFxp], ys: &[SecFxp]) -> Result<Vec<SecFxp>, ProtocolError> {
        if xs.len() != ys.len() {
            return Err(ProtocolError::ErrorConfig(String::from(
                "mul needs operands of equal length",
            )));
        }
        let xs = xs.iter().map(SecFxp::raw).collect::<Vec<_>>();
        let ys = ys.iter().map(SecFxp::raw).collect::<Vec<_>>();
        let raw = self.beaver(&xs, &ys).await?;
        self.truncate(raw).await
    }

    pub async fn mul_public(&mut self, xs: &[SecFxp], c: f64) -> Result<Vec<SecFxp>, ProtocolError> {
        let k = fixed::encode(c);
        let raw = xs.iter().map(|x| x.0.wrapping_mul(k)).collect();
        self.truncate(raw).await
    }

    /// Row-wise dot products with a secret vector, one multiplication
    /// round and one truncation for the whole batch
    pub async fn dot(
        &mut self,
        rows: &[Vec<SecFxp>],
        w: &[SecFxp],
    ) -> Result<Vec<SecFxp>, ProtocolError> {
        if rows.iter().any(|r| r.len() != w.len()) {
            return Err(ProtocolError::ErrorConfig(String::from(
                "row width differs from weight length",
            )));
        }
        let xs = rows.iter().flatten().map(SecFxp::raw).collect::<Vec<_>>();
        let ys = rows
            .iter()
            .flat_map(|_| w.iter().map(SecFxp::raw))
            .collect::<Vec<_>>();
        let products = self.beaver(&xs, &ys).await?;
        let sums = if w.is_empty() {
            vec![0; rows.len()]
        } else {
            products
                .chunks(w.len())
                .map(|c| c.iter().fold(0u64, |acc, p| acc.wrapping_add(*p)))
                .collect()
        };
        self.truncate(sums).await
    }

    /// Row-wise dot products with a public vector
    pub async fn dot_public(
        &mut self,
        rows: &[Vec<SecFxp>],
        w: &[f64],
    ) -> Result<Vec<SecFxp>, ProtocolError> {
        let w = w.iter().map(|v| fixed::encode(*v)).collect::<Vec<_>>();
        let sums = rows
            .iter()
            .map(|r| {
                r.iter()
                    .zip(w.iter())
                    .fold(0u64, |acc, (x, k)| acc.wrapping_add(x.0.wrapping_mul(*k)))
            })
            .collect();
        self.truncate(sums).await
    }

    /// Opens the signs of the given differences, each multiplied by a
    /// fresh secret positive integer so only the sign is meaningful
    async fn negative(&mut self, diffs: &[TShare]) -> Result<Vec<bool>, ProtocolError> {
        let masks = self.dealer.multipliers(diffs.len());
        let w = self.beaver(diffs, &masks).await?;
        let opened = self.open(&w, "compare").await?;
        Ok(opened.into_iter().map(|v| (v as i64) < 0).collect())
    }

    /// `x < c` for each value, as public bits
    pub async fn less_than_public(
        &mut self,
        xs: &[SecFxp],
        c: f64,
    ) -> Result<Vec<bool>, ProtocolError> {
        let c = self.constant(c);
        let diffs = xs.iter().map(|x| (*x - c).raw()).collect::<Vec<_>>();
        self.negative(&diffs).await
    }

    /// Clamps every value into `[lo, hi]`. Which values were clamped
    /// becomes public.
    pub async fn clamp(
        &mut self,
        xs: &[SecFxp],
        lo: f64,
        hi: f64,
    ) -> Result<Vec<SecFxp>, ProtocolError> {
        let (lo_s, hi_s) = (self.constant(lo), self.constant(hi));
        let diffs = xs
            .iter()
            .map(|x| (*x - lo_s).raw())
            .chain(xs.iter().map(|x| (hi_s - *x).raw()))
            .collect::<Vec<_>>();
        let bits = self.negative(&diffs).await?;
        let (below, above) = bits.split_at(xs.len());
        Ok(xs
            .iter()
            .zip(below.iter().zip(above))
            .map(|(x, (b, a))| match (b, a) {
                (true, _) => lo_s,
                (_, true) => hi_s,
                _ => *x,
            })
            .collect())
    }

    pub async fn reveal(&mut self, xs: &[SecFxp]) -> Result<Vec<f64>, ProtocolError> {
        let shares = xs.iter().map(SecFxp::raw).collect::<Vec<_>>();
        let opened = self
            .open(&shares, "reveal")
            .await
            .map_err(|e| ProtocolError::ErrorReveal(e.to_string()))?;
        Ok(opened.into_iter().map(fixed::decode).collect())
    }

    /// Waits until every party got here and hands back the transport
    pub async fn shutdown(mut self) -> Result<C, ProtocolError> {
        for p in self.others() {
            self.chan.send_to(p, "shutdown", &0u8).await?;
        }
        for p in self.others() {
            let _: u8 = self.chan.recv_from(p, "shutdown").await?;
        }
        debug!("Runtime of party {} shut down", self.party);
        Ok(self.chan.0)
    }
}
