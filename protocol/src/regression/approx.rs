//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Polynomial stand-ins for transcendental functions on shared values.

use crate::mpc::Channel;
use crate::mpc::Runtime;
use crate::mpc::SecFxp;
use crate::shared::ProtocolError;

/// Number of Taylor terms of `ln(x)` around 1
pub const LN_TERMS: u64 = 5;

/// `0.5 + x/4 - x^3/48 + x^5/480`
pub fn sigmoid_poly(x: f64) -> f64 {
    0.5 + x / 4.0 - x.powi(3) / 48.0 + x.powi(5) / 480.0
}

/// `sum_{n=1..LN_TERMS} (-1)^(n+1) (x-1)^n / n`
pub fn ln_taylor_plain(x: f64) -> f64 {
    (1..=LN_TERMS)
        .map(|n| {
            let sign = if n % 2 == 1 { 1.0 } else { -1.0 };
            sign * (x - 1.0).powi(n as i32) / n as f64
        })
        .sum()
}

/// Fifth-order sigmoid on shared values: three multiplications and one
/// batched division
pub async fn sigmoid<C: Channel>(
    rt: &mut Runtime<C>,
    xs: &[SecFxp],
) -> Result<Vec<SecFxp>, ProtocolError> {
    let n = xs.len();
    let x2 = rt.mul(xs, xs).await?;
    let x3 = rt.mul(&x2, xs).await?;
    let x5 = rt.mul(&x3, &x2).await?;

    let mut batch = Vec::with_capacity(3 * n);
    batch.extend_from_slice(xs);
    batch.extend_from_slice(&x3);
    batch.extend_from_slice(&x5);
    let mut divisors = vec![4u64; n];
    divisors.extend(vec![48u64; n]);
    divisors.extend(vec![480u64; n]);
    let terms = rt.divide(&batch, &divisors).await?;

    Ok((0..n)
        .map(|i| rt.add_public(terms[i] - terms[n + i] + terms[2 * n + i], 0.5))
        .collect())
}

/// Taylor series of `ln(x)` around 1. Only accurate close to 1; callers
/// clamp their inputs first.
pub async fn ln_taylor<C: Channel>(
    rt: &mut Runtime<C>,
    xs: &[SecFxp],
) -> Result<Vec<SecFxp>, ProtocolError> {
    let n = xs.len();
    let u = xs.iter().map(|x| rt.add_public(*x, -1.0)).collect::<Vec<_>>();

    let mut powers = u.clone();
    let mut last = u.clone();
    for _ in 1..LN_TERMS {
        last = rt.mul(&last, &u).await?;
        powers.extend_from_slice(&last);
    }
    let divisors = (1..=LN_TERMS)
        .flat_map(|k| std::iter::repeat(k).take(n))
        .collect::<Vec<u64>>();
    let terms = rt.divide(&powers, &divisors).await?;

    Ok((0..n)
        .map(|i| {
            (0..LN_TERMS as usize).fold(SecFxp::zero(), |acc, k| {
                let t = terms[k * n + i];
                if k % 2 == 0 {
                    acc + t
                } else {
                    acc - t
                }
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::tests::run_parties;

    #[test]
    fn plain_approximations() {
        assert_eq!(sigmoid_poly(0.0), 0.5);
        assert!((sigmoid_poly(1.0) - 1.0 / (1.0 + (-1.0f64).exp())).abs() < 1e-3);
        assert_eq!(ln_taylor_plain(1.0), 0.0);
        assert!((ln_taylor_plain(0.9) - 0.9f64.ln()).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_matches_plain() {
        let inputs = [-1.5, -0.2, 0.0, 0.7, 2.0];
        let out = run_parties(2, move |mut rt| async move {
            let x = rt
                .input(if rt.party() == 0 { Some(&inputs[..]) } else { None }, 0, 5)
                .await?;
            let s = sigmoid(&mut rt, &x).await?;
            let clamped = rt.clamp(&x, 0.5, 1.5).await?;
            let l = ln_taylor(&mut rt, &clamped).await?;
            let mut all = s;
            all.extend(l);
            rt.reveal(&all).await
        })
        .await;
        for v in out {
            for (i, x) in inputs.iter().enumerate() {
                assert!((v[i] - sigmoid_poly(*x)).abs() < 1e-3, "sigmoid({})", x);
                let c = x.max(0.5).min(1.5);
                assert!((v[5 + i] - ln_taylor_plain(c)).abs() < 1e-3, "ln({})", c);
            }
        }
    }
}
