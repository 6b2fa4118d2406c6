//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::shared::ProtocolError;
use crate::shared::TFeatures;

/// Per-column feature scaling applied locally before any sharing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalizer {
    None,
    MinMax,
    ZScore,
}

impl FromStr for Normalizer {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(Normalizer::None),
            "minmax" => Ok(Normalizer::MinMax),
            "zscore" => Ok(Normalizer::ZScore),
            other => Err(ProtocolError::ErrorConfig(format!(
                "Unsupported normalization method: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Normalizer::None => "none",
            Normalizer::MinMax => "minmax",
            Normalizer::ZScore => "zscore",
        };
        write!(f, "{}", s)
    }
}

impl Normalizer {
    /// Normalizes the row-major matrix in place. A constant column maps
    /// with a unit divisor.
    pub fn apply(&self, rows: &mut TFeatures) {
        let n_cols = rows.first().map_or(0, |r| r.len());
        let n = rows.len() as f64;
        for j in 0..n_cols {
            let (shift, scale) = match self {
                Normalizer::None => return,
                Normalizer::MinMax => {
                    let min = rows.iter().map(|r| r[j]).fold(f64::INFINITY, f64::min);
                    let max = rows.iter().map(|r| r[j]).fold(f64::NEG_INFINITY, f64::max);
                    (min, max - min)
                }
                Normalizer::ZScore => {
                    let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
                    let var = rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n;
                    (mean, var.sqrt())
                }
            };
            let scale = if scale == 0.0 { 1.0 } else { scale };
            for r in rows.iter_mut() {
                r[j] = (r[j] - shift) / scale;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minmax_maps_to_unit_interval() {
        let mut x = vec![vec![1.0, 5.0], vec![3.0, 5.0], vec![2.0, 5.0]];
        Normalizer::MinMax.apply(&mut x);
        assert_eq!(x, vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.5, 0.0]]);
    }

    #[test]
    fn zscore_centers_columns() {
        let mut x = vec![vec![1.0], vec![3.0]];
        Normalizer::ZScore.apply(&mut x);
        assert_eq!(x, vec![vec![-1.0], vec![1.0]]);
    }

    #[test]
    fn none_is_identity_and_parsing() {
        let mut x = vec![vec![7.0]];
        Normalizer::None.apply(&mut x);
        assert_eq!(x, vec![vec![7.0]]);
        assert_eq!("zscore".parse::<Normalizer>().unwrap(), Normalizer::ZScore);
        assert_eq!(Normalizer::MinMax.to_string(), "minmax");
        assert!("l2".parse::<Normalizer>().is_err());
    }
}
