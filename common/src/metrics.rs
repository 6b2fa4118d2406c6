//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Plaintext evaluation of revealed predictions.
//!
//! All functions expect `actual` and `predicted` of equal length and
//! return `None` when the metric is undefined for the input.

use serde::Deserialize;
use serde::Serialize;

pub fn rmse(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum::<f64>()
        / actual.len() as f64;
    Some(mse.sqrt())
}

/// Coefficient of determination. A constant target scores 1.0 when
/// predicted exactly and 0.0 otherwise.
pub fn r2(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot = actual.iter().map(|a| (a - mean) * (a - mean)).sum::<f64>();
    let ss_res = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum::<f64>();
    if ss_tot == 0.0 {
        return Some(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Some(1.0 - ss_res / ss_tot)
}

fn is_positive(v: f64) -> bool {
    v >= 0.5
}

pub fn accuracy(actual: &[f64], predicted_labels: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted_labels.len() {
        return None;
    }
    let hits = actual
        .iter()
        .zip(predicted_labels)
        .filter(|(a, p)| is_positive(**a) == is_positive(**p))
        .count();
    Some(hits as f64 / actual.len() as f64)
}

/// F1 score of the positive class, 0.0 when there are no true positives
pub fn f1(actual: &[f64], predicted_labels: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted_labels.len() {
        return None;
    }
    let (mut tp, mut fp, mut fneg) = (0usize, 0usize, 0usize);
    for (a, p) in actual.iter().zip(predicted_labels) {
        match (is_positive(*a), is_positive(*p)) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fneg += 1,
            (false, false) => {}
        }
    }
    if tp == 0 {
        return Some(0.0);
    }
    Some(2.0 * tp as f64 / (2 * tp + fp + fneg) as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub auc: f64,
}

/// Receiver operating characteristic over every distinct score
/// threshold, starting at `(0, 0)`. Undefined when only one class is
/// present.
pub fn roc_curve(actual: &[f64], scores: &[f64]) -> Option<RocCurve> {
    if actual.len() != scores.len() {
        return None;
    }
    let positives = actual.iter().filter(|a| is_positive(**a)).count();
    let negatives = actual.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut ranked = scores
        .iter()
        .zip(actual)
        .map(|(s, a)| (*s, is_positive(*a)))
        .collect::<Vec<_>>();
    ranked.sort_by(|x, y| y.0.partial_cmp(&x.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (i, (score, label)) in ranked.iter().enumerate() {
        if *label {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_threshold = ranked.get(i + 1).map_or(true, |next| next.0 != *score);
        if last_of_threshold {
            fpr.push(fp as f64 / negatives as f64);
            tpr.push(tp as f64 / positives as f64);
        }
    }

    let auc = fpr
        .windows(2)
        .zip(tpr.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
        .sum();
    Some(RocCurve { fpr, tpr, auc })
}
