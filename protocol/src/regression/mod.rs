//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::shared::ProtocolError;

pub mod approx;
pub mod trainer;

pub use trainer::SecureRegression;
pub use trainer::TrainedModel;

pub const DEFAULT_EPOCHS: usize = 200;
pub const DEFAULT_LR: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionType {
    Linear,
    Logistic,
}

impl FromStr for RegressionType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(RegressionType::Linear),
            "logistic" => Ok(RegressionType::Logistic),
            other => Err(ProtocolError::ErrorConfig(format!(
                "unknown regression type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for RegressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegressionType::Linear => write!(f, "linear"),
            RegressionType::Logistic => write!(f, "logistic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub epochs: usize,
    pub learning_rate: f64,
    pub regression: RegressionType,
    /// Reveal intermediate parameters every 10 epochs for the log
    pub verbose: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LR,
            regression: RegressionType::Linear,
            verbose: false,
        }
    }
}
