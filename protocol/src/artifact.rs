//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::path::Path;

use common::metrics;
use common::metrics::RocCurve;
use serde::Deserialize;
use serde::Serialize;

use crate::normalizer::Normalizer;
use crate::regression::trainer::classify;
use crate::regression::trainer::TrainedModel;
use crate::regression::Hyperparameters;
use crate::regression::RegressionType;
use crate::shared::ProtocolError;

pub const RESULT_FILE: &str = "result.json";
pub const MODEL_FILE: &str = "model.bin";

/// Rows kept in the actual vs predicted sample
pub const SAMPLE_ROWS: usize = 100;

pub const INTERCEPT: &str = "intercept";
pub const BIAS: &str = "bias";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub phase: String,
    pub duration_seconds: f64,
}

impl Milestone {
    pub fn new(phase: &str, duration_seconds: f64) -> Milestone {
        Milestone {
            phase: phase.to_string(),
            duration_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub model: String,
    pub milestone_data: Vec<Milestone>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rmse: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub r2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub f1: Option<f64>,
    pub epochs: usize,
    pub lr: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model_size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub data_count: usize,
    pub parties: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub feature: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActualVsPredicted {
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
}

/// Outcome of a run as written by party 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultArtifact {
    pub summary: Summary,
    pub config: RunSummary,
    pub coefficients: Vec<Coefficient>,
    pub actual_vs_predicted: ActualVsPredicted,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auc_roc_data: Option<RocCurve>,
}

/// Names each entry of theta: one per joined feature, then the constant
/// column, then the logistic bias
pub fn coefficients(feature_names: &[String], model: &TrainedModel) -> Vec<Coefficient> {
    model
        .theta
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let (feature, kind) = match feature_names.get(i) {
                Some(name) => (name.clone(), "feature"),
                None if i == feature_names.len() => (String::from(INTERCEPT), INTERCEPT),
                None => (String::from(BIAS), BIAS),
            };
            Coefficient {
                feature,
                value: *v,
                kind: kind.to_string(),
            }
        })
        .collect()
}

/// What the label owner knows at the end of a run
pub struct ResultInputs<'a> {
    pub model: &'a TrainedModel,
    pub params: &'a Hyperparameters,
    /// Joined feature names in column order
    pub feature_names: &'a [String],
    pub label: &'a str,
    pub parties: usize,
    pub labels: &'a [f64],
    /// Values for linear, probabilities for logistic regression
    pub scores: &'a [f64],
    pub milestones: Vec<Milestone>,
}

impl ResultArtifact {
    /// Scores revealed predictions against the labels and assembles the
    /// artifact.
    pub fn build(run: ResultInputs<'_>) -> ResultArtifact {
        let ResultInputs {
            model,
            params,
            feature_names,
            label,
            parties,
            labels,
            scores,
            milestones,
        } = run;
        let mut summary = Summary {
            model: model.regression.to_string(),
            milestone_data: milestones,
            rmse: None,
            r2: None,
            accuracy: None,
            f1: None,
            epochs: params.epochs,
            lr: params.learning_rate,
            model_path: None,
            model_size: None,
        };
        let (predicted, auc_roc_data) = match model.regression {
            RegressionType::Linear => {
                summary.rmse = metrics::rmse(labels, scores);
                summary.r2 = metrics::r2(labels, scores);
                (scores.to_vec(), None)
            }
            RegressionType::Logistic => {
                let classes = classify(scores);
                summary.accuracy = metrics::accuracy(labels, &classes);
                summary.f1 = metrics::f1(labels, &classes);
                (classes, metrics::roc_curve(labels, scores))
            }
        };
        ResultArtifact {
            summary,
            config: RunSummary {
                data_count: labels.len(),
                parties,
                label: label.to_string(),
            },
            coefficients: coefficients(feature_names, model),
            actual_vs_predicted: ActualVsPredicted {
                actual: labels.iter().take(SAMPLE_ROWS).copied().collect(),
                predicted: predicted.into_iter().take(SAMPLE_ROWS).collect(),
            },
            auc_roc_data,
        }
    }

    pub fn write<T: AsRef<Path>>(&self, path: T) -> Result<(), ProtocolError> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| ProtocolError::ErrorSerialization(e.to_string()))
    }

    pub fn read<T: AsRef<Path>>(path: T) -> Result<ResultArtifact, ProtocolError> {
        let file = File::open(path.as_ref())?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ProtocolError::ErrorDeserialization(e.to_string()))
    }
}

/// Human readable file size, e.g. `1.5 KB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Everything needed to score new rows outside the secure runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub theta: Vec<f64>,
    pub regression: RegressionType,
    pub feature_names: Vec<String>,
    pub label_name: String,
    pub epochs: usize,
    pub learning_rate: f64,
    pub normalizer: Normalizer,
}

impl ModelArtifact {
    pub fn write<T: AsRef<Path>>(&self, path: T) -> Result<u64, ProtocolError> {
        let bytes = bincode::serialize(self)
            .map_err(|e| ProtocolError::ErrorSerialization(e.to_string()))?;
        fs::write(path.as_ref(), &bytes)?;
        Ok(bytes.len() as u64)
    }

    pub fn read<T: AsRef<Path>>(path: T) -> Result<ModelArtifact, ProtocolError> {
        let bytes = fs::read(path.as_ref())?;
        bincode::deserialize(&bytes).map_err(|e| ProtocolError::ErrorDeserialization(e.to_string()))
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    /// Plaintext prediction for rows holding the model's features in
    /// order. Linear models return values, logistic models return 0 or 1.
    ///
    /// The coefficients live in the normalized feature space: rows must
    /// already be scaled the way each party scaled its columns with
    /// `normalizer` before training. The per-party scaling statistics stay
    /// with their owners and are not part of the model.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ProtocolError> {
        let weights = self.feature_names.len() + 1;
        let bias = match self.regression {
            RegressionType::Linear => None,
            RegressionType::Logistic => self.theta.get(weights).copied(),
        };
        if self.theta.len() < weights {
            return Err(ProtocolError::ErrorData(format!(
                "model has {} coefficients for {} features",
                self.theta.len(),
                self.feature_names.len()
            )));
        }
        rows.iter()
            .map(|row| {
                if row.len() + 1 != weights {
                    return Err(ProtocolError::ErrorData(format!(
                        "feature dimension mismatch: got {}, expected {}",
                        row.len(),
                        weights - 1
                    )));
                }
                let z = row
                    .iter()
                    .chain(std::iter::once(&1.0))
                    .zip(self.theta.iter())
                    .map(|(x, w)| x * w)
                    .sum::<f64>();
                Ok(match bias {
                    None => z,
                    Some(b) if Self::sigmoid(z + b) >= 0.5 => 1.0,
                    Some(_) => 0.0,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn result_json_layout() {
        let model = TrainedModel {
            theta: vec![1.5, -0.5, 0.25, 0.1],
            regression: RegressionType::Logistic,
        };
        let params = Hyperparameters {
            epochs: 10,
            learning_rate: 0.5,
            regression: RegressionType::Logistic,
            verbose: false,
        };
        let labels = (0..150).map(|i| (i % 2) as f64).collect::<Vec<_>>();
        let scores = labels.iter().map(|l| 0.2 + 0.6 * l).collect::<Vec<_>>();
        let artifact = ResultArtifact::build(ResultInputs {
            model: &model,
            params: &params,
            feature_names: &names(&["age", "income"]),
            label: "will_purchase",
            parties: 3,
            labels: &labels,
            scores: &scores,
            milestones: vec![Milestone::new("Training", 1.25)],
        });
        assert_eq!(artifact.actual_vs_predicted.actual.len(), SAMPLE_ROWS);
        assert_eq!(artifact.summary.accuracy, Some(1.0));
        assert!(artifact.summary.rmse.is_none());
        assert_eq!(artifact.auc_roc_data.as_ref().map(|r| r.auc), Some(1.0));

        let kinds = artifact
            .coefficients
            .iter()
            .map(|c| c.kind.as_str())
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec!["feature", "feature", INTERCEPT, BIAS]);

        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["config"]["dataCount"], 150);
        assert_eq!(json["config"]["parties"], 3);
        assert_eq!(json["summary"]["milestoneData"][0]["durationSeconds"], 1.25);
        assert_eq!(json["coefficients"][0]["type"], "feature");
        assert!(json["summary"].get("r2").is_none());
        assert!(json.get("aucRocData").is_some());
    }

    #[test]
    fn files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelArtifact {
            theta: vec![2.0, 1.0],
            regression: RegressionType::Linear,
            feature_names: names(&["x"]),
            label_name: String::from("y"),
            epochs: 5,
            learning_rate: 0.1,
            normalizer: Normalizer::ZScore,
        };
        let path = dir.path().join(MODEL_FILE);
        let size = model.write(&path).unwrap();
        assert!(size > 0);
        assert_eq!(ModelArtifact::read(&path).unwrap(), model);
    }

    #[test]
    fn plaintext_prediction() {
        let linear = ModelArtifact {
            theta: vec![2.0, -1.0, 0.5],
            regression: RegressionType::Linear,
            feature_names: names(&["a", "b"]),
            label_name: String::from("y"),
            epochs: 1,
            learning_rate: 0.1,
            normalizer: Normalizer::None,
        };
        assert_eq!(linear.predict(&[vec![1.0, 1.0]]).unwrap(), vec![1.5]);
        assert!(linear.predict(&[vec![1.0]]).is_err());

        let logistic = ModelArtifact {
            theta: vec![3.0, 0.0, -1.0],
            regression: RegressionType::Logistic,
            feature_names: names(&["a"]),
            ..linear
        };
        assert_eq!(
            logistic.predict(&[vec![1.0], vec![-1.0]]).unwrap(),
            vec![1.0, 0.0]
        );
    }

    #[test]
    fn prediction_expects_normalized_rows() {
        let model = ModelArtifact {
            theta: vec![2.0, 5.0],
            regression: RegressionType::Linear,
            feature_names: names(&["income"]),
            label_name: String::from("y"),
            epochs: 1,
            learning_rate: 0.1,
            normalizer: Normalizer::ZScore,
        };
        let raw = vec![vec![10.0], vec![30.0]];
        let mut scaled = raw.clone();
        model.normalizer.apply(&mut scaled);
        assert_eq!(model.predict(&scaled).unwrap(), vec![3.0, 7.0]);
        assert_ne!(model.predict(&raw).unwrap(), vec![3.0, 7.0]);
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
