//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use common::timer;

use super::approx::ln_taylor;
use super::approx::sigmoid;
use super::Hyperparameters;
use super::RegressionType;
use crate::mpc::Channel;
use crate::mpc::Runtime;
use crate::mpc::SecFxp;
use crate::shared::ProtocolError;

/// Clamp margin of predictions fed to the log approximation
pub const LOSS_EPSILON: f64 = 1e-3;

const LOG_EVERY: usize = 10;

/// Revealed parameters. For logistic regression the separately trained
/// bias is the last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub theta: Vec<f64>,
    pub regression: RegressionType,
}

impl TrainedModel {
    pub fn weights(&self) -> &[f64] {
        match self.regression {
            RegressionType::Linear => &self.theta,
            RegressionType::Logistic => &self.theta[..self.theta.len().saturating_sub(1)],
        }
    }

    pub fn bias(&self) -> Option<f64> {
        match self.regression {
            RegressionType::Linear => None,
            RegressionType::Logistic => self.theta.last().copied(),
        }
    }
}

/// Gradient descent over secret-shared rows.
///
/// The error term is `prediction - label` for both regression types, so
/// the logistic update is the least-squares gradient taken through the
/// sigmoid approximation.
#[derive(Debug, Clone)]
pub struct SecureRegression {
    params: Hyperparameters,
}

fn transpose(x: &[Vec<SecFxp>], k: usize) -> Vec<Vec<SecFxp>> {
    (0..k).map(|j| x.iter().map(|r| r[j]).collect()).collect()
}

impl SecureRegression {
    pub fn new(params: Hyperparameters) -> SecureRegression {
        SecureRegression { params }
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    async fn predict_shared<C: Channel>(
        &self,
        rt: &mut Runtime<C>,
        x: &[Vec<SecFxp>],
        theta: &[SecFxp],
        bias: SecFxp,
    ) -> Result<Vec<SecFxp>, ProtocolError> {
        let z = rt.dot(x, theta).await?;
        match self.params.regression {
            RegressionType::Linear => Ok(z),
            RegressionType::Logistic => {
                let z = z.into_iter().map(|v| v + bias).collect::<Vec<_>>();
                sigmoid(rt, &z).await
            }
        }
    }

    /// Approximate cross-entropy, revealed
    async fn logistic_loss<C: Channel>(
        &self,
        rt: &mut Runtime<C>,
        pred: &[SecFxp],
        y: &[SecFxp],
    ) -> Result<f64, ProtocolError> {
        let n = pred.len();
        let clamped = rt.clamp(pred, LOSS_EPSILON, 1.0 - LOSS_EPSILON).await?;
        let one = rt.constant(1.0);
        let mut args = clamped.clone();
        args.extend(clamped.iter().map(|p| one - *p));
        let logs = ln_taylor(rt, &args).await?;

        let mut weights = y.to_vec();
        weights.extend(y.iter().map(|v| one - *v));
        let terms = rt.mul(&weights, &logs).await?;
        let total = SecFxp::sum(&terms);
        let mean = rt.div_public(&[total], n as u64).await?;
        let loss = rt.reveal(&[-mean[0]]).await?;
        Ok(loss[0])
    }

    /// Trains on `x` (rows already carrying the constant 1.0 column) and
    /// `y`, revealing the final parameters once
    pub async fn fit<C: Channel>(
        &self,
        rt: &mut Runtime<C>,
        x: &[Vec<SecFxp>],
        y: &[SecFxp],
    ) -> Result<TrainedModel, ProtocolError> {
        let n = y.len();
        if n == 0 || x.len() != n {
            return Err(ProtocolError::ErrorData(format!(
                "cannot train on {} rows and {} labels",
                x.len(),
                n
            )));
        }
        let k = x[0].len();
        let logistic = self.params.regression == RegressionType::Logistic;
        let lr = self.params.learning_rate;
        info!("Loaded {} samples, {} features", n, k);
        info!(
            "Start {} regression with {} iterations and learning rate {}",
            self.params.regression, self.params.epochs, lr
        );
        if !self.params.verbose {
            info!("Please wait, the training process is currently on progress...");
        }

        let mut t = timer::Timer::new_silent("training");
        let columns = transpose(x, k);
        let mut theta = vec![SecFxp::zero(); k];
        let mut bias = SecFxp::zero();

        for epoch in 0..self.params.epochs {
            let pred = self.predict_shared(rt, x, &theta, bias).await?;
            let err = pred
                .iter()
                .zip(y)
                .map(|(p, l)| *p - *l)
                .collect::<Vec<SecFxp>>();

            let mut sums = rt.dot(&columns, &err).await?;
            if logistic {
                sums.push(SecFxp::sum(&err));
            }
            let grads = rt.div_public(&sums, n as u64).await?;
            let steps = rt.mul_public(&grads, lr).await?;
            for (w, s) in theta.iter_mut().zip(steps.iter()) {
                *w -= *s;
            }
            if logistic {
                bias -= steps[k];
            }

            let last = epoch + 1 == self.params.epochs;
            if self.params.verbose && (epoch % LOG_EVERY == 0 || last) {
                let mut params = theta.clone();
                if logistic {
                    params.push(bias);
                }
                let debug_theta = rt.reveal(&params).await?;
                if logistic {
                    let loss = self.logistic_loss(rt, &pred, y).await?;
                    info!(
                        "Epoch {}: theta = {:?} | loss = {:.6}",
                        epoch + 1,
                        debug_theta,
                        loss
                    );
                } else {
                    info!("Epoch {}: theta = {:?}", epoch + 1, debug_theta);
                }
            }
        }

        info!("Reaching final training epoch...");
        let mut params = theta;
        if logistic {
            params.push(bias);
        }
        let revealed = rt.reveal(&params).await.map_err(|e| {
            error!("ERROR during final reveal: {}", e);
            e
        })?;
        t.qps("epochs", self.params.epochs);
        if self.params.verbose {
            info!("Training complete. Model weights: {:?}", revealed);
        } else {
            info!("Training complete.");
        }
        Ok(TrainedModel {
            theta: revealed,
            regression: self.params.regression,
        })
    }

    /// Scores shared rows with public parameters and reveals them:
    /// values for linear, sigmoid probabilities for logistic
    pub async fn predict<C: Channel>(
        &self,
        rt: &mut Runtime<C>,
        model: &TrainedModel,
        x: &[Vec<SecFxp>],
    ) -> Result<Vec<f64>, ProtocolError> {
        let weights = model.weights();
        if x.iter().any(|r| r.len() != weights.len()) {
            return Err(ProtocolError::ErrorConfig(format!(
                "model has {} weights, rows have {} columns",
                weights.len(),
                x.first().map_or(0, |r| r.len())
            )));
        }
        let z = rt.dot_public(x, weights).await?;
        let scores = match model.bias() {
            None => z,
            Some(b) => {
                let z = z.into_iter().map(|v| rt.add_public(v, b)).collect::<Vec<_>>();
                sigmoid(rt, &z).await?
            }
        };
        rt.reveal(&scores).await
    }
}

/// Thresholds probabilities at 0.5
pub fn classify(scores: &[f64]) -> Vec<f64> {
    scores
        .iter()
        .map(|p| if *p >= 0.5 { 1.0 } else { 0.0 })
        .collect()
}
