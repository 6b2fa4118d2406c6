//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! One party's run: load, normalize, intersect, share, train, evaluate.

use std::fs;
use std::path::PathBuf;

use common::timer;

use crate::artifact::format_size;
use crate::artifact::Milestone;
use crate::artifact::ModelArtifact;
use crate::artifact::ResultArtifact;
use crate::artifact::ResultInputs;
use crate::artifact::MODEL_FILE;
use crate::artifact::RESULT_FILE;
use crate::fileio::load_party_data;
use crate::fileio::PartyData;
use crate::identifier::IdentifierConfig;
use crate::mpc::Channel;
use crate::mpc::Runtime;
use crate::mpc::SecFxp;
use crate::normalizer::Normalizer;
use crate::psi::intersect;
use crate::psi::PsiMode;
use crate::regression::Hyperparameters;
use crate::regression::SecureRegression;
use crate::shared::ProtocolError;

pub const LABEL_OWNER: usize = 0;
pub const DEFAULT_OUTPUT_DIR: &str = "results";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub party: usize,
    pub parties: usize,
    pub normalizer: Normalizer,
    pub params: Hyperparameters,
    pub label: String,
    pub identifier_config: IdentifierConfig,
    pub psi_mode: PsiMode,
    pub output_dir: PathBuf,
}

/// What a finished worker knows; only the label owner holds a result
#[derive(Debug)]
pub struct WorkerReport {
    pub milestones: Vec<Milestone>,
    pub data_count: usize,
    pub theta: Vec<f64>,
    pub result: Option<ResultArtifact>,
}

fn load(config: &PipelineConfig) -> Result<PartyData, ProtocolError> {
    let data = load_party_data(
        &config.input,
        &config.identifier_config,
        Some(config.label.as_str()),
    )?;
    if config.party == LABEL_OWNER && data.labels.is_none() {
        return Err(ProtocolError::ErrorData(format!(
            "label column '{}' not found in {}",
            config.label,
            config.input.display()
        )));
    }
    if config.party != LABEL_OWNER {
        if let Some(name) = data.label_name.as_ref() {
            warn!(
                "Label column '{}' found on party {}, only party {} provides labels; ignoring it",
                name, config.party, LABEL_OWNER
            );
        }
    }
    Ok(data)
}

/// Secret-shares every party's columns of the intersected rows and
/// joins them side by side, followed by the constant 1.0 column
async fn share_joined<C: Channel>(
    rt: &mut Runtime<C>,
    local: &PartyData,
    widths: &[usize],
) -> Result<Vec<Vec<SecFxp>>, ProtocolError> {
    let n = local.len();
    let mut joined = vec![Vec::with_capacity(widths.iter().sum::<usize>() + 1); n];
    for (owner, width) in widths.iter().enumerate() {
        let mine = if owner == rt.party() {
            Some(&local.features)
        } else {
            None
        };
        let block = rt.input_matrix(mine, owner, n, *width).await?;
        for (row, part) in joined.iter_mut().zip(block) {
            row.extend(part);
        }
    }
    let one = rt.constant(1.0);
    for row in joined.iter_mut() {
        row.push(one);
    }
    Ok(joined)
}

fn write_artifacts(
    config: &PipelineConfig,
    model: ModelArtifact,
    result: &mut ResultArtifact,
) -> Result<(), ProtocolError> {
    fs::create_dir_all(&config.output_dir)?;
    let model_path = config.output_dir.join(MODEL_FILE);
    let size = model.write(&model_path)?;
    result.summary.model_path = Some(model_path.display().to_string());
    result.summary.model_size = Some(format_size(size));
    let result_path = config.output_dir.join(RESULT_FILE);
    result.write(&result_path)?;
    info!("Results saved to {}", result_path.display());
    Ok(())
}

/// Runs the whole worker over `channel` and hands the channel back
/// after the final barrier.
///
/// Every party must call this with matching `parties`, `params`,
/// `psi_mode` and `label`.
pub async fn run_worker<C: Channel>(
    channel: C,
    config: &PipelineConfig,
) -> Result<(WorkerReport, C), ProtocolError> {
    let me = config.party;
    let mut milestones = vec![];
    let mut t = timer::Timer::new_silent("pipeline");

    let mut local = load(config)?;
    config.normalizer.apply(&mut local.features);
    if config.normalizer != Normalizer::None {
        info!("Applied '{}' normalization.", config.normalizer);
    }
    milestones.push(Milestone::new("Data Normalization", t.lap("Data Normalization")));

    let mut rt = Runtime::start(channel, me, config.parties).await?;
    let everyone = (0..config.parties).collect::<Vec<usize>>();
    let feature_names = rt
        .broadcast(Some(local.feature_names.clone()), &everyone)
        .await?;
    let label_name = rt
        .broadcast(
            (me == LABEL_OWNER).then(|| local.label_name.clone()),
            &[LABEL_OWNER],
        )
        .await?
        .pop()
        .flatten()
        .ok_or_else(|| ProtocolError::ErrorData(String::from("label owner has no label column")))?;
    let joined_names = feature_names.concat();
    info!("Final joined features + label: {:?} + {}", joined_names, label_name);
    t.reset();

    let intersection = intersect(&mut rt, &local.identifiers, config.psi_mode).await?;
    milestones.push(Milestone::new(
        "ID Exchange",
        intersection.timings.id_exchange_secs,
    ));
    milestones.push(Milestone::new(
        "Intersection Computation",
        intersection.timings.intersection_secs,
    ));
    info!("Intersection has {} identifiers", intersection.len());
    if intersection.is_empty() {
        return Err(ProtocolError::ErrorData(String::from(
            "no common identifiers between the parties",
        )));
    }
    t.reset();

    let local = local.select_rows(&intersection.rows);
    let n = local.len();
    let widths = feature_names.iter().map(|f| f.len()).collect::<Vec<usize>>();
    let x = share_joined(&mut rt, &local, &widths).await?;
    let y = rt
        .input(
            local.labels.as_deref().filter(|_| me == LABEL_OWNER),
            LABEL_OWNER,
            n,
        )
        .await?;
    milestones.push(Milestone::new("Privacy Filtering", t.lap("Privacy Filtering")));

    let trainer = SecureRegression::new(config.params);
    let model = trainer.fit(&mut rt, &x, &y).await?;
    milestones.push(Milestone::new("Training", t.lap("Training")));

    let scores = trainer.predict(&mut rt, &model, &x).await?;
    milestones.push(Milestone::new("Evaluation", t.lap("Evaluation")));

    let result = match local.labels.as_ref().filter(|_| me == LABEL_OWNER) {
        Some(labels) => {
            let mut result = ResultArtifact::build(ResultInputs {
                model: &model,
                params: &config.params,
                feature_names: &joined_names,
                label: &label_name,
                parties: config.parties,
                labels,
                scores: &scores,
                milestones: milestones.clone(),
            });
            let artifact = ModelArtifact {
                theta: model.theta.clone(),
                regression: model.regression,
                feature_names: joined_names.clone(),
                label_name: label_name.clone(),
                epochs: config.params.epochs,
                learning_rate: config.params.learning_rate,
                normalizer: config.normalizer,
            };
            write_artifacts(config, artifact, &mut result)?;
            Some(result)
        }
        None => None,
    };

    let channel = rt.shutdown().await?;
    info!("MPC task complete");
    Ok((
        WorkerReport {
            milestones,
            data_count: n,
            theta: model.theta,
            result,
        },
        channel,
    ))
}
