//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;

use clap::App;
use clap::Arg;
use clap::ArgMatches;
use log::error;
use log::info;
use orchestrator::state::SessionState;
use orchestrator::Orchestrator;
use orchestrator::OrchestratorConfig;
use orchestrator::RunConfig;
use protocol::artifact::ResultArtifact;
use protocol::identifier::IdentifierConfig;

fn args<'a>() -> ArgMatches<'a> {
    App::new("Joint regression orchestrator")
        .version("0.1")
        .about("Runs one session: joins and uploads every input, starts the workers and waits")
        .args(&[
            Arg::with_name("input")
                .long("input")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .required(true)
                .help("user=path.csv, once per participant"),
            Arg::with_name("lead")
                .long("lead")
                .takes_value(true)
                .help("Lead user, defaults to the first input"),
            Arg::with_name("label")
                .long("label")
                .takes_value(true)
                .required(true),
            Arg::with_name("normalizer")
                .short("n")
                .takes_value(true)
                .possible_values(&["none", "minmax", "zscore"])
                .default_value("zscore"),
            Arg::with_name("regression")
                .short("r")
                .takes_value(true)
                .possible_values(&["linear", "logistic"])
                .default_value("linear"),
            Arg::with_name("lr")
                .long("lr")
                .takes_value(true)
                .default_value("0.5"),
            Arg::with_name("epochs")
                .long("epochs")
                .takes_value(true)
                .default_value("1000"),
            Arg::with_name("identifier-config")
                .long("identifier-config")
                .takes_value(true),
            Arg::with_name("verbose").long("verbose").takes_value(false),
            Arg::with_name("psi-mode")
                .long("psi-mode")
                .takes_value(true)
                .possible_values(&["distributed", "broadcast"])
                .default_value("distributed"),
            Arg::with_name("worker")
                .long("worker")
                .takes_value(true)
                .help("Worker command, overrides PPML_WORKER_BIN"),
            Arg::with_name("base-port")
                .long("base-port")
                .takes_value(true),
            Arg::with_name("upload-dir")
                .long("upload-dir")
                .takes_value(true),
            Arg::with_name("log-dir").long("log-dir").takes_value(true),
            Arg::with_name("result-dir")
                .long("result-dir")
                .takes_value(true),
        ])
        .get_matches()
}

fn parse<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match matches.value_of(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("invalid --{} '{}': {}", name, raw, e).into()),
        None => Ok(None),
    }
}

fn inputs(matches: &ArgMatches) -> Result<Vec<(String, PathBuf)>, Box<dyn std::error::Error>> {
    matches
        .values_of("input")
        .into_iter()
        .flatten()
        .map(|spec| match spec.split_once('=') {
            Some((user, path)) if !user.is_empty() && !path.is_empty() => {
                Ok((user.to_string(), PathBuf::from(path)))
            }
            _ => Err(format!("--input expects user=path.csv, got '{}'", spec).into()),
        })
        .collect()
}

fn config(matches: &ArgMatches) -> Result<OrchestratorConfig, Box<dyn std::error::Error>> {
    let mut config = OrchestratorConfig::from_env()?;
    if let Some(cmd) = matches.value_of("worker") {
        config.worker_command = cmd.split_whitespace().map(String::from).collect();
    }
    if let Some(port) = parse(matches, "base-port")? {
        config.base_port = port;
    }
    if let Some(dir) = matches.value_of("upload-dir") {
        config.upload_dir = PathBuf::from(dir);
    }
    if let Some(dir) = matches.value_of("log-dir") {
        config.log_dir = PathBuf::from(dir);
    }
    if let Some(dir) = matches.value_of("result-dir") {
        config.result_dir = PathBuf::from(dir);
    }
    Ok(config)
}

fn run_config(matches: &ArgMatches) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let mut run = RunConfig::new(matches.value_of("label").unwrap_or_default());
    if let Some(n) = parse(matches, "normalizer")? {
        run.normalizer = n;
    }
    if let Some(r) = parse(matches, "regression")? {
        run.regression = r;
    }
    if let Some(lr) = parse(matches, "lr")? {
        run.learning_rate = lr;
    }
    if let Some(epochs) = parse(matches, "epochs")? {
        run.epochs = epochs;
    }
    if let Some(mode) = parse(matches, "psi-mode")? {
        run.psi_mode = mode;
    }
    run.identifier_config = match matches.value_of("identifier-config") {
        Some(json) => Some(IdentifierConfig::from_json(json)?),
        None => None,
    };
    run.verbose = matches.is_present("verbose");
    Ok(run)
}

fn print_summary(result: &ResultArtifact) {
    let s = &result.summary;
    info!(
        "Model: {} | rows: {} | parties: {} | label: {}",
        s.model, result.config.data_count, result.config.parties, result.config.label
    );
    let metrics = [("RMSE", s.rmse), ("R2", s.r2), ("Accuracy", s.accuracy), ("F1", s.f1)];
    for (name, value) in metrics.iter() {
        if let Some(v) = value {
            info!("{}: {:.4}", name, v);
        }
    }
    if let Some(roc) = result.auc_roc_data.as_ref() {
        info!("AUC: {:.4}", roc.auc);
    }
    for c in result.coefficients.iter() {
        info!("{} ({}): {:.6}", c.feature, c.kind, c.value);
    }
    for m in s.milestone_data.iter() {
        info!("{}: {:.3} s", m.phase, m.duration_seconds);
    }
    if let Some(path) = s.model_path.as_ref() {
        info!("Model saved to {} ({})", path, s.model_size.as_deref().unwrap_or("?"));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let matches = args();

    let inputs = inputs(&matches)?;
    let lead = match matches.value_of("lead") {
        Some(lead) => lead.to_string(),
        None => inputs
            .first()
            .map(|(user, _)| user.clone())
            .ok_or("at least one --input is required")?,
    };
    let run = run_config(&matches)?;
    let orchestrator = Arc::new(Orchestrator::new(config(&matches)?));

    let id = orchestrator.create_session(&lead, inputs.len())?;
    for (user, path) in inputs.iter() {
        orchestrator.connect(&id, user)?;
        orchestrator.upload(&id, user, path)?;
    }
    let assignment = orchestrator.run(&id, &lead, run)?;

    let mut lines = match assignment.user_of(0) {
        Some(user) => Some(orchestrator.tail_log(&id, user)?),
        None => None,
    };
    let printer = tokio::spawn(async move {
        if let Some(lines) = lines.as_mut() {
            while let Some(line) = lines.recv().await {
                println!("{}", line);
            }
        }
    });

    let session = orchestrator.wait_finished(&id).await?;
    let _ = printer.await;
    match session.state {
        SessionState::Completed => {
            let result = orchestrator.result(&id)?;
            print_summary(&result);
            Ok(())
        }
        _ => {
            error!(
                "Session {} failed: {}",
                id,
                session.error_message.as_deref().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
    }
}
