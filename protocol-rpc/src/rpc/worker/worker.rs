//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::App;
use clap::Arg;
use clap::ArgMatches;
use common::timer;
use log::error;
use log::info;
use protocol::identifier::IdentifierConfig;
use protocol::normalizer::Normalizer;
use protocol::pipeline::run_worker;
use protocol::pipeline::PipelineConfig;
use protocol::pipeline::DEFAULT_OUTPUT_DIR;
use protocol::psi::PsiMode;
use protocol::regression::Hyperparameters;
use protocol::regression::RegressionType;
use rpc::connect::connect;
use rpc::connect::MeshConfig;

fn args<'a>() -> ArgMatches<'a> {
    App::new("Joint regression worker")
        .version("0.1")
        .about("One party of a private set intersection followed by secure regression")
        .args(&[
            Arg::with_name("parties")
                .short("M")
                .takes_value(true)
                .required(true)
                .help("Number of parties"),
            Arg::with_name("party")
                .short("I")
                .takes_value(true)
                .required(true)
                .help("Index of this party, 0 holds the label"),
            Arg::with_name("input")
                .index(1)
                .required(true)
                .help("Path to this party's CSV, header row required"),
            Arg::with_name("normalizer")
                .short("n")
                .takes_value(true)
                .possible_values(&["none", "minmax", "zscore"])
                .default_value("none"),
            Arg::with_name("regression")
                .short("r")
                .takes_value(true)
                .possible_values(&["linear", "logistic"])
                .default_value("linear"),
            Arg::with_name("lr")
                .long("lr")
                .takes_value(true)
                .default_value("0.01")
                .help("Learning rate"),
            Arg::with_name("epochs")
                .long("epochs")
                .takes_value(true)
                .default_value("200"),
            Arg::with_name("label")
                .long("label")
                .takes_value(true)
                .default_value("purchase_amount")
                .help("Label column, looked up on party 0"),
            Arg::with_name("identifier-config")
                .long("identifier-config")
                .takes_value(true)
                .help(r#"JSON, e.g. {"mode": "combined", "columns": ["a", "b"], "separator": "_"}"#),
            Arg::with_name("verbose")
                .long("verbose")
                .takes_value(false)
                .help("Reveal and log the parameters every 10 epochs"),
            Arg::with_name("psi-mode")
                .long("psi-mode")
                .takes_value(true)
                .possible_values(&["distributed", "broadcast"])
                .default_value("distributed"),
            Arg::with_name("host")
                .long("host")
                .takes_value(true)
                .default_value("127.0.0.1"),
            Arg::with_name("base-port")
                .long("base-port")
                .takes_value(true)
                .default_value("11365")
                .help("Party i listens on base-port + i"),
            Arg::with_name("connect-timeout")
                .long("connect-timeout")
                .takes_value(true)
                .default_value("30")
                .help("Seconds to wait for the other parties"),
            Arg::with_name("output-dir")
                .long("output-dir")
                .takes_value(true)
                .default_value(DEFAULT_OUTPUT_DIR),
        ])
        .get_matches()
}

fn value<T>(matches: &ArgMatches, name: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = matches
        .value_of(name)
        .ok_or_else(|| format!("missing --{}", name))?;
    raw.parse::<T>()
        .map_err(|e| format!("invalid --{} '{}': {}", name, raw, e).into())
}

/// Every record goes to stdout as `[Party <i>] <message>`
fn init_logger(party: usize) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(move |buf, record| writeln!(buf, "[Party {}] {}", party, record.args()))
        .target(env_logger::Target::Stdout)
        .init();
}

async fn run(matches: &ArgMatches<'_>, party: usize) -> Result<(), Box<dyn std::error::Error>> {
    let parties = value::<usize>(matches, "parties")?;
    let identifier_config = match matches.value_of("identifier-config") {
        Some(json) => IdentifierConfig::from_json(json)?,
        None => IdentifierConfig::default(),
    };
    let config = PipelineConfig {
        input: PathBuf::from(matches.value_of("input").unwrap_or_default()),
        party,
        parties,
        normalizer: value::<Normalizer>(matches, "normalizer")?,
        params: Hyperparameters {
            epochs: value(matches, "epochs")?,
            learning_rate: value(matches, "lr")?,
            regression: value::<RegressionType>(matches, "regression")?,
            verbose: matches.is_present("verbose"),
        },
        label: value(matches, "label")?,
        identifier_config,
        psi_mode: value::<PsiMode>(matches, "psi-mode")?,
        output_dir: PathBuf::from(matches.value_of("output-dir").unwrap_or(DEFAULT_OUTPUT_DIR)),
    };
    let mesh = MeshConfig {
        host: value(matches, "host")?,
        base_port: value(matches, "base-port")?,
        party,
        parties,
        connect_timeout: Duration::from_secs(value(matches, "connect-timeout")?),
    };

    info!("Loading local dataset {}", config.input.display());
    let global_timer = timer::Timer::new_silent("global");
    let channel = connect(&mesh).await?;
    let (report, channel) = run_worker(channel, &config).await?;
    channel.close().await?;

    info!(
        "Trained on {} joined rows in {:.3} s",
        report.data_count,
        global_timer.elapsed_secs()
    );
    if let Some(result) = report.result {
        info!(
            "Model: {} | coefficients: {:?}",
            result.summary.model,
            result
                .coefficients
                .iter()
                .map(|c| format!("{}={:.4}", c.feature, c.value))
                .collect::<Vec<_>>()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = args();
    let party = match value::<usize>(&matches, "party") {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    init_logger(party);

    if let Err(e) = run(&matches, party).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
