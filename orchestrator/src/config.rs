//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use protocol::identifier::IdentifierConfig;
use protocol::normalizer::Normalizer;
use protocol::psi::PsiMode;
use protocol::regression::RegressionType;
use serde::Deserialize;

use crate::error::Result;
use crate::error::SessionError;

pub const DEFAULT_WORKER_BIN: &str = "worker";
pub const DEFAULT_BASE_PORT: u16 = 11365;
pub const DEFAULT_SPAWN_DELAY_MS: u64 = 100;
pub const DEFAULT_LOG_POLL_MS: u64 = 500;

/// Where the orchestrator keeps files and how it starts workers
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub upload_dir: PathBuf,
    pub log_dir: PathBuf,
    pub result_dir: PathBuf,
    /// Program followed by leading arguments, the worker flags go after
    pub worker_command: Vec<String>,
    pub host: String,
    pub base_port: u16,
    pub spawn_delay: Duration,
    pub log_poll: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            upload_dir: PathBuf::from("uploads"),
            log_dir: PathBuf::from("logs"),
            result_dir: PathBuf::from("results"),
            worker_command: vec![String::from(DEFAULT_WORKER_BIN)],
            host: String::from("127.0.0.1"),
            base_port: DEFAULT_BASE_PORT,
            spawn_delay: Duration::from_millis(DEFAULT_SPAWN_DELAY_MS),
            log_poll: Duration::from_millis(DEFAULT_LOG_POLL_MS),
        }
    }
}

/// Flat view of the `PPML_*` variables, e.g. `PPML_BASE_PORT=12000`
#[derive(Debug, Deserialize)]
#[serde(default)]
struct EnvSettings {
    upload_dir: PathBuf,
    log_dir: PathBuf,
    result_dir: PathBuf,
    worker_bin: String,
    host: String,
    base_port: u16,
    spawn_delay_ms: u64,
    log_poll_ms: u64,
}

impl Default for EnvSettings {
    fn default() -> Self {
        let c = OrchestratorConfig::default();
        EnvSettings {
            upload_dir: c.upload_dir,
            log_dir: c.log_dir,
            result_dir: c.result_dir,
            worker_bin: c.worker_command.join(" "),
            host: c.host,
            base_port: c.base_port,
            spawn_delay_ms: DEFAULT_SPAWN_DELAY_MS,
            log_poll_ms: DEFAULT_LOG_POLL_MS,
        }
    }
}

impl EnvSettings {
    fn load(env: Environment) -> std::result::Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(env)?;
        config.try_into()
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by the `PPML_*` environment variables
    pub fn from_env() -> Result<OrchestratorConfig> {
        Self::load(Environment::with_prefix("ppml"))
    }

    fn load(env: Environment) -> Result<OrchestratorConfig> {
        let settings = EnvSettings::load(env)
            .map_err(|e| SessionError::InvalidRequest(format!("configuration: {}", e)))?;

        let worker_command = settings
            .worker_bin
            .split_whitespace()
            .map(String::from)
            .collect::<Vec<String>>();
        if worker_command.is_empty() {
            return Err(SessionError::InvalidRequest(String::from(
                "PPML_WORKER_BIN is empty",
            )));
        }
        Ok(OrchestratorConfig {
            upload_dir: settings.upload_dir,
            log_dir: settings.log_dir,
            result_dir: settings.result_dir,
            worker_command,
            host: settings.host,
            base_port: settings.base_port,
            spawn_delay: Duration::from_millis(settings.spawn_delay_ms),
            log_poll: Duration::from_millis(settings.log_poll_ms),
        })
    }
}

/// The lead's run request
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub normalizer: Normalizer,
    pub regression: RegressionType,
    pub learning_rate: f64,
    pub epochs: usize,
    pub label: String,
    pub identifier_config: Option<IdentifierConfig>,
    pub verbose: bool,
    pub psi_mode: PsiMode,
}

impl RunConfig {
    pub fn new(label: &str) -> RunConfig {
        RunConfig {
            normalizer: Normalizer::ZScore,
            regression: RegressionType::Linear,
            learning_rate: 0.5,
            epochs: 1000,
            label: label.to_string(),
            identifier_config: None,
            verbose: false,
            psi_mode: PsiMode::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(SessionError::InvalidRequest(String::from(
                "A label column is required",
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(SessionError::InvalidRequest(format!(
                "Learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_defaults_and_validation() {
        let c = RunConfig::new("purchase_amount");
        assert_eq!(c.normalizer, Normalizer::ZScore);
        assert_eq!(c.epochs, 1000);
        assert!(c.validate().is_ok());
        assert!(RunConfig::new(" ").validate().is_err());
        let bad = RunConfig {
            learning_rate: 0.0,
            ..RunConfig::new("y")
        };
        assert_eq!(
            bad.validate().unwrap_err().kind(),
            crate::error::ErrorKind::InvalidRequest
        );
    }

    #[test]
    fn env_overrides() {
        std::env::set_var("PPMLTEST_SPAWN_DELAY_MS", "7");
        std::env::set_var("PPMLTEST_WORKER_BIN", "sh fake_worker.sh");
        std::env::set_var("PPMLTEST_BASE_PORT", "12000");
        let c = OrchestratorConfig::load(Environment::with_prefix("ppmltest")).unwrap();
        assert_eq!(c.spawn_delay, Duration::from_millis(7));
        assert_eq!(c.worker_command, vec!["sh", "fake_worker.sh"]);
        assert_eq!(c.base_port, 12000);
        assert_eq!(c.log_poll, Duration::from_millis(DEFAULT_LOG_POLL_MS));
        assert_eq!(c.upload_dir, PathBuf::from("uploads"));

        std::env::set_var("PPMLBAD_BASE_PORT", "not a port");
        let err = OrchestratorConfig::load(Environment::with_prefix("ppmlbad")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidRequest);

        std::env::set_var("PPMLEMPTY_WORKER_BIN", " ");
        assert!(OrchestratorConfig::load(Environment::with_prefix("ppmlempty")).is_err());
    }
}
