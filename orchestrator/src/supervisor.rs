//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Starts one worker process per party and turns their exits into a
//! session outcome.

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use futures::future::join_all;
use protocol::artifact::RESULT_FILE;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::watch;

use crate::assignment::PartyAssignment;
use crate::assignment::PartySlot;
use crate::config::OrchestratorConfig;
use crate::config::RunConfig;
use crate::error::Result;
use crate::error::SessionError;

/// Exit code per party, `None` while it runs
pub type ExitCodes = Vec<Option<i32>>;

/// Exit code recorded for a worker killed by a signal
pub const SIGNALLED: i32 = -1;

/// Hands out disjoint port blocks so concurrent runs do not collide
#[derive(Debug)]
pub struct PortAllocator {
    base: u16,
    span: usize,
    next: AtomicUsize,
}

impl PortAllocator {
    pub fn new(base: u16) -> PortAllocator {
        PortAllocator {
            base,
            span: u16::MAX as usize - base as usize,
            next: AtomicUsize::new(0),
        }
    }

    /// First port of a block of `parties` consecutive ports
    pub fn allocate(&self, parties: usize) -> u16 {
        let span = self.span.max(parties);
        let mut offset = self.next.fetch_add(parties, Ordering::SeqCst) % span;
        if offset + parties > span {
            offset = 0;
        }
        (self.base as usize + offset) as u16
    }
}

pub fn session_dir(root: &Path, session_id: &str) -> PathBuf {
    root.join(session_id)
}

pub fn log_path(config: &OrchestratorConfig, session_id: &str, party: usize) -> PathBuf {
    session_dir(&config.log_dir, session_id).join(format!("log_{}.log", party))
}

pub fn result_path(config: &OrchestratorConfig, session_id: &str) -> PathBuf {
    session_dir(&config.result_dir, session_id).join(RESULT_FILE)
}

/// Command line of one worker, without the program itself
pub fn worker_args(
    slot: &PartySlot,
    parties: usize,
    run: &RunConfig,
    host: &str,
    base_port: u16,
    output_dir: &Path,
) -> Vec<String> {
    let mut args = vec![
        String::from("-M"),
        parties.to_string(),
        String::from("-I"),
        slot.index.to_string(),
        slot.input.display().to_string(),
        String::from("-n"),
        run.normalizer.to_string(),
        String::from("-r"),
        run.regression.to_string(),
        String::from("--lr"),
        run.learning_rate.to_string(),
        String::from("--epochs"),
        run.epochs.to_string(),
        String::from("--label"),
        run.label.clone(),
    ];
    if let Some(ids) = run.identifier_config.as_ref() {
        args.push(String::from("--identifier-config"));
        args.push(ids.to_json());
    }
    if run.verbose {
        args.push(String::from("--verbose"));
    }
    args.extend([
        String::from("--psi-mode"),
        run.psi_mode.to_string(),
        String::from("--host"),
        host.to_string(),
        String::from("--base-port"),
        base_port.to_string(),
        String::from("--output-dir"),
        output_dir.display().to_string(),
    ]);
    args
}

/// Truncates the log, then hands out two append handles on it
fn open_log(path: &Path) -> Result<(File, File)> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    File::create(path)?;
    let out = OpenOptions::new().append(true).open(path)?;
    let err = out.try_clone()?;
    Ok((out, err))
}

/// Last non-empty line of a log, for failure messages
pub fn last_log_line(path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(String::from)
            .unwrap_or_else(|| String::from("no output")),
        Err(e) => format!("log unreadable: {}", e),
    }
}

async fn kill_all(children: &mut [Child]) {
    for child in children.iter_mut() {
        if let Err(e) = child.start_kill() {
            debug!("kill failed: {}", e);
        }
        let _ = child.wait().await;
    }
}

async fn spawn_all(
    config: &OrchestratorConfig,
    session_id: &str,
    assignment: &PartyAssignment,
    run: &RunConfig,
    base_port: u16,
) -> Result<Vec<Child>> {
    let (program, leading) = config
        .worker_command
        .split_first()
        .ok_or_else(|| SessionError::InvalidRequest(String::from("empty worker command")))?;
    let output_dir = session_dir(&config.result_dir, session_id);
    fs::create_dir_all(&output_dir)?;

    let mut children: Vec<Child> = Vec::with_capacity(assignment.len());
    for slot in assignment.slots.iter() {
        if slot.index > 0 {
            tokio::time::sleep(config.spawn_delay).await;
        }
        let log = log_path(config, session_id, slot.index);
        let spawned = open_log(&log).and_then(|(out, err)| {
            Command::new(program)
                .args(leading)
                .args(worker_args(
                    slot,
                    assignment.len(),
                    run,
                    &config.host,
                    base_port,
                    &output_dir,
                ))
                .stdin(Stdio::null())
                .stdout(Stdio::from(out))
                .stderr(Stdio::from(err))
                .spawn()
                .map_err(SessionError::from)
        });
        match spawned {
            Ok(child) => {
                info!(
                    "Session {}: started party {} ({}) as pid {:?}, log {}",
                    session_id,
                    slot.index,
                    slot.user,
                    child.id(),
                    log.display()
                );
                children.push(child);
            }
            Err(e) => {
                error!(
                    "Session {}: could not start party {} ({}): {}",
                    session_id, slot.index, slot.user, e
                );
                kill_all(&mut children).await;
                return Err(SessionError::WorkerFailure(format!(
                    "Failed to start party {} ({}): {}",
                    slot.index, slot.user, e
                )));
            }
        }
    }
    Ok(children)
}

/// Runs every party of `assignment` to completion. Exit codes are
/// published on `exits` as they arrive. Succeeds only if every worker
/// exited with 0 and the result artifact exists.
pub async fn supervise(
    config: &OrchestratorConfig,
    session_id: &str,
    assignment: &PartyAssignment,
    run: &RunConfig,
    base_port: u16,
    exits: &watch::Sender<ExitCodes>,
) -> Result<PathBuf> {
    let children = spawn_all(config, session_id, assignment, run, base_port).await?;

    let waits = children.into_iter().enumerate().map(|(i, mut child)| {
        async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(SIGNALLED),
                Err(e) => {
                    error!("Session {}: waiting on party {} failed: {}", session_id, i, e);
                    SIGNALLED
                }
            };
            exits.send_modify(|codes| codes[i] = Some(code));
            debug!("Session {}: party {} exited with {}", session_id, i, code);
            code
        }
    });
    let codes = join_all(waits).await;

    let failures = codes
        .iter()
        .enumerate()
        .filter(|(_, code)| **code != 0)
        .map(|(i, code)| {
            format!(
                "Party {} ({}) exited with code {}: {}",
                i,
                assignment.user_of(i).unwrap_or("unknown"),
                code,
                last_log_line(&log_path(config, session_id, i))
            )
        })
        .collect::<Vec<String>>();
    if !failures.is_empty() {
        return Err(SessionError::WorkerFailure(failures.join("; ")));
    }

    let result = result_path(config, session_id);
    if !result.exists() {
        return Err(SessionError::MissingArtifact(format!(
            "All workers finished but {} was not written",
            result.display()
        )));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::identifier::IdentifierConfig;

    #[test]
    fn args_follow_worker_cli() {
        let slot = PartySlot {
            index: 1,
            user: String::from("bob"),
            input: PathBuf::from("up/bob.csv"),
        };
        let mut run = RunConfig::new("price");
        run.epochs = 5;
        let args = worker_args(&slot, 3, &run, "127.0.0.1", 12000, Path::new("out"));
        assert_eq!(
            args[..15].join(" "),
            "-M 3 -I 1 up/bob.csv -n zscore -r linear --lr 0.5 --epochs 5 --label price"
        );
        assert!(!args.contains(&String::from("--verbose")));
        assert!(args.ends_with(&[String::from("--output-dir"), String::from("out")]));

        run.verbose = true;
        run.identifier_config = Some(IdentifierConfig::Single(String::from("email")));
        let args = worker_args(&slot, 3, &run, "127.0.0.1", 12000, Path::new("out"));
        assert_eq!(args[15], "--identifier-config");
        assert_eq!(args[17], "--verbose");
    }

    #[test]
    fn port_blocks_do_not_overlap() {
        let ports = PortAllocator::new(20000);
        let a = ports.allocate(3);
        let b = ports.allocate(2);
        assert_eq!(a, 20000);
        assert_eq!(b, 20003);
        assert_eq!(ports.allocate(4), 20005);
    }

    #[test]
    fn last_line_skips_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("log_0.log");
        fs::write(&p, "[Party 0] one\n[Party 0] boom\n\n").unwrap();
        assert_eq!(last_log_line(&p), "[Party 0] boom");
        assert!(last_log_line(&dir.path().join("none")).starts_with("log unreadable"));
        fs::write(&p, "").unwrap();
        assert_eq!(last_log_line(&p), "no output");
    }
}
