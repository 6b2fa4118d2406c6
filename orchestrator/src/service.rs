//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Session operations on top of the store, the supervisor and the log
//! follower.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use protocol::artifact::ResultArtifact;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::assignment::PartyAssignment;
use crate::config::OrchestratorConfig;
use crate::config::RunConfig;
use crate::error::Result;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::logtail;
use crate::results;
use crate::state::Session;
use crate::state::SessionInfo;
use crate::state::SessionState;
use crate::state::StateCheck;
use crate::store::SessionStore;
use crate::supervisor;
use crate::supervisor::ExitCodes;
use crate::supervisor::PortAllocator;

pub const MIN_PARTICIPANTS: usize = 2;

pub struct Orchestrator {
    config: OrchestratorConfig,
    store: SessionStore,
    ports: PortAllocator,
    runs: DashMap<String, watch::Receiver<ExitCodes>>,
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("csv"))
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Orchestrator {
        let ports = PortAllocator::new(config.base_port);
        Orchestrator {
            config,
            store: SessionStore::new(),
            ports,
            runs: DashMap::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn create_session(&self, lead_user_id: &str, participant_count: usize) -> Result<String> {
        if participant_count < MIN_PARTICIPANTS {
            return Err(SessionError::InvalidRequest(format!(
                "A session needs at least {} participants",
                MIN_PARTICIPANTS
            )));
        }
        if lead_user_id.trim().is_empty() {
            return Err(SessionError::InvalidRequest(String::from(
                "A lead user is required",
            )));
        }
        let id = Uuid::new_v4().to_string();
        self.store
            .insert(Session::new(&id, lead_user_id, participant_count));
        info!(
            "Created session {} for {} participants, lead {}",
            id, participant_count, lead_user_id
        );
        Ok(id)
    }

    pub fn session_info(&self, id: &str) -> Result<SessionInfo> {
        self.store.with(id, |s| Ok(s.info()))
    }

    pub fn snapshot(&self, id: &str) -> Result<Session> {
        self.store.snapshot(id)
    }

    pub fn connect(&self, id: &str, user: &str) -> Result<SessionInfo> {
        let (new, before, info, state) = self.store.with(id, |s| {
            let before = s.state;
            let new = s.join(user)?;
            Ok((new, before, s.info(), s.state))
        })?;
        if new {
            info!("Session {}: {} joined", id, user);
            self.store.publish(
                id,
                SessionEvent::Joined {
                    user: user.to_string(),
                    joined_count: info.joined_count,
                    participant_count: info.participant_count,
                },
            );
        }
        if before != state {
            self.store.publish(id, SessionEvent::StateChanged { state });
        }
        Ok(info)
    }

    pub fn update_status(&self, id: &str, user: &str, ready: bool) -> Result<()> {
        let status = self.store.with(id, |s| {
            s.set_status(user, ready)?;
            Ok(s.status_map.clone())
        })?;
        self.store.publish(id, SessionEvent::StatusMap { status });
        Ok(())
    }

    /// Relays lobby signals to everybody in the session
    pub fn announce(
        &self,
        id: &str,
        user: &str,
        proceed: Option<bool>,
        training: Option<bool>,
    ) -> Result<()> {
        self.store.with(id, |s| s.is_participant(user))?;
        if let Some(proceed) = proceed {
            self.store.publish(
                id,
                SessionEvent::Proceed {
                    user: user.to_string(),
                    proceed,
                },
            );
        }
        if let Some(training) = training {
            self.store.publish(
                id,
                SessionEvent::Training {
                    user: user.to_string(),
                    training,
                },
            );
        }
        Ok(())
    }

    /// Copies `source` to `{upload_dir}/{id}/{user}.csv` and records it
    pub fn upload(&self, id: &str, user: &str, source: &Path) -> Result<PathBuf> {
        if !is_csv(source) {
            return Err(SessionError::NotCsv);
        }
        self.store.with(id, |s| s.can_upload(user))?;

        let dir = supervisor::session_dir(&self.config.upload_dir, id);
        fs::create_dir_all(&dir)?;
        let dest = dir.join(format!("{}.csv", user));
        // staged under a unique name, only the recorded upload takes `dest`
        let staged = dir.join(format!(".{}.{}.part", user, Uuid::new_v4()));
        if let Err(e) = fs::copy(source, &staged) {
            let _ = fs::remove_file(&staged);
            return Err(e.into());
        }

        let recorded = self.store.with(id, |s| {
            s.can_upload(user)?;
            fs::rename(&staged, &dest)?;
            s.record_upload(user, dest.clone())?;
            Ok((s.uploaded_users.len(), s.state))
        });
        let (uploaded_count, state) = match recorded {
            Ok(r) => r,
            Err(e) => {
                let _ = fs::remove_file(&staged);
                return Err(e);
            }
        };
        info!(
            "Session {}: {} uploaded {} ({} so far)",
            id,
            user,
            dest.display(),
            uploaded_count
        );
        self.store.publish(
            id,
            SessionEvent::Uploaded {
                user: user.to_string(),
                uploaded_count,
            },
        );
        if state == SessionState::Ready {
            self.store.publish(id, SessionEvent::StateChanged { state });
        }
        Ok(dest)
    }

    pub fn check_state(&self, id: &str, path: &str, user: &str) -> Result<StateCheck> {
        self.store.with(id, |s| Ok(s.check(path, user)))
    }

    /// Assigns parties and starts the workers; returns as soon as they
    /// are being launched
    pub fn run(self: &Arc<Self>, id: &str, user: &str, run: RunConfig) -> Result<PartyAssignment> {
        run.validate()?;
        let snapshot = self.store.snapshot(id)?;
        snapshot.can_run(user)?;
        let assignment =
            PartyAssignment::build(&snapshot.uploads, &snapshot.lead_user_id, &run.label)?;
        self.store.with(id, |s| {
            s.start_processing(user, assignment.clone(), run.clone())
        })?;

        let (exits, watcher) = watch::channel(vec![None; assignment.len()]);
        self.runs.insert(id.to_string(), watcher);
        let base_port = self.ports.allocate(assignment.len());
        info!(
            "Session {}: running {} parties on ports {}..{}, party 0 is {}",
            id,
            assignment.len(),
            base_port,
            base_port as usize + assignment.len(),
            assignment.user_of(0).unwrap_or("unknown")
        );
        self.store.publish(
            id,
            SessionEvent::StateChanged {
                state: SessionState::Processing,
            },
        );

        let this = self.clone();
        let session_id = id.to_string();
        let slots = assignment.clone();
        tokio::spawn(async move {
            this.supervise(session_id, slots, run, base_port, exits)
                .await
        });
        Ok(assignment)
    }

    async fn supervise(
        &self,
        id: String,
        assignment: PartyAssignment,
        run: RunConfig,
        base_port: u16,
        exits: watch::Sender<ExitCodes>,
    ) {
        let outcome =
            supervisor::supervise(&self.config, &id, &assignment, &run, base_port, &exits).await;
        exits.send_modify(|codes| {
            for code in codes.iter_mut().filter(|c| c.is_none()) {
                *code = Some(supervisor::SIGNALLED);
            }
        });

        let event = match outcome {
            Ok(result) => {
                info!("Session {}: completed, results in {}", id, result.display());
                self.store.with(&id, |s| {
                    s.complete();
                    Ok(())
                })
                .map(|_| SessionEvent::Completed)
            }
            Err(e) => {
                let message = e.to_string();
                error!("Session {}: failed: {}", id, message);
                self.store.with(&id, |s| {
                    s.fail(message.clone());
                    Ok(())
                })
                .map(|_| SessionEvent::Failed { message })
            }
        };
        match event {
            Ok(event) => {
                let state = match event {
                    SessionEvent::Completed => SessionState::Completed,
                    _ => SessionState::Failed,
                };
                self.store.publish(&id, SessionEvent::StateChanged { state });
                self.store.publish(&id, event);
            }
            Err(e) => error!("Session {}: cannot record outcome: {}", id, e),
        }
    }

    pub fn result(&self, id: &str) -> Result<ResultArtifact> {
        let has_results = self.store.with(id, |s| Ok(s.has_results))?;
        if !has_results {
            return Err(SessionError::MissingArtifact(String::from(
                "Results not available yet",
            )));
        }
        results::load_result(&supervisor::result_path(&self.config, id))
    }

    pub fn model_path(&self, id: &str) -> Result<PathBuf> {
        let result = self.result(id)?;
        results::model_file(&result)
    }

    pub fn subscribe(&self, id: &str) -> Result<broadcast::Receiver<SessionEvent>> {
        self.store.subscribe(id)
    }

    /// Lines logged by `user`'s party from now on
    pub fn tail_log(&self, id: &str, user: &str) -> Result<mpsc::Receiver<String>> {
        let session = self.store.snapshot(id)?;
        let check = session.check("log", user);
        if !check.allowed {
            return Err(match session.is_participant(user) {
                Err(e) => e,
                Ok(()) => SessionError::InvalidState(check.reason),
            });
        }
        let party = session
            .assignment
            .as_ref()
            .and_then(|a| a.party_of(user))
            .ok_or(SessionError::NotParticipant)?;
        let exits = self
            .runs
            .get(id)
            .map(|w| w.value().clone())
            .ok_or_else(|| SessionError::InvalidState(String::from("No run for this session")))?;
        Ok(logtail::tail(
            supervisor::log_path(&self.config, id, party),
            party,
            exits,
            self.config.log_poll,
        ))
    }

    /// Resolves once the session is COMPLETED or FAILED
    pub async fn wait_finished(&self, id: &str) -> Result<Session> {
        let mut events = self.store.subscribe(id)?;
        loop {
            let session = self.store.snapshot(id)?;
            if session.state.is_terminal() {
                return Ok(session);
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.store.snapshot(id),
            }
        }
    }
}
