//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Session record and its state machine.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Local;
use serde::Serialize;

use crate::assignment::PartyAssignment;
use crate::config::RunConfig;
use crate::error::Result;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Uploading,
    Ready,
    Processing,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Uploading => "uploading",
            SessionState::Ready => "ready",
            SessionState::Processing => "processing",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub lead_user_id: String,
    pub participant_count: usize,
    pub joined_users: BTreeSet<String>,
    pub uploaded_users: BTreeSet<String>,
    pub status_map: BTreeMap<String, bool>,
    pub state: SessionState,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    pub processing_started_at: Option<DateTime<Local>>,
    pub processing_completed_at: Option<DateTime<Local>>,
    pub has_results: bool,
    pub error_message: Option<String>,
    pub uploads: BTreeMap<String, PathBuf>,
    pub assignment: Option<PartyAssignment>,
    pub run_config: Option<RunConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub participant_count: usize,
    pub joined_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub participant_count: usize,
    pub joined_count: usize,
    pub uploaded_count: usize,
    pub is_lead: bool,
    pub has_results: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateCheck {
    pub allowed: bool,
    pub reason: String,
    pub current_state: SessionState,
    pub session_info: SessionSummary,
}

const OK: &str = "OK";

/// Decides whether `user` may open `path` ("upload" or "form-upload",
/// "log", "result") in the session's current state
pub fn can_access_path(path: &str, user: &str, session: &Session) -> (bool, String) {
    let open_for_uploads = matches!(
        session.state,
        SessionState::Created | SessionState::Uploading
    );
    let is_upload = path == "upload" || path == "form-upload";

    if is_upload && open_for_uploads {
        if !session.joined_users.contains(user)
            && session.joined_users.len() >= session.participant_count
        {
            return (false, String::from("Session is full"));
        }
        return (true, String::from(OK));
    }
    if !session.joined_users.contains(user) {
        return (false, String::from("User is not part of this session"));
    }

    let (allowed, reason) = match (path, session.state) {
        (_, SessionState::Ready) if is_upload => (
            false,
            "All files have been uploaded. Waiting for processing to start.",
        ),
        (_, SessionState::Processing) if is_upload => (
            false,
            "Session is currently processing. Please go to the log page.",
        ),
        (_, SessionState::Completed) if is_upload => (
            false,
            "Session has completed. Please go to the results page.",
        ),
        (_, state) if is_upload => {
            return (false, format!("Cannot upload in current state: {}", state))
        }
        ("log", SessionState::Processing) | ("log", SessionState::Completed) => (true, OK),
        ("log", SessionState::Created)
        | ("log", SessionState::Uploading)
        | ("log", SessionState::Ready) => (
            false,
            "Processing has not started yet. Please complete the upload first.",
        ),
        ("log", state) => return (false, format!("Cannot view logs in current state: {}", state)),
        ("result", SessionState::Completed) => (true, OK),
        ("result", SessionState::Processing) => (
            false,
            "Processing is still in progress. Please wait for completion.",
        ),
        ("result", SessionState::Created)
        | ("result", SessionState::Uploading)
        | ("result", SessionState::Ready) => (
            false,
            "Results are not available yet. Please complete the upload and processing first.",
        ),
        ("result", state) => {
            return (false, format!("Results not available in current state: {}", state))
        }
        (other, _) => return (false, format!("Unknown path: {}", other)),
    };
    (allowed, reason.to_string())
}

impl Session {
    /// A fresh session with the lead already joined
    pub fn new(id: &str, lead_user_id: &str, participant_count: usize) -> Session {
        let now = Local::now();
        Session {
            id: id.to_string(),
            lead_user_id: lead_user_id.to_string(),
            participant_count,
            joined_users: std::iter::once(lead_user_id.to_string()).collect(),
            uploaded_users: BTreeSet::new(),
            status_map: BTreeMap::new(),
            state: SessionState::Created,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            processing_completed_at: None,
            has_results: false,
            error_message: None,
            uploads: BTreeMap::new(),
            assignment: None,
            run_config: None,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Local::now();
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            participant_count: self.participant_count,
            joined_count: self.joined_users.len(),
        }
    }

    pub fn check(&self, path: &str, user: &str) -> StateCheck {
        let (allowed, reason) = can_access_path(path, user, self);
        StateCheck {
            allowed,
            reason,
            current_state: self.state,
            session_info: SessionSummary {
                session_id: self.id.clone(),
                participant_count: self.participant_count,
                joined_count: self.joined_users.len(),
                uploaded_count: self.uploaded_users.len(),
                is_lead: user == self.lead_user_id,
                has_results: self.has_results,
            },
        }
    }

    pub fn is_participant(&self, user: &str) -> Result<()> {
        if self.joined_users.contains(user) {
            Ok(())
        } else {
            Err(SessionError::NotParticipant)
        }
    }

    /// Joins `user`; the first connection moves the session to UPLOADING.
    /// Returns whether the user was new.
    pub fn join(&mut self, user: &str) -> Result<bool> {
        let new = !self.joined_users.contains(user);
        if new {
            if self.joined_users.len() >= self.participant_count {
                return Err(SessionError::SessionFull);
            }
            self.joined_users.insert(user.to_string());
        }
        if self.state == SessionState::Created {
            self.state = SessionState::Uploading;
        }
        self.touch();
        Ok(new)
    }

    pub fn set_status(&mut self, user: &str, ready: bool) -> Result<()> {
        self.is_participant(user)?;
        self.status_map.insert(user.to_string(), ready);
        self.touch();
        Ok(())
    }

    /// Checks that `user` may upload now, without recording anything
    pub fn can_upload(&self, user: &str) -> Result<()> {
        let (allowed, reason) = can_access_path("upload", user, self);
        if !allowed {
            return Err(match self.state {
                SessionState::Created | SessionState::Uploading => SessionError::SessionFull,
                _ => SessionError::InvalidState(reason),
            });
        }
        self.is_participant(user)?;
        if self.uploaded_users.contains(user) {
            return Err(SessionError::DuplicateUpload);
        }
        Ok(())
    }

    /// Records a stored upload; the last one moves the session to READY
    pub fn record_upload(&mut self, user: &str, path: PathBuf) -> Result<()> {
        self.can_upload(user)?;
        self.uploaded_users.insert(user.to_string());
        self.uploads.insert(user.to_string(), path);
        if self.state == SessionState::Created {
            self.state = SessionState::Uploading;
        }
        if self.uploaded_users.len() >= self.participant_count {
            self.state = SessionState::Ready;
        }
        self.touch();
        Ok(())
    }

    /// Checks that `user` may start the run now
    pub fn can_run(&self, user: &str) -> Result<()> {
        if user != self.lead_user_id {
            return Err(SessionError::NotLead);
        }
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Uploading => Err(SessionError::InvalidState(String::from(
                "Not all users have uploaded their files yet",
            ))),
            SessionState::Processing => Err(SessionError::InvalidState(String::from(
                "Session is already processing",
            ))),
            SessionState::Completed => Err(SessionError::InvalidState(String::from(
                "Session has already completed",
            ))),
            state => Err(SessionError::InvalidState(format!(
                "Cannot start processing in current state: {}",
                state
            ))),
        }
    }

    /// READY -> PROCESSING
    pub fn start_processing(
        &mut self,
        user: &str,
        assignment: PartyAssignment,
        run_config: RunConfig,
    ) -> Result<()> {
        self.can_run(user)?;
        self.state = SessionState::Processing;
        self.assignment = Some(assignment);
        self.run_config = Some(run_config);
        self.processing_started_at = Some(Local::now());
        self.touch();
        Ok(())
    }

    /// PROCESSING -> COMPLETED
    pub fn complete(&mut self) {
        self.state = SessionState::Completed;
        self.has_results = true;
        self.processing_completed_at = Some(Local::now());
        self.touch();
    }

    /// PROCESSING -> FAILED
    pub fn fail(&mut self, message: String) {
        self.state = SessionState::Failed;
        self.has_results = false;
        self.error_message = Some(message);
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("s", "lead", 2)
    }

    fn ready() -> Session {
        let mut s = session();
        s.join("bob").unwrap();
        s.record_upload("lead", PathBuf::from("lead.csv")).unwrap();
        s.record_upload("bob", PathBuf::from("bob.csv")).unwrap();
        s
    }

    #[test]
    fn lifecycle() {
        let mut s = session();
        assert_eq!(s.state, SessionState::Created);
        assert_eq!(s.info(), SessionInfo { participant_count: 2, joined_count: 1 });

        assert!(s.join("bob").unwrap());
        assert_eq!(s.state, SessionState::Uploading);
        assert!(!s.join("bob").unwrap());
        assert!(matches!(s.join("eve"), Err(SessionError::SessionFull)));

        s.record_upload("lead", PathBuf::from("lead.csv")).unwrap();
        assert_eq!(s.state, SessionState::Uploading);
        assert_eq!(
            s.can_run("lead").unwrap_err().to_string(),
            "Not all users have uploaded their files yet"
        );
        s.record_upload("bob", PathBuf::from("bob.csv")).unwrap();
        assert_eq!(s.state, SessionState::Ready);

        assert!(matches!(s.can_run("bob"), Err(SessionError::NotLead)));
        s.start_processing("lead", PartyAssignment::default(), RunConfig::new("y"))
            .unwrap();
        assert_eq!(s.state, SessionState::Processing);
        assert!(s.processing_started_at.is_some());
        assert_eq!(
            s.can_run("lead").unwrap_err().to_string(),
            "Session is already processing"
        );

        s.complete();
        assert!(s.has_results);
        assert_eq!(
            s.can_run("lead").unwrap_err().to_string(),
            "Session has already completed"
        );
    }

    #[test]
    fn upload_rules() {
        let mut s = session();
        assert!(matches!(
            s.record_upload("eve", PathBuf::from("eve.csv")),
            Err(SessionError::NotParticipant)
        ));
        s.record_upload("lead", PathBuf::from("lead.csv")).unwrap();
        assert!(matches!(
            s.record_upload("lead", PathBuf::from("lead.csv")),
            Err(SessionError::DuplicateUpload)
        ));

        let s = ready();
        let err = s.can_upload("lead").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::State);
        assert_eq!(
            err.to_string(),
            "All files have been uploaded. Waiting for processing to start."
        );
    }

    #[test]
    fn access_guard() {
        let mut s = session();
        assert_eq!(can_access_path("form-upload", "bob", &s), (true, String::from("OK")));
        assert_eq!(
            can_access_path("log", "bob", &s).1,
            "User is not part of this session"
        );
        assert_eq!(
            can_access_path("log", "lead", &s).1,
            "Processing has not started yet. Please complete the upload first."
        );
        s.join("bob").unwrap();
        assert_eq!(can_access_path("upload", "eve", &s).1, "Session is full");
        assert_eq!(can_access_path("stats", "bob", &s).1, "Unknown path: stats");

        let mut s = ready();
        s.state = SessionState::Processing;
        assert!(can_access_path("log", "bob", &s).0);
        assert_eq!(
            can_access_path("result", "bob", &s).1,
            "Processing is still in progress. Please wait for completion."
        );
        s.complete();
        assert!(can_access_path("log", "bob", &s).0);
        assert!(can_access_path("result", "bob", &s).0);

        s.fail(String::from("boom"));
        assert_eq!(
            can_access_path("result", "bob", &s).1,
            "Results not available in current state: failed"
        );
        assert_eq!(
            can_access_path("upload", "bob", &s).1,
            "Cannot upload in current state: failed"
        );
    }

    #[test]
    fn state_check_summary() {
        let s = ready();
        let c = s.check("result", "lead");
        assert!(!c.allowed);
        assert_eq!(c.current_state, SessionState::Ready);
        assert!(c.session_info.is_lead);
        assert_eq!(c.session_info.uploaded_count, 2);
    }
}
