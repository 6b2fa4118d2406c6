//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::io;

use serde::Serialize;
use thiserror::Error;

/// Machine-checkable category of a rejected operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Capacity,
    State,
    NotFound,
    MissingArtifact,
    InvalidRequest,
    Io,
    WorkerFailure,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,
    #[error("Session is full")]
    SessionFull,
    #[error("User is not part of this session")]
    NotParticipant,
    #[error("Only lead can initiate the run")]
    NotLead,
    #[error("{0}")]
    InvalidState(String),
    #[error("You already uploaded a file to this group.")]
    DuplicateUpload,
    #[error("Only CSV files are allowed.")]
    NotCsv,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    MissingArtifact(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    WorkerFailure(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound => ErrorKind::NotFound,
            SessionError::SessionFull | SessionError::NotParticipant | SessionError::NotLead => {
                ErrorKind::Capacity
            }
            SessionError::InvalidState(_) | SessionError::DuplicateUpload => ErrorKind::State,
            SessionError::NotCsv | SessionError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            SessionError::MissingArtifact(_) => ErrorKind::MissingArtifact,
            SessionError::Io(_) => ErrorKind::Io,
            SessionError::WorkerFailure(_) => ErrorKind::WorkerFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
