use std::path::PathBuf;

use mcm_core::{BusError, HandlerError, StoreError};
use mcm_model::{ErrorKind, ServerId};
use thiserror::Error;

use crate::{fetch::FetchError, props::PropsError};

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
    #[error("the runtime EULA must be accepted")]
    EulaNotAccepted,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("server {0} does not exist")]
    ServerNotFound(ServerId),
    #[error("server {0} has no running process")]
    ProcessNotRunning(ServerId),
    #[error("no runtime artifact for '{runtime}' in {}", dir.display())]
    ArtifactMissing { runtime: String, dir: PathBuf },
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("io error: {0}")]
    Io(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Props(#[from] PropsError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::MissingInput(_) | ExecError::EulaNotAccepted | ExecError::InvalidInput(_) => {
                ErrorKind::ExternalInput
            }
            ExecError::ServerNotFound(_) => ErrorKind::NotFound,
            ExecError::ProcessNotRunning(_) => ErrorKind::ProcessNotRunning,
            ExecError::ArtifactMissing { .. } => ErrorKind::ArtifactMissing,
            ExecError::Spawn(_) | ExecError::Io(_) => ErrorKind::Io,
            ExecError::Fetch(_) | ExecError::Dispatch(_) => ErrorKind::Internal,
            ExecError::Store(e) => e.kind(),
            ExecError::Props(e) => e.kind(),
            ExecError::Bus(e) => e.kind(),
        }
    }
}

impl From<ExecError> for HandlerError {
    fn from(e: ExecError) -> Self {
        HandlerError::new(e.kind(), e.to_string())
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
