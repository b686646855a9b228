use std::path::PathBuf;

use thiserror::Error;

use crate::domain::ChargingSessionId;

/// Caller-contract violations. Never leaves a log entry behind.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Charging session {0} already exists")]
    SessionAlreadyExists(ChargingSessionId),

    #[error("Charging session {0} not found")]
    SessionNotFound(ChargingSessionId),

    #[error("Validation: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Command log directory {path} is unavailable: {source}")]
    LogDirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InfraError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl AppError {
    /// Whether the failure happened while persisting; memory may already
    /// hold the new state while the log does not.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, AppError::Infra(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Domain(DomainError::SessionNotFound(_)))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Domain(DomainError::SessionAlreadyExists(_)))
    }
}

/// Result type for session store operations
pub type StoreResult<T> = Result<T, AppError>;
