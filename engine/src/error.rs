//! Error types for the vault sync engine.

use crate::{Uid, Version};
use thiserror::Error;

/// How a collaborator failure should be recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The addressed document does not exist (stale UID hint).
    NotFound,
    /// Another writer committed first; the expected version is stale.
    Conflict,
    /// Network or server hiccup; nothing authoritative was committed.
    Transient,
    /// Anything else. Recovered like `Transient`.
    Unclassified,
}

/// Errors surfaced by a [`DocumentClient`](crate::DocumentClient).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("document not found: {0}")]
    NotFound(Uid),

    #[error("version conflict: server is at version {server_version}")]
    Conflict { server_version: Version },

    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Classifies the error into the recovery taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::NotFound(_) => FailureKind::NotFound,
            ClientError::Conflict { .. } => FailureKind::Conflict,
            ClientError::Transport {
                retryable: true, ..
            } => FailureKind::Transient,
            ClientError::Transport { .. } | ClientError::Other(_) => FailureKind::Unclassified,
        }
    }

    /// Returns true if the failure was a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        self.kind() == FailureKind::Conflict
    }
}

/// Result type for document client calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors from the engine's own bookkeeping.
#[derive(Debug, Error)]
pub enum Error {
    #[error("hint store error: {0}")]
    Hint(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sync engine is not running")]
    NotRunning,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ClientError::NotFound("doc-1".into());
        assert_eq!(err.to_string(), "document not found: doc-1");

        let err = ClientError::Conflict { server_version: 5 };
        assert_eq!(
            err.to_string(),
            "version conflict: server is at version 5"
        );

        assert_eq!(Error::NotRunning.to_string(), "sync engine is not running");
    }

    #[test]
    fn failure_classification() {
        assert_eq!(
            ClientError::NotFound("x".into()).kind(),
            FailureKind::NotFound
        );
        assert!(ClientError::Conflict { server_version: 2 }.is_conflict());
        assert_eq!(
            ClientError::transport("offline").kind(),
            FailureKind::Transient
        );
        assert_eq!(
            ClientError::Transport {
                message: "bad certificate".into(),
                retryable: false,
            }
            .kind(),
            FailureKind::Unclassified
        );
        assert_eq!(
            ClientError::Other("boom".into()).kind(),
            FailureKind::Unclassified
        );
    }
}
