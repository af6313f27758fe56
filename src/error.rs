use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::domain::Accession;

/// Failure of a single request against the record repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },
}

impl TransportError {
    /// Network failures and 5xx responses are worth another attempt; any other
    /// status is a property of the identifier and will not change on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::HttpStatus { status, .. } => is_server_error(*status),
        }
    }
}

pub fn is_server_error(status: u16) -> bool {
    (500..=599).contains(&status)
}

/// Why one identifier ended up in the failure list. Never fatal to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("permanent failure, status {status}: {message}")]
    Permanent { status: u16, message: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum SeqFetchError {
    #[error("invalid accession: {0:?}")]
    InvalidAccession(String),

    #[error("missing config file kira-seqfetch.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("failed to write output: {message}")]
    Persistence {
        message: String,
        unattempted: Vec<Accession>,
    },

    #[error("worker for chunk {chunk} failed: {reason}")]
    WorkerFault {
        chunk: usize,
        reason: String,
        unattempted: Vec<Accession>,
    },
}

impl SeqFetchError {
    pub(crate) fn persistence(err: impl ToString) -> Self {
        SeqFetchError::Persistence {
            message: err.to_string(),
            unattempted: Vec::new(),
        }
    }

    /// Replaces the ids a job-aborting failure reports as untouched.
    pub(crate) fn with_unattempted(self, ids: &[Accession]) -> Self {
        match self {
            SeqFetchError::Persistence { message, .. } => SeqFetchError::Persistence {
                message,
                unattempted: ids.to_vec(),
            },
            SeqFetchError::WorkerFault { chunk, reason, .. } => SeqFetchError::WorkerFault {
                chunk,
                reason,
                unattempted: ids.to_vec(),
            },
            other => other,
        }
    }

    /// Identifiers whose outcome the caller never received, if this error
    /// aborted a job.
    pub fn unattempted(&self) -> &[Accession] {
        match self {
            SeqFetchError::Persistence { unattempted, .. }
            | SeqFetchError::WorkerFault { unattempted, .. } => unattempted,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(TransportError::Network("timed out".to_string()).is_retryable());
        let unavailable = TransportError::HttpStatus {
            status: 503,
            message: String::new(),
        };
        assert!(unavailable.is_retryable());
        let not_found = TransportError::HttpStatus {
            status: 404,
            message: String::new(),
        };
        assert!(!not_found.is_retryable());
    }
}
