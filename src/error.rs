// Error types for the agent indexer.
// Covers Blockfrost transport/status errors, configuration errors and decoding failures.

use std::sync::Arc;

use thiserror::Error;

/// Crate-wide error.
///
/// Cloneable so that a single upstream outcome can be delivered to every
/// caller coalesced onto the same in-flight request.
#[derive(Error, Debug, Clone)]
pub enum IndexerError {
    #[error("Blockfrost transport error: {0}")]
    Transport(Arc<reqwest::Error>),

    #[error("Blockfrost API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Blockfrost rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<IndexerError>,
    },

    #[error("Missing Blockfrost API key for {network}")]
    MissingApiKey { network: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(Arc<figment::Error>),

    #[error("JSON parsing error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Malformed Blockfrost response: {0}")]
    Malformed(String),

    #[error("Invalid agent metadata: {0}")]
    Metadata(#[from] crate::metadata::MetadataIssue),

    #[error("Background fetch failed: {0}")]
    Task(String),
}

impl IndexerError {
    /// Whether a retry at the transport layer may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexerError::Transport(e) => !(e.is_decode() || e.is_builder()),
            IndexerError::RateLimited { .. } => true,
            IndexerError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            IndexerError::Status { status, .. } => Some(*status),
            IndexerError::RateLimited { .. } => Some(429),
            IndexerError::RetriesExhausted { last, .. } => last.status(),
            IndexerError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(e: reqwest::Error) -> Self {
        IndexerError::Transport(Arc::new(e))
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        IndexerError::Json(Arc::new(e))
    }
}

impl From<std::io::Error> for IndexerError {
    fn from(e: std::io::Error) -> Self {
        IndexerError::Io(Arc::new(e))
    }
}

impl From<figment::Error> for IndexerError {
    fn from(e: figment::Error) -> Self {
        IndexerError::Config(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let server = IndexerError::Status {
            status: 503,
            message: "unavailable".into(),
        };
        let not_found = IndexerError::Status {
            status: 404,
            message: "not found".into(),
        };
        let limited = IndexerError::RateLimited {
            message: "slow down".into(),
        };

        assert!(server.is_transient());
        assert!(limited.is_transient());
        assert!(!not_found.is_transient());
        assert!(!IndexerError::InvalidConfig("x".into()).is_transient());
    }

    #[test]
    fn test_status_through_exhausted() {
        let err = IndexerError::RetriesExhausted {
            attempts: 3,
            last: Box::new(IndexerError::RateLimited {
                message: "slow down".into(),
            }),
        };
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("3 attempts"));
    }
}
