use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tagscope_models::remote::RemoteRequest;
use thiserror::Error;

use crate::error::{RemoteError, RemoteErrorKind};

/// Raw outcome of one network attempt, before classification.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("HTTP {code}: {body}")]
    Status {
        code: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("undecodable response: {0}")]
    Decode(String),

    /// No usable credential could be obtained. Surfaces as a configuration error.
    #[error("credential unavailable: {0}")]
    Credential(String),
}

impl TransportError {
    /// Map onto the client's failure taxonomy.
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            TransportError::Network(_) => RemoteErrorKind::Transient,
            TransportError::Timeout(_) => RemoteErrorKind::Timeout,
            TransportError::Status { code, .. } if *code >= 500 || *code == 429 || *code == 408 => {
                RemoteErrorKind::Transient
            }
            TransportError::Status { .. } => RemoteErrorKind::Permanent,
            TransportError::Decode(_) | TransportError::Credential(_) => RemoteErrorKind::Permanent,
        }
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, TransportError::Credential(_))
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn into_remote(self, operation: &str) -> RemoteError {
        let kind = self.kind();
        let retry_after = self.retry_after();
        RemoteError::new(kind, operation, self.to_string()).with_retry_after(retry_after)
    }
}

/// One round-trip against the historian. Mockable for testing.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RemoteRequest, timeout: Duration) -> Result<Value, TransportError>;
}
