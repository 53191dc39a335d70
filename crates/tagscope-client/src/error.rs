use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy every transport failure is mapped onto before it leaves the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Network error or 5xx/429; retried, surfaced once attempts are exhausted.
    Transient,
    /// 4xx, malformed request or rejected credential; never retried.
    Permanent,
    /// Breaker is open; no network attempt was made.
    CircuitOpen,
    /// An attempt, the pool wait or the caller's deadline ran out.
    Timeout,
}

impl RemoteErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteErrorKind::Transient | RemoteErrorKind::Timeout)
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::Transient => write!(f, "transient"),
            RemoteErrorKind::Permanent => write!(f, "permanent"),
            RemoteErrorKind::CircuitOpen => write!(f, "circuit_open"),
            RemoteErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// A classified historian failure. `Display` always ends with a remediation hint.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub operation: String,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// What the caller can do about it.
    pub fn remediation(&self) -> String {
        let wait = self
            .retry_after
            .map(|d| format!("retry after {}s", d.as_secs().max(1)));
        match self.kind {
            RemoteErrorKind::CircuitOpen => {
                format!("circuit open; {}", wait.unwrap_or_else(|| "retry shortly".to_string()))
            }
            RemoteErrorKind::Transient => format!(
                "historian temporarily unavailable; {}",
                wait.unwrap_or_else(|| "retry later".to_string())
            ),
            RemoteErrorKind::Timeout => {
                "historian did not answer in time; narrow the time range or tag list, or retry later"
                    .to_string()
            }
            RemoteErrorKind::Permanent => {
                "request rejected by the historian; check tag paths, time range and credentials"
                    .to_string()
            }
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed ({}): {}; {}",
            self.operation,
            self.kind,
            self.message,
            self.remediation()
        )
    }
}

impl std::error::Error for RemoteError {}

#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Missing credential or unusable client setup. Not recoverable per request.
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            ClientError::Remote(e) => Some(e),
            ClientError::Config(_) => None,
        }
    }

    pub fn kind(&self) -> Option<RemoteErrorKind> {
        self.remote().map(|e| e.kind)
    }
}
