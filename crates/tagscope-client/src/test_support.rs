//! Scripted transport for exercising the client and its callers without a historian.
//!
//! `MockTransport` answers from a queue of scripted outcomes (falling back to a
//! default), counts network attempts per operation and can simulate latency.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tagscope_models::remote::{RemoteOperation, RemoteRequest};

use crate::transport::{Transport, TransportError};

type Outcome = Result<Value, TransportError>;

pub struct MockTransport {
    scripted: Mutex<HashMap<RemoteOperation, VecDeque<Outcome>>>,
    fallback: Mutex<HashMap<RemoteOperation, Outcome>>,
    default: Mutex<Outcome>,
    latency: Mutex<Duration>,
    attempts: AtomicU32,
    per_operation: Mutex<HashMap<RemoteOperation, u32>>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Answers every request with an empty JSON array until told otherwise.
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            fallback: Mutex::new(HashMap::new()),
            default: Mutex::new(Ok(Value::Array(Vec::new()))),
            latency: Mutex::new(Duration::ZERO),
            attempts: AtomicU32::new(0),
            per_operation: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with `outcome` unless something more specific is scripted.
    pub fn always(outcome: Outcome) -> Self {
        let mock = Self::new();
        *mock.default.lock() = outcome;
        mock
    }

    /// Queue one outcome for the next call to `operation`.
    pub fn push(&self, operation: RemoteOperation, outcome: Outcome) -> &Self {
        self.scripted
            .lock()
            .entry(operation)
            .or_default()
            .push_back(outcome);
        self
    }

    /// Answer `operation` with `outcome` whenever its queue is empty.
    pub fn respond(&self, operation: RemoteOperation, outcome: Outcome) -> &Self {
        self.fallback.lock().insert(operation, outcome);
        self
    }

    pub fn set_default(&self, outcome: Outcome) {
        *self.default.lock() = outcome;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Total network attempts seen.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, operation: RemoteOperation) -> u32 {
        self.per_operation
            .lock()
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    pub fn server_error() -> Outcome {
        Err(TransportError::Status {
            code: 503,
            body: "service unavailable".to_string(),
            retry_after: None,
        })
    }

    pub fn network_error() -> Outcome {
        Err(TransportError::Network("connection refused".to_string()))
    }

    pub fn not_found() -> Outcome {
        Err(TransportError::Status {
            code: 404,
            body: "no such tag".to_string(),
            retry_after: None,
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &RemoteRequest, timeout: Duration) -> Result<Value, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self
            .per_operation
            .lock()
            .entry(request.operation)
            .or_insert(0) += 1;
        self.requests.lock().push(request.clone());

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            if latency > timeout {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::Timeout(timeout));
            }
            tokio::time::sleep(latency).await;
        }

        let scripted = self
            .scripted
            .lock()
            .get_mut(&request.operation)
            .and_then(VecDeque::pop_front);
        if let Some(outcome) = scripted {
            return outcome;
        }
        if let Some(outcome) = self.fallback.lock().get(&request.operation) {
            return outcome.clone();
        }
        self.default.lock().clone()
    }
}
