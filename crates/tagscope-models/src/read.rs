use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::CircuitState;
use crate::stats::{CacheStats, ClientStats, PoolStats};
use crate::time_range::TimeRange;

/// One time-series sample in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub tag: String,
    /// RFC 3339 when the historian sent something parseable, otherwise as received.
    pub timestamp: String,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

/// Where a client response came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Served from an expired cache entry because the historian was unavailable.
    StaleCache,
}

/// Result of the `read` tool. Failures are reported in `error`, never raised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadResponse {
    pub request_id: Uuid,
    pub data: Vec<SeriesPoint>,
    pub count: usize,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub source: Option<ResponseSource>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub guidance: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ReadResponse {
    pub fn failed(request_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            request_id,
            data: Vec::new(),
            count: 0,
            time_range: None,
            source: None,
            truncated: false,
            guidance: None,
            error: Some(error.into()),
            notes: Vec::new(),
        }
    }
}

/// Snapshot returned by the `health` tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub circuit_state: CircuitState,
    pub pool: PoolStats,
    pub client: ClientStats,
    pub cache: CacheStats,
    pub catalog_hot_entries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_read_carries_error_and_no_data() {
        let response = ReadResponse::failed(Uuid::nil(), "circuit open; retry after 30s");
        assert_eq!(response.count, 0);
        assert!(response.data.is_empty());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "circuit open; retry after 30s");
    }

    #[test]
    fn point_without_quality_omits_field() {
        let point = SeriesPoint {
            tag: "A/B".to_string(),
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            value: serde_json::json!(12.5),
            quality: None,
        };
        let json = serde_json::to_value(&point).unwrap();
        assert!(json.get("quality").is_none());
    }
}
