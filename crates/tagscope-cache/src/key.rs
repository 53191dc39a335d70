use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Builder for deterministic cache keys.
///
/// Parameters are kept in a sorted map, lists are sorted and deduplicated, free
/// text has its whitespace collapsed and time windows are floored to a
/// granularity, so logically equal requests land on the same key. The final key
/// is `namespace:operation:<sha256 of the canonical parameters>`, which keeps
/// pattern invalidation by operation possible.
#[derive(Debug, Clone)]
pub struct CacheKey {
    namespace: String,
    operation: String,
    params: BTreeMap<String, Value>,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            operation: operation.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Free text with runs of whitespace collapsed and ends trimmed.
    pub fn text(self, name: &str, value: &str) -> Self {
        let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
        self.param(name, collapsed)
    }

    /// An unordered list of strings.
    pub fn list<S: AsRef<str>>(self, name: &str, values: &[S]) -> Self {
        let mut items: Vec<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
        items.sort();
        items.dedup();
        self.param(name, items)
    }

    /// A time window with both bounds floored to `granularity_secs`, so requests a
    /// few seconds apart for "the last hour" share an entry.
    pub fn window<Tz: TimeZone>(
        self,
        name: &str,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
        granularity_secs: i64,
    ) -> Self {
        let granularity = granularity_secs.max(1);
        let floor = |ts: i64| ts.div_euclid(granularity) * granularity;
        self.param(
            name,
            serde_json::json!([floor(start.timestamp()), floor(end.timestamp())]),
        )
    }

    pub fn build(&self) -> String {
        // BTreeMap serializes in key order; nested values are already canonical.
        let canonical = serde_json::to_string(&self.params).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        format!("{}:{}:{}", self.namespace, self.operation, hex::encode(digest))
    }
}
