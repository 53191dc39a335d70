use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time_range::TimeRange;

/// Historian operations the core issues. Endpoint paths are a deployment
/// detail; `default_path` can be overridden per operation in configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOperation {
    BrowseNamespace,
    BrowseTags,
    SearchTags,
    GetTagProperties,
    GetTimeSeries,
    GetSupportedAggregates,
    GetSupportedTimezones,
}

impl RemoteOperation {
    pub const ALL: [RemoteOperation; 7] = [
        RemoteOperation::BrowseNamespace,
        RemoteOperation::BrowseTags,
        RemoteOperation::SearchTags,
        RemoteOperation::GetTagProperties,
        RemoteOperation::GetTimeSeries,
        RemoteOperation::GetSupportedAggregates,
        RemoteOperation::GetSupportedTimezones,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RemoteOperation::BrowseNamespace => "browse_namespace",
            RemoteOperation::BrowseTags => "browse_tags",
            RemoteOperation::SearchTags => "search_tags",
            RemoteOperation::GetTagProperties => "get_tag_properties",
            RemoteOperation::GetTimeSeries => "get_time_series",
            RemoteOperation::GetSupportedAggregates => "get_supported_aggregates",
            RemoteOperation::GetSupportedTimezones => "get_supported_timezones",
        }
    }

    pub fn default_path(&self) -> &'static str {
        match self {
            RemoteOperation::BrowseNamespace => "/browse/namespace",
            RemoteOperation::BrowseTags => "/browse/tags",
            RemoteOperation::SearchTags => "/tags/search",
            RemoteOperation::GetTagProperties => "/tags/properties",
            RemoteOperation::GetTimeSeries => "/timeseries/query",
            RemoteOperation::GetSupportedAggregates => "/meta/aggregates",
            RemoteOperation::GetSupportedTimezones => "/meta/timezones",
        }
    }

    /// Metadata lookups change rarely and get the long cache TTL.
    pub fn is_metadata(&self) -> bool {
        !matches!(self, RemoteOperation::GetTimeSeries)
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One call against the historian, before transport encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteRequest {
    pub operation: RemoteOperation,
    /// Browse root or search scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl RemoteRequest {
    pub fn new(operation: RemoteOperation) -> Self {
        Self {
            operation,
            path: None,
            query: None,
            tags: Vec::new(),
            time_range: None,
            page_size: None,
            limit: None,
        }
    }

    pub fn browse_namespace(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new(RemoteOperation::BrowseNamespace)
        }
    }

    pub fn browse_tags(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new(RemoteOperation::BrowseTags)
        }
    }

    pub fn search_tags(root: impl Into<String>, query: impl Into<String>, limit: usize) -> Self {
        Self {
            path: Some(root.into()),
            query: Some(query.into()),
            limit: Some(limit),
            ..Self::new(RemoteOperation::SearchTags)
        }
    }

    pub fn tag_properties(tags: Vec<String>) -> Self {
        Self {
            tags,
            ..Self::new(RemoteOperation::GetTagProperties)
        }
    }

    pub fn time_series(tags: Vec<String>, range: TimeRange, page_size: usize) -> Self {
        Self {
            tags,
            time_range: Some(range),
            page_size: Some(page_size),
            ..Self::new(RemoteOperation::GetTimeSeries)
        }
    }

    /// JSON body sent to the historian.
    pub fn body(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        if let Some(path) = &self.path {
            body.insert("path".to_string(), serde_json::json!(path));
        }
        if let Some(query) = &self.query {
            body.insert("query".to_string(), serde_json::json!(query));
        }
        if !self.tags.is_empty() {
            body.insert("tagNames".to_string(), serde_json::json!(self.tags));
        }
        if let Some(range) = &self.time_range {
            body.insert("startTime".to_string(), serde_json::json!(range.start.to_rfc3339()));
            body.insert("endTime".to_string(), serde_json::json!(range.end.to_rfc3339()));
            body.insert("timeZone".to_string(), serde_json::json!(range.timezone));
        }
        if let Some(page_size) = self.page_size {
            body.insert("pageSize".to_string(), serde_json::json!(page_size));
        }
        if let Some(limit) = self.limit {
            body.insert("limit".to_string(), serde_json::json!(limit));
        }
        serde_json::Value::Object(body)
    }
}
