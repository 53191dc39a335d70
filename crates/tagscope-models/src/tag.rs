use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Where a candidate was discovered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    #[default]
    Catalog,
    Live,
}

/// A tag found by a browse/search call or in the static catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCandidate {
    pub name: String,
    /// Fully-qualified historian path, e.g. `Views/Outao/Line1/Kiln/MainDrive/Speed`.
    pub path: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: CandidateSource,
}

impl TagCandidate {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            data_type: None,
            description: None,
            source: CandidateSource::Catalog,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_source(mut self, source: CandidateSource) -> Self {
        self.source = source;
        self
    }

    /// Path segments above the tag itself.
    pub fn folders(&self) -> impl Iterator<Item = &str> {
        let mut segments: Vec<&str> = self.path.split('/').filter(|s| !s.is_empty()).collect();
        segments.pop();
        segments.into_iter()
    }

    /// Fill fields this candidate lacks from another sighting of the same path.
    pub fn merge(&mut self, other: &TagCandidate) {
        if self.data_type.is_none() {
            self.data_type.clone_from(&other.data_type);
        }
        if self.description.is_none() {
            self.description.clone_from(&other.description);
        }
    }
}

/// A candidate with its score for one resolution request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: TagCandidate,
    pub score: f64,
    pub matched_terms: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folders_exclude_tag_name() {
        let tag = TagCandidate::new("Speed", "Views/Outao/Line1/Kiln/MainDrive/Speed");
        let folders: Vec<&str> = tag.folders().collect();
        assert_eq!(folders, vec!["Views", "Outao", "Line1", "Kiln", "MainDrive"]);
    }

    #[test]
    fn merge_fills_missing_fields_only() {
        let mut live = TagCandidate::new("Speed", "A/Speed")
            .with_data_type("Float8")
            .with_source(CandidateSource::Live);
        let catalog = TagCandidate::new("Speed", "A/Speed")
            .with_data_type("Int4")
            .with_description("Main drive speed");
        live.merge(&catalog);
        assert_eq!(live.data_type.as_deref(), Some("Float8"));
        assert_eq!(live.description.as_deref(), Some("Main drive speed"));
        assert_eq!(live.source, CandidateSource::Live);
    }

    #[test]
    fn candidate_deserializes_without_optional_fields() {
        let tag: TagCandidate =
            serde_json::from_str(r#"{"name": "Temp", "path": "A/B/Temp"}"#).unwrap();
        assert_eq!(tag.source, CandidateSource::Catalog);
        assert!(tag.description.is_none());
    }
}
