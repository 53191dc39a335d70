use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tag::ScoredCandidate;
use crate::time_range::TimeRange;

/// Coarse bucket of the numeric confidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    pub fn from_confidence(confidence: f64, high: f64, medium: f64) -> Self {
        if confidence >= high {
            ConfidenceLabel::High
        } else if confidence >= medium {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}

/// Ranked answer to one natural-language tag query. Built fresh per call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionResult {
    pub request_id: Uuid,
    pub query: String,
    /// Context the resolver inferred rather than read literally (site, time range, ...).
    pub assumptions: BTreeMap<String, String>,
    pub candidates: Vec<ScoredCandidate>,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub confidence_label: ConfidenceLabel,
    pub clarifying_question: Option<String>,
    /// Time window mentioned in the query, if any.
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    /// Data-quality notes from the ingestion boundary (dropped items, missing fields).
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ResolutionResult {
    pub fn top(&self) -> Option<&ScoredCandidate> {
        self.candidates.first()
    }
}
