use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};

/// A timezone-aware query window. `start < end` always holds for values
/// built through [`TimeRange::new`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// IANA name of the timezone the window was resolved in.
    pub timezone: String,
}

impl TimeRange {
    /// Build a window, returning `None` unless `start < end`.
    pub fn new<Tz: TimeZone>(
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        timezone: impl Into<String>,
    ) -> Option<Self> {
        let start = start.fixed_offset();
        let end = end.fixed_offset();
        if start < end {
            Some(Self {
                start,
                end,
                timezone: timezone.into(),
            })
        } else {
            None
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Human-readable form used in resolver assumptions.
    pub fn describe(&self) -> String {
        format!(
            "{} to {} ({})",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            self.timezone
        )
    }
}
