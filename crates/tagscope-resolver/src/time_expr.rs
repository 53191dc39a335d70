//! Natural-language and ISO-8601 time expressions to timezone-aware timestamps.
//!
//! Pure functions: the reference instant and the plant timezone are always
//! supplied by the caller. Unrecognized input is an error that echoes the
//! input; nothing here guesses a default.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tagscope_models::time_range::TimeRange;

use crate::error::TimeParseError;

/// Result of parsing one expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTime {
    Instant(DateTime<Tz>),
    Range { start: DateTime<Tz>, end: DateTime<Tz> },
}

/// A time phrase found inside a longer query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimePhrase {
    pub phrase: String,
    /// The query with the phrase (and connector words like "over the") removed.
    pub remainder: String,
}

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const CONNECTORS: [&str; 7] = ["in", "over", "for", "during", "the", "from", "since"];

pub fn parse_timezone(name: &str) -> Result<Tz, TimeParseError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimeParseError::UnknownTimezone(name.to_string()))
}

fn unit_duration(unit: &str) -> Option<Duration> {
    match unit {
        "m" | "min" | "mins" | "minute" | "minutes" => Some(Duration::minutes(1)),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(Duration::hours(1)),
        "d" | "day" | "days" => Some(Duration::days(1)),
        "w" | "wk" | "wks" | "week" | "weeks" => Some(Duration::weeks(1)),
        _ => None,
    }
}

fn times(count: i64, unit: Duration) -> Option<Duration> {
    if count <= 0 {
        return None;
    }
    unit.checked_mul(i32::try_from(count).ok()?)
}

/// `24h`, `30m`, `7d`, `2w`.
fn compact_duration(token: &str) -> Option<Duration> {
    let split = token.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = token.split_at(split);
    if digits.is_empty() {
        return None;
    }
    times(digits.parse().ok()?, unit_duration(unit)?)
}

/// `24 hours`, `a day`, `hour`, `24h`.
fn duration_words(words: &[&str]) -> Option<Duration> {
    match words {
        [single] => compact_duration(single).or_else(|| {
            // "last hour", "past day"
            unit_duration(single)
        }),
        [count, unit] => {
            let count = match *count {
                "a" | "an" | "one" => 1,
                n => n.parse().ok()?,
            };
            times(count, unit_duration(unit)?)
        }
        _ => None,
    }
}

fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        // Nonexistent local time (spring-forward gap): take the first valid instant after it.
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

fn local_midnight(tz: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    localize(tz, date.and_hms_opt(0, 0, 0)?)
}

fn parse_absolute(text: &str, tz: Tz) -> Option<DateTime<Tz>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&tz));
    }
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return localize(tz, naive);
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    local_midnight(tz, date)
}

/// Parse one expression relative to `reference` in timezone `tz`.
///
/// Recognized: `now`, `today`, `yesterday`, `last|past [N] minutes|hours|days|weeks`
/// (and `last week`), compact durations (`24h`), `N units ago`, ISO-8601
/// timestamps and `start/end` intervals.
pub fn parse(expr: &str, reference: DateTime<Utc>, tz: Tz) -> Result<ParsedTime, TimeParseError> {
    let unrecognized = || TimeParseError::Unrecognized(expr.to_string());
    let out_of_range = || TimeParseError::OutOfRange(expr.to_string());

    let raw = expr.trim();
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if text.is_empty() {
        return Err(unrecognized());
    }
    let now = reference.with_timezone(&tz);

    match text.as_str() {
        "now" => return Ok(ParsedTime::Instant(now)),
        "today" => {
            let start = local_midnight(tz, now.date_naive()).ok_or_else(out_of_range)?;
            return Ok(ParsedTime::Range { start, end: now });
        }
        "yesterday" => {
            let today = now.date_naive();
            let yesterday = today.pred_opt().ok_or_else(out_of_range)?;
            let start = local_midnight(tz, yesterday).ok_or_else(out_of_range)?;
            let end = local_midnight(tz, today).ok_or_else(out_of_range)?;
            return Ok(ParsedTime::Range { start, end });
        }
        _ => {}
    }

    let words: Vec<&str> = text.split(' ').collect();

    if matches!(words[0], "last" | "past") && words.len() > 1 {
        let span = duration_words(&words[1..]).ok_or_else(unrecognized)?;
        let start = now.checked_sub_signed(span).ok_or_else(out_of_range)?;
        return Ok(ParsedTime::Range { start, end: now });
    }

    if words.len() > 1 && words[words.len() - 1] == "ago" {
        let span = duration_words(&words[..words.len() - 1]).ok_or_else(unrecognized)?;
        let at = now.checked_sub_signed(span).ok_or_else(out_of_range)?;
        return Ok(ParsedTime::Instant(at));
    }

    if words.len() == 1 {
        if let Some(span) = compact_duration(words[0]) {
            let start = now.checked_sub_signed(span).ok_or_else(out_of_range)?;
            return Ok(ParsedTime::Range { start, end: now });
        }
    }

    if let Some((a, b)) = raw.split_once('/') {
        let start = parse_absolute(a.trim(), tz).ok_or_else(unrecognized)?;
        let end = parse_absolute(b.trim(), tz).ok_or_else(unrecognized)?;
        return Ok(ParsedTime::Range { start, end });
    }

    parse_absolute(raw, tz)
        .map(ParsedTime::Instant)
        .ok_or_else(unrecognized)
}

/// Parse an expression that must describe a window. A bare instant means
/// "from then until `reference`".
pub fn parse_range(expr: &str, reference: DateTime<Utc>, tz: Tz) -> Result<TimeRange, TimeParseError> {
    let (start, end) = match parse(expr, reference, tz)? {
        ParsedTime::Range { start, end } => (start, end),
        ParsedTime::Instant(at) => (at, reference.with_timezone(&tz)),
    };
    TimeRange::new(start, end, tz.name()).ok_or_else(|| TimeParseError::EmptyWindow {
        start: expr.to_string(),
        end: "now".to_string(),
    })
}

/// Compose a read window from separate start and end expressions. A range
/// contributes its start to the start bound and its end to the end bound.
pub fn window(
    start_expr: &str,
    end_expr: &str,
    reference: DateTime<Utc>,
    tz: Tz,
) -> Result<TimeRange, TimeParseError> {
    let start = match parse(start_expr, reference, tz)? {
        ParsedTime::Instant(at) => at,
        ParsedTime::Range { start, .. } => start,
    };
    let end = match parse(end_expr, reference, tz)? {
        ParsedTime::Instant(at) => at,
        ParsedTime::Range { end, .. } => end,
    };
    TimeRange::new(start, end, tz.name()).ok_or_else(|| TimeParseError::EmptyWindow {
        start: start_expr.to_string(),
        end: end_expr.to_string(),
    })
}

/// Find a time phrase inside a free-text query, preferring the earliest and
/// then the longest match. Bare compact durations (`2d`) only count after
/// `last`/`past`, since they also occur in equipment names.
pub fn extract_time_phrase(query: &str) -> Option<TimePhrase> {
    let words: Vec<&str> = query.split_whitespace().collect();
    let reference = Utc::now();

    for i in 0..words.len() {
        let longest = 5.min(words.len() - i);
        for len in (1..=longest).rev() {
            let candidate = words[i..i + len]
                .join(" ")
                .trim_end_matches(['?', '!', ',', ';'])
                .to_string();
            if candidate.is_empty() {
                continue;
            }
            if len == 1 && compact_duration(&candidate.to_lowercase()).is_some() {
                continue;
            }
            if parse(&candidate, reference, Tz::UTC).is_err() {
                continue;
            }

            let mut start = i;
            while start > 0 && CONNECTORS.contains(&words[start - 1].to_lowercase().as_str()) {
                start -= 1;
            }
            let remainder = words[..start]
                .iter()
                .chain(words[i + len..].iter())
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            return Some(TimePhrase {
                phrase: candidate,
                remainder,
            });
        }
    }
    None
}
