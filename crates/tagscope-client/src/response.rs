//! Normalization of historian responses into one canonical shape.
//!
//! Historian versions answer with either bare arrays or wrapped objects and use
//! several spellings for the same field. Everything is decoded defensively here;
//! items that cannot be used are dropped and reported as data-quality notes.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tagscope_models::read::SeriesPoint;
use tagscope_models::tag::{CandidateSource, TagCandidate};

const LIST_KEYS: [&str; 5] = ["tags", "items", "data", "results", "children"];
const NAME_KEYS: [&str; 4] = ["name", "tagName", "tag_name", "displayName"];
const PATH_KEYS: [&str; 5] = ["path", "fullPath", "full_path", "tagPath", "id"];
const TYPE_KEYS: [&str; 4] = ["dataType", "data_type", "type", "valueType"];
const DESCRIPTION_KEYS: [&str; 3] = ["description", "desc", "documentation"];
const TIMESTAMP_KEYS: [&str; 4] = ["timestamp", "t", "time", "ts"];
const VALUE_KEYS: [&str; 2] = ["value", "v"];
const QUALITY_KEYS: [&str; 3] = ["quality", "q", "status"];
const POINT_TAG_KEYS: [&str; 3] = ["tag", "tagName", "path"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagListing {
    pub tags: Vec<TagCandidate>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesListing {
    pub points: Vec<SeriesPoint>,
    pub notes: Vec<String>,
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn first_value<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| obj.get(*k)).find(|v| !v.is_null())
}

/// The list inside a `{tags|items|data|results: [...]}` envelope, if any.
fn envelope_list(obj: &Map<String, Value>) -> Option<&Vec<Value>> {
    LIST_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(Value::as_array)
}

fn tag_from_object(obj: &Map<String, Value>, key_path: Option<&str>) -> Option<TagCandidate> {
    let path = first_str(obj, &PATH_KEYS).or(key_path)?;
    let name = first_str(obj, &NAME_KEYS)
        .map(str::to_string)
        .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path).to_string());
    let mut tag = TagCandidate::new(name, path).with_source(CandidateSource::Live);
    tag.data_type = first_str(obj, &TYPE_KEYS).map(str::to_string);
    tag.description = first_str(obj, &DESCRIPTION_KEYS).map(str::to_string);
    Some(tag)
}

/// Decode a browse/search answer: a bare array, an envelope object, or an
/// object keyed by tag path. Plain strings in arrays are taken as paths.
pub fn parse_tag_listing(body: &Value) -> TagListing {
    let mut listing = TagListing::default();
    let mut dropped = 0usize;

    let mut push_item = |item: &Value, key_path: Option<&str>, listing: &mut TagListing| {
        let tag = match item {
            Value::Object(obj) => tag_from_object(obj, key_path),
            Value::String(path) if !path.trim().is_empty() => {
                let path = path.trim();
                let name = path.rsplit('/').next().unwrap_or(path);
                Some(TagCandidate::new(name, path).with_source(CandidateSource::Live))
            }
            _ => key_path.map(|p| {
                let name = p.rsplit('/').next().unwrap_or(p);
                TagCandidate::new(name, p).with_source(CandidateSource::Live)
            }),
        };
        match tag {
            Some(tag) => listing.tags.push(tag),
            None => dropped += 1,
        }
    };

    match body {
        Value::Array(items) => {
            for item in items {
                push_item(item, None, &mut listing);
            }
        }
        Value::Object(obj) => {
            if let Some(items) = envelope_list(obj) {
                for item in items {
                    push_item(item, None, &mut listing);
                }
            } else {
                for (path, item) in obj {
                    push_item(item, Some(path.as_str()), &mut listing);
                }
            }
        }
        Value::Null => {}
        other => listing
            .notes
            .push(format!("unexpected tag listing shape: {}", type_name(other))),
    }

    if dropped > 0 {
        listing
            .notes
            .push(format!("{dropped} tag item(s) without a usable path were skipped"));
    }
    listing
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a timestamp as RFC 3339. Epoch numbers are taken as milliseconds when
/// they are too large to be seconds; unparseable strings are kept verbatim.
fn normalize_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let parsed = DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).to_rfc3339());
            Some(parsed.unwrap_or_else(|| s.clone()))
        }
        Value::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            let dt = if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }?;
            Some(dt.to_rfc3339())
        }
        _ => None,
    }
}

/// Why a point could not be kept.
enum Skipped {
    NoTimestamp,
    NoTag,
}

fn point_from(item: &Value, tag: Option<&str>) -> Result<SeriesPoint, Skipped> {
    match item {
        Value::Object(obj) => {
            let timestamp = first_value(obj, &TIMESTAMP_KEYS)
                .and_then(normalize_timestamp)
                .ok_or(Skipped::NoTimestamp)?;
            let tag = first_str(obj, &POINT_TAG_KEYS)
                .or(tag)
                .ok_or(Skipped::NoTag)?;
            Ok(SeriesPoint {
                tag: tag.to_string(),
                timestamp,
                value: first_value(obj, &VALUE_KEYS).cloned().unwrap_or(Value::Null),
                quality: first_value(obj, &QUALITY_KEYS).map(|q| match q {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
            })
        }
        Value::Array(pair) if pair.len() >= 2 => {
            let timestamp = normalize_timestamp(&pair[0]).ok_or(Skipped::NoTimestamp)?;
            Ok(SeriesPoint {
                tag: tag.ok_or(Skipped::NoTag)?.to_string(),
                timestamp,
                value: pair[1].clone(),
                quality: pair.get(2).and_then(Value::as_str).map(str::to_string),
            })
        }
        _ => Err(Skipped::NoTimestamp),
    }
}

/// Decode a time-series answer: a flat point array, a `{data: [...]}` envelope
/// or a per-tag map `{ "<tag>": [points] }`.
///
/// `default_tag` names points that do not carry their own tag. Pass it only for
/// single-tag reads: with several tags requested, an untagged point cannot be
/// attributed and is skipped with a note.
pub fn parse_time_series(body: &Value, default_tag: Option<&str>) -> SeriesListing {
    let mut listing = SeriesListing::default();
    let mut no_timestamp = 0usize;
    let mut no_tag = 0usize;

    let mut take = |items: &[Value], tag: Option<&str>, listing: &mut SeriesListing| {
        for item in items {
            match point_from(item, tag) {
                Ok(point) => listing.points.push(point),
                Err(Skipped::NoTimestamp) => no_timestamp += 1,
                Err(Skipped::NoTag) => no_tag += 1,
            }
        }
    };

    match body {
        Value::Array(items) => take(items, default_tag, &mut listing),
        Value::Object(obj) => {
            if let Some(items) = envelope_list(obj) {
                take(items, default_tag, &mut listing);
            } else {
                for (tag, series) in obj {
                    match series {
                        Value::Array(items) => take(items, Some(tag), &mut listing),
                        Value::Object(inner) => match envelope_list(inner) {
                            Some(items) => take(items, Some(tag), &mut listing),
                            None => listing
                                .notes
                                .push(format!("tag {tag}: no point list in response")),
                        },
                        _ => listing
                            .notes
                            .push(format!("tag {tag}: unexpected {} instead of points", type_name(series))),
                    }
                }
            }
        }
        Value::Null => {}
        other => listing
            .notes
            .push(format!("unexpected time-series shape: {}", type_name(other))),
    }

    if no_timestamp > 0 {
        listing
            .notes
            .push(format!("{no_timestamp} point(s) without a readable timestamp were skipped"));
    }
    if no_tag > 0 {
        listing.notes.push(format!(
            "{no_tag} point(s) did not name their tag and several tags were requested; \
             they were skipped, read the tags one at a time"
        ));
    }
    listing
}
