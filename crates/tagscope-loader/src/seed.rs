use std::path::Path;

use serde_json::{Map, Value};
use tagscope_models::catalog_schema::CatalogRow;
use tagscope_models::text::search_text;
use tracing::warn;

use crate::error::LoaderError;

const LIST_KEYS: [&str; 3] = ["tags", "items", "data"];
const PATH_KEYS: [&str; 5] = ["path", "fullPath", "full_path", "tagPath", "tag_path"];
const NAME_KEYS: [&str; 3] = ["name", "tagName", "tag_name"];
const TYPE_KEYS: [&str; 3] = ["dataType", "data_type", "type"];
const DESCRIPTION_KEYS: [&str; 3] = ["description", "desc", "documentation"];
const SITE_KEYS: [&str; 2] = ["site", "plant"];

/// Rows parsed from a seed file plus how many entries were unusable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedReport {
    pub rows: Vec<CatalogRow>,
    pub skipped: usize,
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn row_from(obj: &Map<String, Value>, updated_at: &str) -> Option<CatalogRow> {
    let path = first_str(obj, &PATH_KEYS)?.trim_matches('/').to_string();
    if path.is_empty() {
        return None;
    }
    let name = first_str(obj, &NAME_KEYS)
        .map(str::to_string)
        .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(&path).to_string());
    let description = first_str(obj, &DESCRIPTION_KEYS).map(str::to_string);
    let site = first_str(obj, &SITE_KEYS)
        .map(str::to_string)
        .or_else(|| CatalogRow::site_of(&path));

    Some(CatalogRow {
        search_text: search_text(&name, &path, description.as_deref()),
        data_type: first_str(obj, &TYPE_KEYS).map(str::to_string),
        description,
        site,
        name,
        path,
        updated_at: updated_at.to_string(),
    })
}

/// Parse seed JSON: either a bare array of tag objects or an object with a
/// `tags`/`items`/`data` array. Entries without a path are skipped.
pub fn parse_seed(raw: &str, updated_at: &str) -> Result<SeedReport, LoaderError> {
    let doc: Value = serde_json::from_str(raw)?;
    let items = match &doc {
        Value::Array(items) => items,
        Value::Object(obj) => LIST_KEYS
            .iter()
            .filter_map(|k| obj.get(*k))
            .find_map(Value::as_array)
            .ok_or_else(|| {
                LoaderError::Seed(
                    "expected an array of tags or an object with a 'tags' array".to_string(),
                )
            })?,
        _ => {
            return Err(LoaderError::Seed(
                "expected an array of tags or an object with a 'tags' array".to_string(),
            ))
        }
    };

    let mut report = SeedReport::default();
    for (index, item) in items.iter().enumerate() {
        match item.as_object().and_then(|obj| row_from(obj, updated_at)) {
            Some(row) => report.rows.push(row),
            None => {
                warn!(index, "Skipping seed entry without a path");
                report.skipped += 1;
            }
        }
    }
    Ok(report)
}

pub fn read_seed(path: &Path, updated_at: &str) -> Result<SeedReport, LoaderError> {
    let raw = std::fs::read_to_string(path)?;
    parse_seed(&raw, updated_at)
}
