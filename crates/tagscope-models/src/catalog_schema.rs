use crate::tag::{CandidateSource, TagCandidate};

/// The SQLite table the loader writes and tagscope reads.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS tag_catalog (
///     path         TEXT PRIMARY KEY,
///     name         TEXT NOT NULL,
///     data_type    TEXT,
///     description  TEXT,
///     site         TEXT,
///     search_text  TEXT NOT NULL,
///     updated_at   TEXT NOT NULL
/// );
/// ```
///
/// `search_text` holds the normalized name, path and description so catalog
/// lookups are plain substring matches.
pub const CATALOG_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS tag_catalog (
    path         TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    data_type    TEXT,
    description  TEXT,
    site         TEXT,
    search_text  TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_catalog_site ON tag_catalog(site);
CREATE INDEX IF NOT EXISTS idx_catalog_name ON tag_catalog(name);
";

/// A raw catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub path: String,
    pub name: String,
    pub data_type: Option<String>,
    pub description: Option<String>,
    pub site: Option<String>,
    pub search_text: String,
    pub updated_at: String,
}

impl CatalogRow {
    pub fn to_candidate(&self) -> TagCandidate {
        TagCandidate {
            name: self.name.clone(),
            path: self.path.clone(),
            data_type: self.data_type.clone(),
            description: self.description.clone(),
            source: CandidateSource::Catalog,
        }
    }

    /// Site segment of a path: the first segment below a leading `Views` folder,
    /// or the first segment otherwise.
    pub fn site_of(path: &str) -> Option<String> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let site = if first.eq_ignore_ascii_case("views") {
            segments.next()?
        } else {
            first
        };
        Some(site.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_skips_views_root() {
        assert_eq!(
            CatalogRow::site_of("Views/Outao/Line1/Kiln/MainDrive/Speed").as_deref(),
            Some("Outao")
        );
        assert_eq!(CatalogRow::site_of("Maceira/Mill/Power").as_deref(), Some("Maceira"));
        assert_eq!(CatalogRow::site_of("Views").as_deref(), None);
        assert_eq!(CatalogRow::site_of("").as_deref(), None);
    }

    #[test]
    fn row_to_candidate() {
        let row = CatalogRow {
            path: "Views/Outao/Kiln/Temp".to_string(),
            name: "Temp".to_string(),
            data_type: Some("Float8".to_string()),
            description: None,
            site: Some("Outao".to_string()),
            search_text: "temp views outao kiln temp".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let candidate = row.to_candidate();
        assert_eq!(candidate.name, "Temp");
        assert_eq!(candidate.source, CandidateSource::Catalog);
    }
}
