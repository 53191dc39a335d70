use rusqlite::{Connection, Row};
use tagscope_models::catalog_schema::{CatalogRow, CATALOG_TABLE_DDL};

use crate::error::CacheError;

const SELECT_COLUMNS: &str =
    "SELECT path, name, data_type, description, site, search_text, updated_at FROM tag_catalog";

/// Read-only accessor for the static tag catalog.
///
/// The catalog database is written by `tagscope-loader` and only read here.
pub struct CatalogReader {
    conn: Connection,
}

impl CatalogReader {
    /// Open a read-only connection to the catalog database.
    pub fn open(path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database with the schema created. Writable so tests can seed rows.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CATALOG_TABLE_DDL)?;
        Ok(Self { conn })
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<CatalogRow> {
        Ok(CatalogRow {
            path: row.get(0)?,
            name: row.get(1)?,
            data_type: row.get(2)?,
            description: row.get(3)?,
            site: row.get(4)?,
            search_text: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    /// Rows whose normalized search text contains any of `tokens`.
    ///
    /// Rows matching more distinct tokens come first (then by path), so a token
    /// shared by much of the catalog, like a site name, cannot push the rows that
    /// match the whole query past `limit`.
    pub fn search(&self, tokens: &[String], limit: usize) -> Result<Vec<CatalogRow>, CacheError> {
        let mut distinct: Vec<&str> = tokens
            .iter()
            .map(String::as_str)
            .filter(|t| !t.is_empty())
            .collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.is_empty() {
            return Ok(Vec::new());
        }

        let hits: Vec<String> = (1..=distinct.len())
            .map(|i| format!("(instr(search_text, ?{i}) > 0)"))
            .collect();
        let sql = format!(
            "{SELECT_COLUMNS} WHERE {any} ORDER BY {coverage} DESC, path LIMIT {limit}",
            any = hits.join(" OR "),
            coverage = hits.join(" + "),
        );

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(distinct.iter()), Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn by_site(&self, site: &str) -> Result<Vec<CatalogRow>, CacheError> {
        let sql = format!("{SELECT_COLUMNS} WHERE site = ?1 ORDER BY path");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params![site], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<u64, CacheError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tag_catalog", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Insert or replace a row. The loader writes through its own connection; this
    /// exists for tests and in-memory catalogs.
    pub fn insert(&self, row: &CatalogRow) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tag_catalog \
             (path, name, data_type, description, site, search_text, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                row.path,
                row.name,
                row.data_type,
                row.description,
                row.site,
                row.search_text,
                row.updated_at,
            ],
        )?;
        Ok(())
    }
}
