use rusqlite::Connection;
use tagscope_models::catalog_schema::{CatalogRow, CATALOG_TABLE_DDL};

use crate::error::LoaderError;

const UPSERT_SQL: &str = "INSERT OR REPLACE INTO tag_catalog \
     (path, name, data_type, description, site, search_text, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// Writable catalog connection.
///
/// WAL journal so a running tagscope can keep reading while the loader writes.
pub struct SqliteWriter {
    conn: Connection,
}

impl SqliteWriter {
    /// Open (or create) the catalog database and ensure the schema exists.
    pub fn open(path: &str) -> Result<Self, LoaderError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CATALOG_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, LoaderError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CATALOG_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn upsert(&self, row: &CatalogRow) -> Result<(), LoaderError> {
        self.conn.execute(
            UPSERT_SQL,
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

    /// Upsert all rows in one transaction. Returns the number written.
    pub fn upsert_batch(&mut self, rows: &[CatalogRow]) -> Result<usize, LoaderError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for row in rows {
                stmt.execute(rusqlite::params![
                    row.path,
                    row.name,
                    row.data_type,
                    row.description,
                    row.site,
                    row.search_text,
                    row.updated_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Delete every catalog row. Returns the number deleted.
    pub fn clear(&self) -> Result<usize, LoaderError> {
        Ok(self.conn.execute("DELETE FROM tag_catalog", [])?)
    }

    pub fn count(&self) -> Result<u64, LoaderError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tag_catalog", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}
