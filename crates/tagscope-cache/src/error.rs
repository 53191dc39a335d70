use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid invalidation pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Catalog not available: {0}")]
    Unavailable(String),
}
