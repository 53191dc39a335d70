use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Seed is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported seed layout: {0}")]
    Seed(String),

    #[error("Failed to read seed: {0}")]
    Io(#[from] std::io::Error),
}
