//! Builds the static tag catalog database from a JSON seed file.

pub mod error;
pub mod seed;
pub mod writer;

pub use error::LoaderError;
pub use seed::{parse_seed, read_seed, SeedReport};
pub use writer::SqliteWriter;
