pub mod catalog;
pub mod error;
pub mod key;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use catalog::Catalog;
pub use error::CacheError;
pub use key::CacheKey;
pub use sqlite::CatalogReader;
pub use store::{CacheSettings, CacheWeight, ResponseCache, StaleRead};
