pub mod catalog_schema;
pub mod config;
pub mod policy;
pub mod read;
pub mod remote;
pub mod resolution;
pub mod stats;
pub mod tag;
pub mod text;
pub mod time_range;

pub use catalog_schema::CatalogRow;
pub use config::{
    BreakerConfig, CacheConfig, ClientConfig, ConfigError, HistorianConfig, LimitsConfig,
    ResolverConfig, RetryConfig, ScoreWeights, TagscopeConfig,
};
pub use policy::{CircuitState, RetryPolicy};
pub use read::{HealthReport, ReadResponse, ResponseSource, SeriesPoint};
pub use remote::{RemoteOperation, RemoteRequest};
pub use resolution::{ConfidenceLabel, ResolutionResult};
pub use stats::{CacheStats, ClientStats, PoolStats};
pub use tag::{CandidateSource, ScoredCandidate, TagCandidate};
pub use time_range::TimeRange;
