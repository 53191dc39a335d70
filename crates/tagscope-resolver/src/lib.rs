//! Natural-language tag resolution and time expression parsing.

pub mod clarify;
pub mod error;
pub mod resolver;
pub mod scoring;
pub mod synonyms;
pub mod time_expr;

pub use error::{ResolverError, TimeParseError};
pub use resolver::{ResolveRequest, Resolver};
pub use synonyms::{QueryTerm, SynonymTable};
pub use time_expr::{extract_time_phrase, parse, parse_range, parse_timezone, window, ParsedTime, TimePhrase};
