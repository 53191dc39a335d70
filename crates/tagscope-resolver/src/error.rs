use thiserror::Error;

/// A time expression that could not be turned into timestamps. Always echoes the input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("Unrecognized time expression: '{0}' (try 'last 24 hours', 'yesterday' or an ISO-8601 timestamp)")]
    Unrecognized(String),

    #[error("Time expression out of range: '{0}'")]
    OutOfRange(String),

    #[error("Empty time window: '{start}' is not before '{end}'")]
    EmptyWindow { start: String, end: String },

    #[error("Unknown timezone: '{0}' (expected an IANA name such as 'Europe/Lisbon')")]
    UnknownTimezone(String),
}

#[derive(Error, Debug)]
pub enum ResolverError {
    /// Neither the catalog nor the historian produced anything usable.
    #[error("Tag lookup unavailable: catalog failed ({catalog}) and live search failed ({live})")]
    Unavailable { catalog: String, live: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Time parse error: {0}")]
    Time(#[from] TimeParseError),
}
