//! Time parsing error types

use thiserror::Error;

/// Errors raised while normalizing time inputs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// No accepted format matched the text
    #[error("Could not parse time: '{0}'")]
    Parse(String),

    /// The value has a shape that cannot describe a point in time
    #[error("Unsupported time input: {0}")]
    UnsupportedInput(String),

    /// The zone name is not a known IANA zone
    #[error("Unknown timezone: '{0}'")]
    UnknownZone(String),
}

/// Result type alias for time operations
pub type TimeResult<T> = Result<T, TimeError>;
