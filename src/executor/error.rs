//! Query execution error types

use thiserror::Error;

/// Errors raised by a query executor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The request never completed (connect, timeout, body read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The server reported an error inside the result stream
    #[error("Query failed: {0}")]
    Query(String),

    /// A result table lacks a column every result must carry
    #[error("Result is missing expected column '{0}'")]
    Schema(String),

    /// The response body could not be decoded
    #[error("Could not decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ExecutorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExecutorError::Transport(format!("request timed out: {}", err))
        } else if err.is_connect() {
            ExecutorError::Transport(format!("connection failed: {}", err))
        } else {
            ExecutorError::Transport(err.to_string())
        }
    }
}

/// Result type alias for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExecutorError::Schema("_time".to_string());
        assert_eq!(err.to_string(), "Result is missing expected column '_time'");

        let err = ExecutorError::Api {
            status: 401,
            message: "unauthorized access".to_string(),
        };
        assert_eq!(err.to_string(), "Server returned 401: unauthorized access");
    }
}
