//! Chunk planning error types

use crate::time::TimeError;
use thiserror::Error;

/// Errors that can occur while planning chunks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Chunking unit outside day/week/month
    #[error("Invalid chunk unit: '{0}' (expected day, week or month)")]
    InvalidChunkUnit(String),

    /// A range boundary could not be parsed
    #[error(transparent)]
    Time(#[from] TimeError),
}

/// Result type alias for chunk planning
pub type ChunkResult<T> = Result<T, ChunkError>;
