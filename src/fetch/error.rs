//! Fetch error types

use crate::cache::CacheError;
use crate::chunk::ChunkError;
use crate::executor::ExecutorError;
use crate::time::TimeError;
use thiserror::Error;

/// Errors that abort a fetch or update
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// A chunk query failed; later chunks were not attempted
    #[error("Query for {measurement} {chunk} failed: {source}")]
    Executor {
        measurement: String,
        chunk: String,
        #[source]
        source: ExecutorError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result type alias for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;
