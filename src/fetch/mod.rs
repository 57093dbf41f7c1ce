//! Range fetching and incremental updates
//!
//! ```text
//! IncrementalUpdater ──► resolve() ──► cache file names | in-memory dataset
//!        │
//!        ▼
//!   RangeFetcher ──► plan() ──► build_query() ──► QueryExecutor ──► ChunkCache
//! ```
//!
//! Everything here runs strictly in order: one measurement at a time, one
//! chunk at a time, oldest first. A partial run therefore always leaves a
//! cache whose newest file is a valid resume point.

mod error;
mod fetcher;
mod resume;
mod update;

pub use error::{FetchError, FetchResult};
pub use fetcher::{FetchOptions, RangeFetcher};
pub use resume::{resolve, resume_state, ResumeSource, ResumeState};
pub use update::{merge, IncrementalUpdater};
