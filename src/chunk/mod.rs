//! Chunk planning
//!
//! Splits a requested `[start, end]` range into calendar-aligned sub-ranges
//! small enough for the server's query limits.
//!
//! ```text
//! 2024-06-01 ─────────────── 2024-08-15   (month, Australia/Sydney)
//!   │ June            │ July            │ Aug 1-15 │
//! ```

mod error;
mod planner;

pub use error::{ChunkError, ChunkResult};
pub use planner::{plan, plan_str, ChunkSpec, ChunkUnit};
