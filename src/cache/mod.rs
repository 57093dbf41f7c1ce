//! Chunk cache
//!
//! One compressed file per `(measurement, chunk end date)`:
//!
//! ```text
//! <cache_dir>/
//!   temperature_2024-06-30.fxc.lz4
//!   temperature_2024-07-31.fxc.lz4
//!   power_2024-06-30.fxc.lz4
//! ```
//!
//! The file names are the only record of what has been downloaded; resume
//! points are derived from them on every run.
//!
//! - **encoding**: table ↔ bytes (delta-encoded timestamps, LZ4)
//! - **store**: directory layout, naming, listing and reading
//! - **error**: error types

mod encoding;
mod error;
mod store;

pub use encoding::{decode_table, encode_table};
pub use error::{CacheError, CacheResult};
pub use store::{CacheEntry, ChunkCache, CACHE_EXTENSION};
