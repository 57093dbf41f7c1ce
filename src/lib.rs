//! # fluxfetch
//!
//! Chunked, resumable downloads of InfluxDB 2.x measurements.
//!
//! ## Features
//!
//! - **Chunking**: large ranges are split into day, week or month chunks whose
//!   boundaries follow the wall clock of a chosen timezone
//! - **Filters**: measurement, field and tag predicates rendered as Flux
//! - **Caching**: each chunk is stored as an LZ4-compressed file named by
//!   measurement and end date
//! - **Incremental updates**: resume from the newest cached file or the
//!   newest row of a dataset already in memory
//!
//! ## Modules
//!
//! - [`time`]: time input normalization
//! - [`chunk`]: range chunk planning
//! - [`query`]: filter specs and the Flux query builder
//! - [`executor`]: the query executor boundary and the HTTP client
//! - [`table`]: result tables
//! - [`cache`]: the on-disk chunk cache
//! - [`fetch`]: range fetching, resume points and incremental updates
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fluxfetch::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = InfluxClient::new(InfluxSettings {
//!         url: "http://localhost:8086".to_string(),
//!         token: "my-token".to_string(),
//!         org: "home".to_string(),
//!         timeout_secs: 60,
//!     })?;
//!
//!     let options = FetchOptions::new("sensors", chrono_tz::Europe::London)
//!         .unit(ChunkUnit::Week)
//!         .save_to("./cache");
//!     let extras = FilterExtras::new().field("value").tag("room", "kitchen");
//!
//!     let fetcher = RangeFetcher::new(client);
//!     let rows = fetcher
//!         .fetch(&["temperature"], &"2024-01-01".into(), &"2024-03-31".into(), &extras, &options)
//!         .await?;
//!
//!     println!("Fetched {} rows", rows.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chunk;
pub mod config;
pub mod executor;
pub mod fetch;
pub mod query;
pub mod table;
pub mod time;

// Re-export top-level types for convenience
pub use time::{parse, parse_zone, to_utc_string, Instant, TimeError, TimeInput};

pub use chunk::{plan, plan_str, ChunkError, ChunkSpec, ChunkUnit};

pub use query::{build_query, escape_flux_string, FilterExtras, FilterSpec, TagFilter};

pub use executor::{
    ExecutorError, ExecutorResult, InfluxClient, InfluxSettings, QueryExecutor, QueryOutcome,
};

pub use table::{FieldValue, ResultRow, ResultSet};

pub use cache::{CacheEntry, CacheError, ChunkCache};

pub use fetch::{
    merge, resolve, resume_state, FetchError, FetchOptions, FetchResult, IncrementalUpdater,
    RangeFetcher, ResumeSource, ResumeState,
};

pub use config::{generate_default_config, Config, ConfigError, CredentialPrompt};
