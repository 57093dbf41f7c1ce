//! Flux query construction
//!
//! - **filter**: measurement, field and tag constraints
//! - **builder**: renders a filter plus a chunk into Flux
//!
//! # Example
//!
//! ```rust
//! use fluxfetch::chunk::{plan, ChunkUnit};
//! use fluxfetch::query::{build_query, FilterSpec};
//!
//! let chunk = plan(&"2024-06-01".into(), &"2024-06-15".into(), ChunkUnit::Month, chrono_tz::UTC)
//!     .unwrap()
//!     .remove(0);
//! let filter = FilterSpec::new("temperature").tag_values("room", ["bedroom", "kitchen"]);
//! let flux = build_query(&filter, &chunk, "home");
//! assert!(flux.contains(r#"r["room"] == "bedroom" or r["room"] == "kitchen""#));
//! ```

mod builder;
mod filter;

pub use builder::{build_query, escape_flux_string, projection, CORE_COLUMNS};
pub use filter::{FilterExtras, FilterSpec, TagFilter};
