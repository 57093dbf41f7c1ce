//! Query execution
//!
//! The core only depends on [`QueryExecutor`]: a Flux string goes in, a
//! table or an explicit "no data" comes back. [`InfluxClient`] is the HTTP
//! implementation used by the binary; tests substitute scripted executors.
//!
//! - **client**: InfluxDB 2.x `/api/v2/query` client
//! - **annotated**: annotated CSV response decoding
//! - **error**: transport and schema errors

mod annotated;
mod client;
mod error;

pub use annotated::decode_annotated_csv;
pub use client::{InfluxClient, InfluxSettings};
pub use error::{ExecutorError, ExecutorResult};

use crate::table::ResultSet;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of a successful query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The query matched at least one row
    Rows(ResultSet),
    /// The query ran but matched nothing
    NoData,
}

impl QueryOutcome {
    /// Collapse into a table that declares at least `tag_columns`
    pub fn into_result_set(self, tag_columns: &[String]) -> ResultSet {
        let mut set = ResultSet::new(tag_columns.iter().cloned());
        if let QueryOutcome::Rows(rows) = self {
            set.append(rows);
        }
        set
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryOutcome::Rows(rows) => rows.len(),
            QueryOutcome::NoData => 0,
        }
    }
}

/// Runs query strings against a time-series service
///
/// Rows come back with UTC datetimes; callers convert to their zone.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> ExecutorResult<QueryOutcome>;
}

#[async_trait]
impl<T: QueryExecutor + ?Sized> QueryExecutor for Arc<T> {
    async fn execute(&self, query: &str) -> ExecutorResult<QueryOutcome> {
        (**self).execute(query).await
    }
}
