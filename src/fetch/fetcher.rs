//! Chunked range fetching

use crate::cache::ChunkCache;
use crate::chunk::{plan, ChunkUnit};
use crate::executor::QueryExecutor;
use crate::fetch::error::{FetchError, FetchResult};
use crate::query::{build_query, FilterExtras};
use crate::table::{output_column, tag_column, ResultSet};
use crate::time::TimeInput;
use chrono_tz::Tz;
use std::path::PathBuf;

/// Settings for one fetch, passed explicitly on every call
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub bucket: String,
    /// Zone for chunk boundaries and returned datetimes
    pub zone: Tz,
    pub unit: ChunkUnit,
    /// Write each non-empty chunk to `output_dir`
    pub save: bool,
    pub output_dir: PathBuf,
}

impl FetchOptions {
    pub fn new(bucket: impl Into<String>, zone: Tz) -> Self {
        Self {
            bucket: bucket.into(),
            zone,
            unit: ChunkUnit::Month,
            save: false,
            output_dir: PathBuf::from("."),
        }
    }

    pub fn unit(mut self, unit: ChunkUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Persist chunks under `dir`
    pub fn save_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save = true;
        self.output_dir = dir.into();
        self
    }
}

/// Fetches a range chunk by chunk through a [`QueryExecutor`]
pub struct RangeFetcher<E> {
    executor: E,
}

impl<E: QueryExecutor> RangeFetcher<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Fetch `[start, end]` for every measurement
    ///
    /// Rows are concatenated measurement by measurement, each in chunk
    /// order. The first failing chunk aborts the whole call; chunks saved
    /// before it stay on disk.
    pub async fn fetch<S: AsRef<str>>(
        &self,
        measurements: &[S],
        start: &TimeInput,
        end: &TimeInput,
        extras: &FilterExtras,
        options: &FetchOptions,
    ) -> FetchResult<ResultSet> {
        let chunks = plan(start, end, options.unit, options.zone)?;
        let tag_columns = expected_tag_columns(extras);
        let cache = options
            .save
            .then(|| ChunkCache::new(options.output_dir.clone()));

        let mut out = ResultSet::new(tag_columns.iter().cloned());

        for measurement in measurements {
            let measurement = measurement.as_ref();
            let filter = extras.for_measurement(measurement);
            let mut rows = 0usize;

            for chunk in &chunks {
                let query = build_query(&filter, chunk, &options.bucket);
                let outcome = self.executor.execute(&query).await.map_err(|source| {
                    FetchError::Executor {
                        measurement: measurement.to_string(),
                        chunk: chunk.to_string(),
                        source,
                    }
                })?;

                let set = outcome
                    .into_result_set(&tag_columns)
                    .with_timezone(options.zone);
                tracing::debug!(
                    measurement,
                    start = %chunk.utc_start,
                    end = %chunk.utc_end,
                    rows = set.len(),
                    "Fetched chunk"
                );

                if let Some(cache) = &cache {
                    if !set.is_empty() {
                        cache.write(measurement, chunk.end_date(), &set)?;
                    }
                }

                rows += set.len();
                out.append(set);
            }

            tracing::info!(measurement, chunks = chunks.len(), rows, "Fetched measurement");
        }

        Ok(out)
    }
}

/// Output tag columns implied by the filter's tag keys
///
/// Keys naming a core column map onto that column instead of adding one.
pub(crate) fn expected_tag_columns(extras: &FilterExtras) -> Vec<String> {
    extras
        .tag_keys()
        .iter()
        .filter_map(|key| match output_column(key) {
            // "_field" and friends filter a base column rather than add one
            Some(out) if out != key => None,
            Some(out) => Some(tag_column(out)),
            None => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorError, ExecutorResult, QueryOutcome};
    use crate::table::{FieldValue, ResultRow};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Answers every query with one row stamped at the chunk's start
    #[derive(Default)]
    struct EchoExecutor {
        queries: Mutex<Vec<String>>,
        fail_on: Option<usize>,
        empty_on: Option<usize>,
    }

    #[async_trait]
    impl QueryExecutor for EchoExecutor {
        async fn execute(&self, query: &str) -> ExecutorResult<QueryOutcome> {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.to_string());
            let call = queries.len() - 1;

            if self.fail_on == Some(call) {
                return Err(ExecutorError::Transport("connection reset".to_string()));
            }
            if self.empty_on == Some(call) {
                return Ok(QueryOutcome::NoData);
            }

            let start = query
                .split("range(start: ")
                .nth(1)
                .and_then(|rest| rest.split(',').next())
                .unwrap();
            let datetime = DateTime::parse_from_rfc3339(start)
                .unwrap()
                .with_timezone(&Tz::UTC);
            let measurement = query
                .split("r._measurement == \"")
                .nth(1)
                .and_then(|rest| rest.split('"').next())
                .unwrap();

            Ok(QueryOutcome::Rows(ResultSet::from_rows(vec![ResultRow::new(
                datetime,
                measurement,
                FieldValue::Integer(call as i64),
            )
            .field("value")])))
        }
    }

    fn sydney_days() -> FetchOptions {
        FetchOptions::new("home", chrono_tz::Australia::Sydney).unit(ChunkUnit::Day)
    }

    #[tokio::test]
    async fn test_fetch_is_measurement_major() {
        let fetcher = RangeFetcher::new(EchoExecutor::default());
        let set = fetcher
            .fetch(
                &["power", "temperature"],
                &"2024-06-01".into(),
                &"2024-06-03".into(),
                &FilterExtras::new(),
                &sydney_days(),
            )
            .await
            .unwrap();

        assert_eq!(set.len(), 6);
        let order: Vec<(String, i64)> = set
            .rows()
            .iter()
            .map(|r| (r.measurement.clone(), r.datetime.timestamp()))
            .collect();
        for pair in order.windows(2) {
            if pair[0].0 == pair[1].0 {
                assert!(pair[0].1 < pair[1].1);
            }
        }
        assert_eq!(order[2].0, "power");
        assert_eq!(order[3].0, "temperature");

        // Datetimes come back in the fetch zone
        let first = &set.rows()[0].datetime;
        assert_eq!(first.timezone(), chrono_tz::Australia::Sydney);
        assert_eq!(
            *first,
            chrono_tz::Australia::Sydney
                .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_result_has_expected_columns() {
        let executor = EchoExecutor {
            empty_on: Some(0),
            ..Default::default()
        };
        let fetcher = RangeFetcher::new(executor);
        let extras = FilterExtras::new().tag("room", "kitchen").tag("_field", "value");
        let set = fetcher
            .fetch(
                &["power"],
                &"2024-06-01".into(),
                &"2024-06-01".into(),
                &extras,
                &sydney_days(),
            )
            .await
            .unwrap();

        assert!(set.is_empty());
        assert_eq!(set.columns(), vec!["datetime", "measurement", "field", "value", "room"]);
    }

    #[test]
    fn test_expected_tag_columns_rename_base_names() {
        let extras = FilterExtras::new()
            .tag("value", "north")
            .tag("_measurement", "power")
            .tag("room", "kitchen");
        assert_eq!(expected_tag_columns(&extras), vec!["tag_value", "room"]);
    }

    #[tokio::test]
    async fn test_save_writes_non_empty_chunks_only() {
        let dir = tempdir().unwrap();
        let executor = EchoExecutor {
            empty_on: Some(1),
            ..Default::default()
        };
        let fetcher = RangeFetcher::new(executor);
        fetcher
            .fetch(
                &["power"],
                &"2024-06-01".into(),
                &"2024-06-03".into(),
                &FilterExtras::new(),
                &sydney_days().save_to(dir.path().join("out")),
            )
            .await
            .unwrap();

        let cache = ChunkCache::new(dir.path().join("out"));
        let dates: Vec<String> = cache
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.end_date.to_string())
            .collect();
        assert_eq!(dates, vec!["2024-06-01", "2024-06-03"]);
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_chunks() {
        let dir = tempdir().unwrap();
        let executor = EchoExecutor {
            fail_on: Some(1),
            ..Default::default()
        };
        let fetcher = RangeFetcher::new(executor);
        let err = fetcher
            .fetch(
                &["power", "temperature"],
                &"2024-06-01".into(),
                &"2024-06-03".into(),
                &FilterExtras::new(),
                &sydney_days().save_to(dir.path()),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::Executor { ref measurement, .. } if measurement == "power"
        ));
        assert_eq!(fetcher.executor().queries.lock().unwrap().len(), 2);
        assert_eq!(ChunkCache::new(dir.path()).entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_after_end_issues_no_queries() {
        let fetcher = RangeFetcher::new(EchoExecutor::default());
        let set = fetcher
            .fetch(
                &["power"],
                &"2024-06-05".into(),
                &"2024-06-01".into(),
                &FilterExtras::new(),
                &sydney_days(),
            )
            .await
            .unwrap();
        assert!(set.is_empty());
        assert!(fetcher.executor().queries.lock().unwrap().is_empty());
    }
}
