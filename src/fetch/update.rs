//! Incremental updates

use crate::executor::QueryExecutor;
use crate::fetch::error::FetchResult;
use crate::fetch::fetcher::{expected_tag_columns, FetchOptions, RangeFetcher};
use crate::fetch::resume::{resume_state, ResumeSource};
use crate::query::FilterExtras;
use crate::table::ResultSet;
use crate::time::{parse, Instant, TimeInput};
use chrono::Utc;

/// Brings local data for each measurement up to a given end
pub struct IncrementalUpdater<E> {
    fetcher: RangeFetcher<E>,
}

impl<E: QueryExecutor> IncrementalUpdater<E> {
    pub fn new(executor: E) -> Self {
        Self {
            fetcher: RangeFetcher::new(executor),
        }
    }

    pub fn fetcher(&self) -> &RangeFetcher<E> {
        &self.fetcher
    }

    /// Fetch everything newer than the prior data for each measurement
    ///
    /// `end` defaults to the current time in the fetch zone. Measurements
    /// without prior data start at `default_start`; those already past `end`
    /// are skipped without a query. Only the newly fetched rows are returned.
    pub async fn update<S: AsRef<str>>(
        &self,
        measurements: &[S],
        source: ResumeSource<'_>,
        end: Option<&TimeInput>,
        default_start: &TimeInput,
        extras: &FilterExtras,
        options: &FetchOptions,
    ) -> FetchResult<ResultSet> {
        let zone = options.zone;
        let end: Instant = match end {
            Some(end) => parse(end, zone, true)?,
            None => Utc::now().with_timezone(&zone),
        };
        let fallback = parse(default_start, zone, false)?;

        let mut out = ResultSet::new(expected_tag_columns(extras));

        for measurement in measurements {
            let measurement = measurement.as_ref();
            let state = resume_state(measurement, source, zone)?;
            let start = state.start_or(fallback.clone());

            if start > end {
                tracing::info!(
                    measurement,
                    start = %start,
                    end = %end,
                    "Already up to date, skipping"
                );
                continue;
            }

            tracing::info!(
                measurement,
                resumed = state.last_instant.is_some(),
                start = %start,
                end = %end,
                "Updating"
            );
            let fresh = self
                .fetcher
                .fetch(
                    &[measurement],
                    &TimeInput::Instant(start),
                    &TimeInput::Instant(end.clone()),
                    extras,
                    options,
                )
                .await?;
            out.append(fresh);
        }

        Ok(out)
    }
}

/// Append freshly fetched rows to a prior dataset
pub fn merge(prior: ResultSet, fresh: ResultSet) -> ResultSet {
    ResultSet::concat([prior, fresh])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorResult, QueryOutcome};
    use crate::table::{FieldValue, ResultRow};
    use async_trait::async_trait;
    use chrono::{Datelike, TimeZone};
    use chrono_tz::Tz;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn execute(&self, query: &str) -> ExecutorResult<QueryOutcome> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(QueryOutcome::NoData)
        }
    }

    fn row(measurement: &str, day: u32) -> ResultRow {
        let datetime = Tz::UTC.with_ymd_and_hms(2024, 6, day, 8, 0, 0).unwrap();
        ResultRow::new(datetime, measurement, FieldValue::Float(day as f64))
    }

    #[tokio::test]
    async fn test_dataset_update_resumes_per_measurement() {
        let prior = ResultSet::from_rows(vec![row("power", 10), row("temperature", 3)]);
        let updater = IncrementalUpdater::new(RecordingExecutor::default());
        let options = FetchOptions::new("home", Tz::UTC);

        updater
            .update(
                &["power", "temperature"],
                ResumeSource::Dataset(&prior),
                Some(&"2024-06-12".into()),
                &"2024-01-01".into(),
                &FilterExtras::new(),
                &options,
            )
            .await
            .unwrap();

        let queries = updater.fetcher().executor().queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].contains("range(start: 2024-06-10T08:00:01Z, stop: 2024-06-12T23:59:59Z)"));
        assert!(queries[1].contains("range(start: 2024-06-03T08:00:01Z, stop: 2024-06-12T23:59:59Z)"));
    }

    #[tokio::test]
    async fn test_missing_prior_data_uses_default_start() {
        let updater = IncrementalUpdater::new(RecordingExecutor::default());
        let options = FetchOptions::new("home", Tz::UTC);

        updater
            .update(
                &["humidity"],
                ResumeSource::Dataset(&ResultSet::default()),
                Some(&"2024-02-10".into()),
                &"2024-02-01".into(),
                &FilterExtras::new(),
                &options,
            )
            .await
            .unwrap();

        let queries = updater.fetcher().executor().queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("range(start: 2024-02-01T00:00:00Z, stop: 2024-02-10T23:59:59Z)"));
    }

    #[tokio::test]
    async fn test_up_to_date_measurement_is_skipped() {
        let prior = ResultSet::from_rows(vec![row("power", 20)]);
        let updater = IncrementalUpdater::new(RecordingExecutor::default());
        let options = FetchOptions::new("home", Tz::UTC);

        let set = updater
            .update(
                &["power"],
                ResumeSource::Dataset(&prior),
                Some(&"2024-06-15".into()),
                &"2024-01-01".into(),
                &FilterExtras::new().tag("room", "kitchen"),
                &options,
            )
            .await
            .unwrap();

        assert!(set.is_empty());
        assert_eq!(set.tag_columns(), &["room".to_string()]);
        assert!(updater.fetcher().executor().queries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_merge_appends_and_widens() {
        let prior = ResultSet::from_rows(vec![row("power", 1)]);
        let fresh = ResultSet::from_rows(vec![row("power", 2).tag("phase", "a")]);
        let merged = merge(prior, fresh);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.rows()[1].datetime.day(), 2);
        assert_eq!(merged.tag_columns(), &["phase".to_string()]);
    }
}
