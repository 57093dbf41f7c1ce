//! Resume point resolution

use crate::cache::ChunkCache;
use crate::fetch::error::FetchResult;
use crate::table::ResultSet;
use crate::time::{start_of_day, Instant};
use chrono::Duration;
use chrono_tz::Tz;
use std::path::Path;

/// Where prior data for a measurement is looked up
#[derive(Debug, Clone, Copy)]
pub enum ResumeSource<'a> {
    /// A chunk cache directory; only file names are inspected
    Cache(&'a Path),
    /// Rows already held in memory
    Dataset(&'a ResultSet),
}

/// Resume point of one measurement, derived fresh on every update
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeState {
    pub measurement: String,
    /// First instant not yet covered by prior data; `None` without prior data
    pub last_instant: Option<Instant>,
}

impl ResumeState {
    /// The resume point, or `fallback` when there is no prior data
    pub fn start_or(&self, fallback: Instant) -> Instant {
        self.last_instant.clone().unwrap_or(fallback)
    }
}

/// Instant from which the next fetch of `measurement` should start
///
/// A cached chunk is assumed to cover its whole end date, so the cache
/// resumes at the start of the following day. A dataset resumes one second
/// after its newest row.
pub fn resolve(measurement: &str, source: ResumeSource<'_>, zone: Tz) -> FetchResult<Option<Instant>> {
    match source {
        ResumeSource::Cache(dir) => {
            let latest = ChunkCache::new(dir).latest_end_date(measurement)?;
            Ok(latest
                .and_then(|date| date.succ_opt())
                .map(|next| start_of_day(next, zone)))
        }
        ResumeSource::Dataset(set) => Ok(set
            .max_datetime(measurement)
            .map(|last| (last + Duration::seconds(1)).with_timezone(&zone))),
    }
}

pub fn resume_state(
    measurement: &str,
    source: ResumeSource<'_>,
    zone: Tz,
) -> FetchResult<ResumeState> {
    Ok(ResumeState {
        measurement: measurement.to_string(),
        last_instant: resolve(measurement, source, zone)?,
    })
}
