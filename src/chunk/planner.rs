//! Chunk planner
//!
//! Chunk starts step from the requested start in whole calendar units on
//! local wall-clock time. Each chunk ends one second before the next begins;
//! the last one ends exactly at the requested end.

use crate::chunk::error::{ChunkError, ChunkResult};
use crate::time::{localize, parse, utc_string, Instant, TimeInput};
use chrono::{Days, Duration, Months, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Calendar unit a range is split by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    Day,
    Week,
    #[default]
    Month,
}

impl ChunkUnit {
    /// Get all units for iteration
    pub fn all() -> &'static [ChunkUnit] {
        &[ChunkUnit::Day, ChunkUnit::Week, ChunkUnit::Month]
    }

    /// Wall-clock time `steps` units after `origin`
    ///
    /// Months are counted from the origin, not chained, so a range starting
    /// on the 31st returns to the 31st whenever the month has one.
    fn offset(&self, origin: NaiveDateTime, steps: u32) -> Option<NaiveDateTime> {
        match self {
            ChunkUnit::Day => origin.checked_add_days(Days::new(u64::from(steps))),
            ChunkUnit::Week => origin.checked_add_days(Days::new(7 * u64::from(steps))),
            ChunkUnit::Month => origin.checked_add_months(Months::new(steps)),
        }
    }
}

impl FromStr for ChunkUnit {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" | "d" => Ok(ChunkUnit::Day),
            "week" | "weeks" | "w" => Ok(ChunkUnit::Week),
            "month" | "months" | "m" => Ok(ChunkUnit::Month),
            _ => Err(ChunkError::InvalidChunkUnit(s.to_string())),
        }
    }
}

impl std::fmt::Display for ChunkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkUnit::Day => write!(f, "day"),
            ChunkUnit::Week => write!(f, "week"),
            ChunkUnit::Month => write!(f, "month"),
        }
    }
}

/// One bounded sub-range of a requested range
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpec {
    /// First instant covered, in the planning zone
    pub local_start: Instant,
    /// Last instant covered (inclusive), in the planning zone
    pub local_end: Instant,
    /// `local_start` as `YYYY-MM-DDTHH:MM:SSZ`
    pub utc_start: String,
    /// `local_end` as `YYYY-MM-DDTHH:MM:SSZ`
    pub utc_end: String,
}

impl ChunkSpec {
    /// Create a chunk from local bounds
    pub fn new(local_start: Instant, local_end: Instant) -> Self {
        Self {
            utc_start: utc_string(&local_start),
            utc_end: utc_string(&local_end),
            local_start,
            local_end,
        }
    }

    /// Calendar date of the chunk's end, used to key cache files
    pub fn end_date(&self) -> NaiveDate {
        self.local_end.date_naive()
    }
}

impl std::fmt::Display for ChunkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} → {}]", self.utc_start, self.utc_end)
    }
}

/// Plan chunks covering `[start, end]` in `zone`
///
/// `start` resolves to the beginning of its day and `end` to the end of its
/// day when they carry only a date. An empty plan is returned when the
/// parsed start lies after the parsed end.
pub fn plan(
    start: &TimeInput,
    end: &TimeInput,
    unit: ChunkUnit,
    zone: Tz,
) -> ChunkResult<Vec<ChunkSpec>> {
    let start = parse(start, zone, false)?;
    let end = parse(end, zone, true)?;

    if start > end {
        return Ok(Vec::new());
    }

    let origin = start.naive_local();
    let mut starts = vec![start];
    let mut steps = 1u32;

    while let Some(naive) = unit.offset(origin, steps) {
        let next = localize(naive, zone);
        if next > end {
            break;
        }
        starts.push(next);
        steps += 1;
    }

    let chunks = starts
        .iter()
        .enumerate()
        .map(|(i, chunk_start)| {
            let chunk_end = match starts.get(i + 1) {
                Some(next) => next.clone() - Duration::seconds(1),
                None => end.clone(),
            };
            ChunkSpec::new(chunk_start.clone(), chunk_end)
        })
        .collect();

    Ok(chunks)
}

/// Plan chunks with the unit given by name
pub fn plan_str(
    start: &TimeInput,
    end: &TimeInput,
    unit: &str,
    zone: Tz,
) -> ChunkResult<Vec<ChunkSpec>> {
    let unit: ChunkUnit = unit.parse()?;
    plan(start, end, unit, zone)
}
