#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use fluxfetch::executor::{decode_annotated_csv, ExecutorResult, QueryExecutor, QueryOutcome};
use fluxfetch::table::{FieldValue, ResultRow, ResultSet};

/// Executor that replays scripted answers and records every query
///
/// Once the script runs out every query answers `NoData`.
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<ExecutorResult<QueryOutcome>>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, answer: ExecutorResult<QueryOutcome>) -> Self {
        self.script.lock().expect("script lock").push_back(answer);
        self
    }

    pub fn then_rows(self, rows: Vec<ResultRow>) -> Self {
        self.then(Ok(QueryOutcome::Rows(ResultSet::from_rows(rows))))
    }

    pub fn then_no_data(self) -> Self {
        self.then(Ok(QueryOutcome::NoData))
    }

    /// Queue a raw annotated CSV response body
    pub fn then_csv(self, body: &str) -> Self {
        self.then(decode_annotated_csv(body))
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("queries lock").clone()
    }

    /// The `range(...)` clause of each recorded query
    pub fn ranges(&self) -> Vec<String> {
        self.queries()
            .iter()
            .filter_map(|q| q.lines().find(|l| l.contains("range(")))
            .map(|l| l.trim().trim_start_matches("|> ").to_string())
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&self, query: &str) -> ExecutorResult<QueryOutcome> {
        self.queries
            .lock()
            .expect("queries lock")
            .push(query.to_string());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Ok(QueryOutcome::NoData))
    }
}

pub fn utc(text: &str) -> DateTime<Tz> {
    DateTime::parse_from_rfc3339(text)
        .expect("rfc3339")
        .with_timezone(&Tz::UTC)
}

pub fn date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").expect("date")
}

pub fn reading(measurement: &str, at: &str, value: f64) -> ResultRow {
    ResultRow::new(utc(at), measurement, FieldValue::Float(value)).field("value")
}

pub fn table(rows: Vec<ResultRow>) -> ResultSet {
    ResultSet::from_rows(rows)
}
