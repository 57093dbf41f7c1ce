//! Result tables
//!
//! A [`ResultSet`] is the rectangular table every fetch produces: a
//! `datetime` column, the measurement/field/value columns, then one column
//! per tag. The column list is fixed by the declared tag columns, so an empty
//! table still reports every column a caller expects.

use crate::time::Instant;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

/// Output columns that always exist, in order
pub const BASE_COLUMNS: &[&str] = &["datetime", "measurement", "field", "value"];

/// Renames from server column names to output column names
///
/// Entries whose source column is absent from a response are simply unused.
pub const COLUMN_SCHEMA: &[(&str, &str)] = &[
    ("_time", "datetime"),
    ("_measurement", "measurement"),
    ("_field", "field"),
    ("_value", "value"),
];

/// Server bookkeeping columns that never reach the output
pub const DROPPED_COLUMNS: &[&str] = &["", "result", "table", "_start", "_stop"];

/// Map a server column to its output name, or `None` if it is dropped
///
/// Columns not named in the schema pass through unchanged as tag columns.
pub fn output_column(source: &str) -> Option<&str> {
    if DROPPED_COLUMNS.contains(&source) {
        return None;
    }
    let renamed = COLUMN_SCHEMA
        .iter()
        .find(|(from, _)| *from == source)
        .map(|(_, to)| *to);
    Some(renamed.unwrap_or(source))
}

/// Prefix applied to a tag whose key equals a base column name
pub const TAG_PREFIX: &str = "tag_";

/// Output column for a tag key
///
/// A tag called `value`, `field`, `measurement` or `datetime` would shadow
/// the base column of the same name, so it is written as `tag_<key>`.
pub fn tag_column(key: &str) -> String {
    if BASE_COLUMNS.contains(&key) {
        format!("{}{}", TAG_PREFIX, key)
    } else {
        key.to_string()
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Unsigned(u64),
    Boolean(bool),
    String(String),
    Null,
}

impl FieldValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Unsigned(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Float(v) => serde_json::json!(v),
            FieldValue::Integer(v) => serde_json::json!(v),
            FieldValue::Unsigned(v) => serde_json::json!(v),
            FieldValue::Boolean(v) => serde_json::json!(v),
            FieldValue::String(v) => serde_json::json!(v),
            FieldValue::Null => serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Unsigned(v) => write!(f, "{}", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::String(v) => write!(f, "{}", v),
            FieldValue::Null => Ok(()),
        }
    }
}

/// One row of a result table
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub datetime: Instant,
    pub measurement: String,
    pub field: Option<String>,
    pub value: FieldValue,
    pub tags: BTreeMap<String, String>,
}

impl ResultRow {
    pub fn new(datetime: Instant, measurement: impl Into<String>, value: FieldValue) -> Self {
        Self {
            datetime,
            measurement: measurement.into(),
            field: None,
            value,
            tags: BTreeMap::new(),
        }
    }

    /// Builder: set the field name
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.field = Some(name.into());
        self
    }

    /// Builder: add a tag, renaming keys that collide with a base column
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key: String = key.into();
        self.tags.insert(tag_column(&key), value.into());
        self
    }

    /// Tag value stored under the given output column
    fn tag_cell(&self, column: &str) -> Option<&String> {
        self.tags.get(column).or_else(|| {
            column
                .strip_prefix(TAG_PREFIX)
                .filter(|base| BASE_COLUMNS.contains(base))
                .and_then(|base| self.tags.get(base))
        })
    }

    /// Cell text for an output column; empty when the row has no value there
    pub fn cell(&self, column: &str) -> String {
        match column {
            "datetime" => self.datetime.to_rfc3339(),
            "measurement" => self.measurement.clone(),
            "field" => self.field.clone().unwrap_or_default(),
            "value" => self.value.to_string(),
            tag => self.tag_cell(tag).cloned().unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert("datetime".into(), self.datetime.to_rfc3339().into());
        object.insert("measurement".into(), self.measurement.clone().into());
        object.insert(
            "field".into(),
            self.field
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        );
        object.insert("value".into(), self.value.to_json());
        for (key, value) in &self.tags {
            object.insert(tag_column(key), value.clone().into());
        }
        serde_json::Value::Object(object)
    }
}

/// A rectangular result table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    tag_columns: Vec<String>,
    rows: Vec<ResultRow>,
}

impl ResultSet {
    /// Create an empty table that declares the given tag columns
    pub fn new<I, S>(tag_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for column in tag_columns {
            set.declare_tag(column.into());
        }
        set
    }

    /// Create a table from rows, declaring every tag they carry
    pub fn from_rows(rows: Vec<ResultRow>) -> Self {
        let mut set = Self::default();
        for row in rows {
            set.push(row);
        }
        set
    }

    /// Concatenate tables, preserving row order
    pub fn concat<I: IntoIterator<Item = ResultSet>>(sets: I) -> Self {
        let mut out = Self::default();
        for set in sets {
            out.append(set);
        }
        out
    }

    /// Column names: the base columns followed by tag columns
    pub fn columns(&self) -> Vec<String> {
        BASE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.tag_columns.iter().cloned())
            .collect()
    }

    pub fn tag_columns(&self) -> &[String] {
        &self.tag_columns
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ResultRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add a tag column if it is not already present
    ///
    /// A name equal to a base column is declared as `tag_<name>`.
    pub fn declare_tag(&mut self, column: String) {
        let column = tag_column(&column);
        if !self.tag_columns.contains(&column) {
            self.tag_columns.push(column);
        }
    }

    /// Append a row, widening the tag columns to cover it
    pub fn push(&mut self, mut row: ResultRow) {
        if row.tags.keys().any(|k| BASE_COLUMNS.contains(&k.as_str())) {
            row.tags = std::mem::take(&mut row.tags)
                .into_iter()
                .map(|(k, v)| (tag_column(&k), v))
                .collect();
        }
        for key in row.tags.keys() {
            self.declare_tag(key.clone());
        }
        self.rows.push(row);
    }

    /// Append another table's columns and rows
    pub fn append(&mut self, other: ResultSet) {
        for column in other.tag_columns {
            self.declare_tag(column);
        }
        self.rows.extend(other.rows);
    }

    /// Re-express every datetime in `zone`
    pub fn with_timezone(mut self, zone: Tz) -> Self {
        for row in &mut self.rows {
            row.datetime = row.datetime.with_timezone(&zone);
        }
        self
    }

    /// Rows belonging to one measurement
    pub fn for_measurement<'a>(
        &'a self,
        measurement: &'a str,
    ) -> impl Iterator<Item = &'a ResultRow> + 'a {
        self.rows.iter().filter(move |r| r.measurement == measurement)
    }

    /// Latest datetime recorded for a measurement
    pub fn max_datetime(&self, measurement: &str) -> Option<Instant> {
        self.for_measurement(measurement)
            .map(|r| r.datetime.clone())
            .max()
    }

    /// Distinct measurements in first-seen order
    pub fn measurements(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.measurement) {
                seen.push(row.measurement.clone());
            }
        }
        seen
    }

    /// Write the table as CSV with a header row
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let columns = self.columns();
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&columns)?;
        for row in &self.rows {
            out.write_record(columns.iter().map(|c| row.cell(c)))?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "columns": self.columns(),
            "rows": self.rows.iter().map(ResultRow::to_json).collect::<Vec<_>>(),
        })
    }
}
