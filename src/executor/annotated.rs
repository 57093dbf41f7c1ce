//! Annotated CSV decoding
//!
//! InfluxDB answers Flux queries with one or more CSV tables:
//!
//! ```text
//! #datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string,string
//! ,result,table,_start,_stop,_time,_value,_field,_measurement,room
//! ,_result,0,2024-06-01T00:00:00Z,2024-06-30T23:59:59Z,2024-06-01T10:00:00Z,21.5,value,temperature,kitchen
//!
//! ,result,table,_start,...
//! ```
//!
//! Header columns go through the declared column schema in
//! [`crate::table`]; anything that is neither renamed nor dropped becomes a
//! tag column. A server-side failure arrives as a table with an `error`
//! column instead of `_time`.

use crate::executor::error::{ExecutorError, ExecutorResult};
use crate::executor::QueryOutcome;
use crate::table::{output_column, tag_column, FieldValue, ResultRow, ResultSet};
use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// Where a CSV column lands in a [`ResultRow`]
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Datetime,
    Measurement,
    Field,
    Value,
    Tag(String),
    Skip,
}

#[derive(Debug, Clone)]
struct Column {
    slot: Slot,
    datatype: Option<String>,
}

/// The header currently in effect
#[derive(Debug)]
enum Header {
    Table(Vec<Column>),
    Error { message_at: usize },
}

impl Header {
    fn parse(record: &csv::StringRecord, datatypes: Option<&csv::StringRecord>) -> ExecutorResult<Self> {
        let names: Vec<&str> = record.iter().collect();

        if !names.contains(&"_time") {
            if let Some(message_at) = names.iter().position(|n| *n == "error") {
                return Ok(Header::Error { message_at });
            }
            return Err(ExecutorError::Schema("_time".to_string()));
        }

        let columns = names
            .iter()
            .enumerate()
            .map(|(idx, name)| Column {
                slot: slot_for(name),
                datatype: datatypes
                    .and_then(|d| d.get(idx))
                    .map(|d| d.to_string()),
            })
            .collect();

        Ok(Header::Table(columns))
    }
}

fn slot_for(name: &str) -> Slot {
    match output_column(name) {
        None => Slot::Skip,
        // Only schema renames fill the base columns; a tag that happens to
        // be called "value" becomes the "tag_value" column
        Some(out) if out != name => match out {
            "datetime" => Slot::Datetime,
            "measurement" => Slot::Measurement,
            "field" => Slot::Field,
            "value" => Slot::Value,
            other => Slot::Tag(tag_column(other)),
        },
        Some(out) => Slot::Tag(tag_column(out)),
    }
}

/// Header rows carry the literal `result` and `table` names after the
/// annotation column, or `error` for an error table
fn is_header(record: &csv::StringRecord) -> bool {
    let second = record.get(1);
    (second == Some("result") && record.get(2) == Some("table")) || second == Some("error")
}

/// Decode a full response body
///
/// Datetimes are returned in UTC. A body with no data rows is
/// [`QueryOutcome::NoData`].
pub fn decode_annotated_csv(body: &str) -> ExecutorResult<QueryOutcome> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut datatypes: Option<csv::StringRecord> = None;
    let mut header: Option<Header> = None;
    let mut set = ResultSet::default();

    for result in reader.records() {
        let record = result.map_err(|e| ExecutorError::Decode(e.to_string()))?;

        if record.iter().all(str::is_empty) {
            header = None;
            datatypes = None;
            continue;
        }

        let first = record.get(0).unwrap_or_default();
        if first.starts_with('#') {
            if first == "#datatype" {
                datatypes = Some(record);
            }
            header = None;
            continue;
        }

        if header.is_none() || is_header(&record) {
            header = Some(Header::parse(&record, datatypes.as_ref())?);
            if let Some(Header::Table(columns)) = &header {
                for column in columns {
                    if let Slot::Tag(name) = &column.slot {
                        set.declare_tag(name.clone());
                    }
                }
            }
            continue;
        }

        match &header {
            Some(Header::Table(columns)) => set.push(decode_row(columns, &record)?),
            Some(Header::Error { message_at }) => {
                let message = record.get(*message_at).unwrap_or("unknown error");
                return Err(ExecutorError::Query(message.to_string()));
            }
            None => {}
        }
    }

    if let Some(Header::Error { .. }) = header {
        return Err(ExecutorError::Query("unknown error".to_string()));
    }

    if set.is_empty() {
        Ok(QueryOutcome::NoData)
    } else {
        Ok(QueryOutcome::Rows(set))
    }
}

fn decode_row(columns: &[Column], record: &csv::StringRecord) -> ExecutorResult<ResultRow> {
    let mut datetime = None;
    let mut measurement = String::new();
    let mut field = None;
    let mut value = FieldValue::Null;
    let mut tags = BTreeMap::new();

    for (column, text) in columns.iter().zip(record.iter()) {
        match &column.slot {
            Slot::Datetime => {
                let parsed = DateTime::parse_from_rfc3339(text).map_err(|_| {
                    ExecutorError::Decode(format!("invalid _time value '{}'", text))
                })?;
                datetime = Some(parsed.with_timezone(&Tz::UTC));
            }
            Slot::Measurement => measurement = text.to_string(),
            Slot::Field if !text.is_empty() => field = Some(text.to_string()),
            Slot::Value => value = decode_value(text, column.datatype.as_deref()),
            Slot::Tag(name) if !text.is_empty() => {
                tags.insert(name.clone(), text.to_string());
            }
            _ => {}
        }
    }

    let datetime = datetime.ok_or_else(|| ExecutorError::Schema("_time".to_string()))?;
    Ok(ResultRow {
        datetime,
        measurement,
        field,
        value,
        tags,
    })
}

fn decode_value(text: &str, datatype: Option<&str>) -> FieldValue {
    if text.is_empty() {
        return FieldValue::Null;
    }

    let string = || FieldValue::String(text.to_string());
    match datatype {
        Some("double") => text.parse().map(FieldValue::Float).unwrap_or_else(|_| string()),
        Some("long") => text.parse().map(FieldValue::Integer).unwrap_or_else(|_| string()),
        Some("unsignedLong") => text
            .parse()
            .map(FieldValue::Unsigned)
            .unwrap_or_else(|_| string()),
        Some("boolean") => match text {
            "true" => FieldValue::Boolean(true),
            "false" => FieldValue::Boolean(false),
            _ => string(),
        },
        Some(_) => string(),
        None => {
            if let Ok(v) = text.parse::<f64>() {
                FieldValue::Float(v)
            } else if let Ok(v) = text.parse::<bool>() {
                FieldValue::Boolean(v)
            } else {
                string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ANNOTATED: &str = "\
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string,string
,result,table,_start,_stop,_time,_value,_field,_measurement,room
,_result,0,2024-06-01T00:00:00Z,2024-06-30T23:59:59Z,2024-06-01T10:00:00Z,21.5,value,temperature,kitchen
,_result,0,2024-06-01T00:00:00Z,2024-06-30T23:59:59Z,2024-06-01T11:00:00Z,22,value,temperature,kitchen

#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,long,string,string,string
,result,table,_start,_stop,_time,_value,_field,_measurement,source
,_result,1,2024-06-01T00:00:00Z,2024-06-30T23:59:59Z,2024-06-01T10:00:00Z,7,count,temperature,house_1
";

    fn rows(outcome: QueryOutcome) -> ResultSet {
        match outcome {
            QueryOutcome::Rows(set) => set,
            QueryOutcome::NoData => panic!("expected rows"),
        }
    }

    #[test]
    fn test_decode_annotated_tables() {
        let set = rows(decode_annotated_csv(ANNOTATED).unwrap());

        assert_eq!(set.len(), 3);
        assert_eq!(
            set.columns(),
            vec!["datetime", "measurement", "field", "value", "room", "source"]
        );

        let first = &set.rows()[0];
        assert_eq!(
            first.datetime,
            Tz::UTC.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(first.measurement, "temperature");
        assert_eq!(first.field.as_deref(), Some("value"));
        assert_eq!(first.value, FieldValue::Float(21.5));
        assert_eq!(first.tags.get("room").map(String::as_str), Some("kitchen"));

        // "22" is typed by the annotation, not inferred
        assert_eq!(set.rows()[1].value, FieldValue::Float(22.0));
        assert_eq!(set.rows()[2].value, FieldValue::Integer(7));
        assert!(set.rows()[2].tags.get("room").is_none());
    }

    #[test]
    fn test_decode_without_annotations() {
        let body = "\
,result,table,_time,_value,_field,_measurement
,_result,0,2024-06-01T10:00:00Z,on,state,switch
,_result,0,2024-06-01T10:05:00Z,1.5,level,switch
";
        let set = rows(decode_annotated_csv(body).unwrap());
        assert_eq!(set.rows()[0].value, FieldValue::String("on".to_string()));
        assert_eq!(set.rows()[1].value, FieldValue::Float(1.5));
        assert!(set.tag_columns().is_empty());
    }

    #[test]
    fn test_header_change_without_blank_line() {
        let body = "\
,result,table,_time,_value,_measurement
,_result,0,2024-06-01T10:00:00Z,1,power
,result,table,_time,_value,_measurement,phase
,_result,1,2024-06-01T10:00:00Z,2,power,a
";
        let set = rows(decode_annotated_csv(body).unwrap());
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[1].tags.get("phase").map(String::as_str), Some("a"));
    }

    #[test]
    fn test_tag_named_like_base_column() {
        let body = "\
,result,table,_time,_value,_field,_measurement,value
,_result,0,2024-06-01T10:00:00Z,21.5,temp,sensor,north
";
        let set = rows(decode_annotated_csv(body).unwrap());
        assert_eq!(
            set.columns(),
            vec!["datetime", "measurement", "field", "value", "tag_value"]
        );
        assert_eq!(set.rows()[0].value, FieldValue::Float(21.5));

        let json = set.to_json();
        assert_eq!(json["rows"][0]["value"], serde_json::json!(21.5));
        assert_eq!(json["rows"][0]["tag_value"], serde_json::json!("north"));

        let mut buf = Vec::new();
        set.write_csv(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "datetime,measurement,field,value,tag_value\n\
             2024-06-01T10:00:00+00:00,sensor,temp,21.5,north\n"
        );
    }

    #[test]
    fn test_empty_body_is_no_data() {
        assert_eq!(decode_annotated_csv("").unwrap(), QueryOutcome::NoData);
        assert_eq!(decode_annotated_csv("\r\n\r\n").unwrap(), QueryOutcome::NoData);
    }

    #[test]
    fn test_header_only_is_no_data() {
        let body = ",result,table,_time,_value,_field,_measurement\n";
        assert_eq!(decode_annotated_csv(body).unwrap(), QueryOutcome::NoData);
    }

    #[test]
    fn test_missing_time_column() {
        let body = "\
,result,table,_value,_measurement
,_result,0,1,power
";
        assert_eq!(
            decode_annotated_csv(body).unwrap_err(),
            ExecutorError::Schema("_time".to_string())
        );
    }

    #[test]
    fn test_in_band_error_table() {
        let body = "\
#datatype,string,string
,error,reference
,\"type error: expected int, got string\",897
";
        assert_eq!(
            decode_annotated_csv(body).unwrap_err(),
            ExecutorError::Query("type error: expected int, got string".to_string())
        );
    }

    #[test]
    fn test_invalid_time_value_is_named() {
        let body = "\
,result,table,_time,_value,_measurement
,_result,0,yesterday,1,power
";
        let err = decode_annotated_csv(body).unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn test_decode_value_types() {
        assert_eq!(decode_value("", Some("double")), FieldValue::Null);
        assert_eq!(decode_value("true", Some("boolean")), FieldValue::Boolean(true));
        assert_eq!(
            decode_value("18446744073709551615", Some("unsignedLong")),
            FieldValue::Unsigned(u64::MAX)
        );
        assert_eq!(decode_value("12", Some("string")), FieldValue::String("12".into()));
        assert_eq!(decode_value("false", None), FieldValue::Boolean(false));
    }
}
