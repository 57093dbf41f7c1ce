//! Flux query builder
//!
//! Renders a filter and a chunk into a Flux pipeline, one clause per line:
//!
//! ```text
//! from(bucket: "home")
//!   |> range(start: 2024-06-01T00:00:00Z, stop: 2024-06-30T23:59:59Z)
//!   |> filter(fn: (r) => r._field == "value" or r._field == "temperature")
//!   |> filter(fn: (r) => r._measurement == "sensor")
//!   |> filter(fn: (r) => r["room"] == "bedroom" or r["room"] == "kitchen")
//!   |> keep(columns: ["_time", "_measurement", "_field", "_value", "room"])
//! ```

use crate::chunk::ChunkSpec;
use crate::query::filter::FilterSpec;

/// Columns every query keeps, in projection order
pub const CORE_COLUMNS: &[&str] = &["_time", "_measurement", "_field", "_value"];

/// Escape a literal for use inside a Flux string
///
/// Backslash goes first so later replacements are not escaped twice.
pub fn escape_flux_string(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn quoted(raw: &str) -> String {
    format!("\"{}\"", escape_flux_string(raw))
}

/// Build the Flux query for one chunk
///
/// An absent or empty field list leaves fields unrestricted. A tag key that
/// matches a core column still gets its predicate but is projected once.
pub fn build_query(filter: &FilterSpec, chunk: &ChunkSpec, bucket: &str) -> String {
    let mut clauses = vec![
        format!("from(bucket: {})", quoted(bucket)),
        format!("range(start: {}, stop: {})", chunk.utc_start, chunk.utc_end),
    ];

    if let Some(fields) = filter.fields.as_ref().filter(|f| !f.is_empty()) {
        let terms: Vec<String> = fields
            .iter()
            .map(|field| format!("r._field == {}", quoted(field)))
            .collect();
        clauses.push(format!("filter(fn: (r) => {})", terms.join(" or ")));
    }

    clauses.push(format!(
        "filter(fn: (r) => r._measurement == {})",
        quoted(&filter.measurement)
    ));

    for tag in filter.tags.iter().filter(|t| !t.values.is_empty()) {
        let key = quoted(&tag.key);
        let terms: Vec<String> = tag
            .values
            .iter()
            .map(|value| format!("r[{}] == {}", key, quoted(value)))
            .collect();
        clauses.push(format!("filter(fn: (r) => {})", terms.join(" or ")));
    }

    let columns: Vec<String> = projection(filter).iter().map(|c| quoted(c)).collect();
    clauses.push(format!("keep(columns: [{}])", columns.join(", ")));

    clauses.join("\n  |> ")
}

/// Core columns followed by each distinct tag key
pub fn projection(filter: &FilterSpec) -> Vec<String> {
    let mut columns: Vec<String> = CORE_COLUMNS.iter().map(|c| c.to_string()).collect();
    for tag in &filter.tags {
        if !columns.contains(&tag.key) {
            columns.push(tag.key.clone());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{plan, ChunkUnit};
    use chrono_tz::Tz;

    fn june_chunk() -> ChunkSpec {
        plan(
            &"2024-06-01".into(),
            &"2024-06-30".into(),
            ChunkUnit::Month,
            Tz::UTC,
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn test_escape_order() {
        assert_eq!(escape_flux_string(r#"a\b"#), r#"a\\b"#);
        assert_eq!(escape_flux_string(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_flux_string("a\nb\rc\td"), r#"a\nb\rc\td"#);
        // A quote preceded by a backslash must not collapse into one escape
        assert_eq!(escape_flux_string(r#"\""#), r#"\\\""#);
    }

    #[test]
    fn test_minimal_query() {
        let query = build_query(&FilterSpec::new("temperature"), &june_chunk(), "home");

        assert_eq!(
            query,
            "from(bucket: \"home\")\n  \
             |> range(start: 2024-06-01T00:00:00Z, stop: 2024-06-30T23:59:59Z)\n  \
             |> filter(fn: (r) => r._measurement == \"temperature\")\n  \
             |> keep(columns: [\"_time\", \"_measurement\", \"_field\", \"_value\"])"
        );
        assert!(!query.contains("r._field"));
        assert!(!query.contains("r["));
    }

    #[test]
    fn test_field_disjunction() {
        let filter = FilterSpec::new("sensor").field("value").field("temperature");
        let query = build_query(&filter, &june_chunk(), "home");

        assert!(query.contains(
            "|> filter(fn: (r) => r._field == \"value\" or r._field == \"temperature\")"
        ));

        // Field clause comes before the measurement clause
        let field_at = query.find("r._field").unwrap();
        let measurement_at = query.find("r._measurement").unwrap();
        assert!(field_at < measurement_at);
    }

    #[test]
    fn test_empty_field_list_is_unrestricted() {
        let mut filter = FilterSpec::new("sensor");
        filter.fields = Some(Vec::new());
        let query = build_query(&filter, &june_chunk(), "home");
        assert!(!query.contains("r._field"));
    }

    #[test]
    fn test_tag_clauses() {
        let filter = FilterSpec::new("power")
            .tag("source", "house_1")
            .tag_values("room", ["bedroom", "kitchen"]);
        let query = build_query(&filter, &june_chunk(), "home");
        let lines: Vec<&str> = query.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(
            lines[3],
            "  |> filter(fn: (r) => r[\"source\"] == \"house_1\")"
        );
        assert_eq!(
            lines[4],
            "  |> filter(fn: (r) => r[\"room\"] == \"bedroom\" or r[\"room\"] == \"kitchen\")"
        );
        assert_eq!(
            lines[5],
            "  |> keep(columns: [\"_time\", \"_measurement\", \"_field\", \"_value\", \"source\", \"room\"])"
        );
    }

    #[test]
    fn test_projection_has_no_duplicates() {
        let filter = FilterSpec::new("power")
            .tag("_field", "value")
            .tag("room", "a")
            .tag("room", "b");

        assert_eq!(
            projection(&filter),
            vec!["_time", "_measurement", "_field", "_value", "room"]
        );

        let query = build_query(&filter, &june_chunk(), "home");
        assert!(query.contains("r[\"_field\"] == \"value\""));
        assert_eq!(query.matches("\"room\"").count(), 3);
    }

    #[test]
    fn test_literals_are_escaped() {
        let filter = FilterSpec::new("odd\"name")
            .field("tab\there")
            .tag("key\\", "line\nbreak");
        let query = build_query(&filter, &june_chunk(), "my\"bucket");

        assert!(query.starts_with("from(bucket: \"my\\\"bucket\")"));
        assert!(query.contains("r._measurement == \"odd\\\"name\""));
        assert!(query.contains("r._field == \"tab\\there\""));
        assert!(query.contains("r[\"key\\\\\"] == \"line\\nbreak\""));
        assert_eq!(query.lines().count(), 6);
    }

    #[test]
    fn test_build_is_deterministic() {
        let filter = FilterSpec::new("power")
            .field("value")
            .tag_values("room", ["a", "b"])
            .tag("source", "x");
        let chunk = june_chunk();
        assert_eq!(
            build_query(&filter, &chunk, "home"),
            build_query(&filter.clone(), &chunk, "home")
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        const LITERAL: &str = r#"[a-zA-Z0-9_ "\\\n\r\t]{0,12}"#;

        fn arb_tag_key() -> impl Strategy<Value = String> {
            prop_oneof![
                Just("_field".to_string()),
                Just("_time".to_string()),
                Just("room".to_string()),
                "[a-z_]{1,6}",
            ]
        }

        fn arb_filter() -> impl Strategy<Value = FilterSpec> {
            (
                LITERAL,
                prop::option::of(prop::collection::vec(LITERAL, 0..4)),
                prop::collection::vec(
                    (arb_tag_key(), prop::collection::vec(LITERAL, 0..3)),
                    0..5,
                ),
            )
                .prop_map(|(measurement, fields, tags)| {
                    let mut filter = FilterSpec::new(measurement);
                    filter.fields = fields;
                    for (key, values) in tags {
                        filter = filter.tag_values(key, values);
                    }
                    filter
                })
        }

        /// Every quote is escaped and no line break survives
        fn assert_safe_literal(escaped: &str) -> Result<(), TestCaseError> {
            prop_assert!(!escaped.contains('\n'));
            prop_assert!(!escaped.contains('\r'));
            let mut chars = escaped.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        let next = chars.next();
                        prop_assert!(
                            matches!(next, Some('\\' | '"' | 'n' | 'r' | 't')),
                            "bad escape {:?} in {:?}",
                            next,
                            escaped
                        );
                    }
                    '"' => prop_assert!(false, "bare quote in {:?}", escaped),
                    _ => {}
                }
            }
            Ok(())
        }

        proptest! {
            #[test]
            fn test_escaped_literals_are_safe(raw in any::<String>()) {
                assert_safe_literal(&escape_flux_string(&raw))?;
            }

            #[test]
            fn test_escaped_literals_are_safe_for_special_chars(raw in LITERAL) {
                assert_safe_literal(&escape_flux_string(&raw))?;
            }

            #[test]
            fn test_clause_order_is_fixed(filter in arb_filter(), bucket in LITERAL) {
                let query = build_query(&filter, &june_chunk(), &bucket);
                let clauses: Vec<&str> = query.split("\n  |> ").collect();

                let has_fields = filter.fields.as_ref().map_or(false, |f| !f.is_empty());
                let tag_clauses = filter.tags.iter().filter(|t| !t.values.is_empty()).count();
                let expected = 2 + usize::from(has_fields) + 1 + tag_clauses + 1;
                prop_assert_eq!(clauses.len(), expected);

                prop_assert!(clauses[0].starts_with("from(bucket: \""));
                prop_assert!(clauses[1].starts_with("range(start: "));
                let mut at = 2;
                if has_fields {
                    prop_assert!(clauses[at].starts_with("filter(fn: (r) => r._field == "));
                    at += 1;
                }
                prop_assert!(clauses[at].starts_with("filter(fn: (r) => r._measurement == "));
                for clause in &clauses[at + 1..clauses.len() - 1] {
                    prop_assert!(clause.starts_with("filter(fn: (r) => r[\""));
                }
                prop_assert!(clauses[clauses.len() - 1].starts_with("keep(columns: ["));
            }

            #[test]
            fn test_projection_has_no_duplicates(filter in arb_filter()) {
                let columns = projection(&filter);
                prop_assert_eq!(&columns[..CORE_COLUMNS.len()], CORE_COLUMNS);
                for (i, column) in columns.iter().enumerate() {
                    prop_assert!(!columns[i + 1..].contains(column), "{} repeated", column);
                }
                for key in filter.tag_keys() {
                    prop_assert!(columns.iter().any(|c| c == key));
                }
            }
        }
    }
}
