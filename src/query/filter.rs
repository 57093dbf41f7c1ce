//! Filter specifications
//!
//! A [`FilterSpec`] narrows one query to a measurement, an optional field
//! list and any number of tag predicates. Values listed under one tag key are
//! alternatives; separate tag keys must all match.

use serde::{Deserialize, Serialize};

/// Accepted values for one tag key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    /// Tag key, passed through case-sensitively
    pub key: String,
    /// Values OR'd together
    pub values: Vec<String>,
}

impl TagFilter {
    pub fn new(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            values,
        }
    }
}

/// Full filter for a single query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Measurement to select
    pub measurement: String,
    /// Fields to keep; `None` keeps every field
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Tag predicates in insertion order
    #[serde(default)]
    pub tags: Vec<TagFilter>,
}

impl FilterSpec {
    /// Filter on a measurement with no field or tag restriction
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            fields: None,
            tags: Vec::new(),
        }
    }

    /// Builder: restrict to one more field
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    /// Builder: add an accepted value for a tag key
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        push_tag(&mut self.tags, key.into(), vec![value.into()]);
        self
    }

    /// Builder: add several accepted values for a tag key
    pub fn tag_values<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_tag(
            &mut self.tags,
            key.into(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Tag keys in insertion order
    pub fn tag_keys(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.key.as_str()).collect()
    }
}

/// The measurement-independent part of a filter
///
/// The fetcher applies the same extras to every measurement it visits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExtras {
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Vec<TagFilter>,
}

impl FilterExtras {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        push_tag(&mut self.tags, key.into(), vec![value.into()]);
        self
    }

    pub fn tag_values<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_tag(
            &mut self.tags,
            key.into(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Parse a `key=value` pair, as given on the command line
    pub fn tag_pair(self, pair: &str) -> Option<Self> {
        let (key, value) = pair.split_once('=')?;
        Some(self.tag(key.trim(), value.trim()))
    }

    /// Tag keys in insertion order
    pub fn tag_keys(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.key.clone()).collect()
    }

    /// Complete filter for one measurement
    pub fn for_measurement(&self, measurement: &str) -> FilterSpec {
        FilterSpec {
            measurement: measurement.to_string(),
            fields: self.fields.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Append values under `key`, merging with an existing entry
fn push_tag(tags: &mut Vec<TagFilter>, key: String, values: Vec<String>) {
    match tags.iter_mut().find(|t| t.key == key) {
        Some(existing) => {
            for value in values {
                if !existing.values.contains(&value) {
                    existing.values.push(value);
                }
            }
        }
        None => tags.push(TagFilter::new(key, values)),
    }
}
