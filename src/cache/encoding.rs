//! Table encoding for cache files
//!
//! Layout:
//!
//! ```text
//! ┌──────────┬─────────┬──────────┬───────────┬──────────┬──────────────────────┐
//! │ "FXCT"   │ version │ reserved │ row count │ CRC32    │ LZ4(bincode(table))  │
//! │ 4 bytes  │ u16 LE  │ 2 bytes  │ u32 LE    │ of body  │                      │
//! └──────────┴─────────┴──────────┴───────────┴──────────┴──────────────────────┘
//! ```
//!
//! Timestamps are stored as nanosecond deltas from the first row, and
//! measurement, field and tag strings go through one intern table. Rows keep
//! their original order.

use crate::cache::error::{CacheError, CacheResult};
use crate::table::{FieldValue, ResultRow, ResultSet};
use chrono::TimeZone;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Magic bytes for cache file identification
const CACHE_MAGIC: [u8; 4] = *b"FXCT";

/// Current cache format version
const CACHE_VERSION: u16 = 1;

/// Header size in bytes
const HEADER_SIZE: usize = 16;

/// Intermediate format for an encoded table
#[derive(Debug, Serialize, Deserialize)]
struct EncodedTable {
    /// Declared tag columns, in order
    tag_columns: Vec<u32>,
    /// First row's timestamp in nanoseconds
    base_nanos: i64,
    /// Differences from the previous row's timestamp
    nanos_deltas: Vec<i64>,
    /// Interned measurement per row
    measurements: Vec<u32>,
    /// Interned field per row
    fields: Vec<Option<u32>>,
    /// Values as decoded from the server
    values: Vec<FieldValue>,
    /// Interned (key, value) pairs per row
    row_tags: Vec<Vec<(u32, u32)>>,
    /// String intern table
    strings: Vec<String>,
}

/// String deduplication while encoding
#[derive(Default)]
struct Interner {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl Interner {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }
}

impl EncodedTable {
    fn string(&self, idx: u32) -> CacheResult<&str> {
        self.strings
            .get(idx as usize)
            .map(String::as_str)
            .ok_or_else(|| CacheError::Corruption(format!("string index {} out of range", idx)))
    }
}

/// Encode a table into cache file bytes
pub fn encode_table(set: &ResultSet) -> CacheResult<Vec<u8>> {
    let rows = set.rows();
    let mut strings = Interner::default();

    let mut base_nanos = 0i64;
    let mut prev_nanos = 0i64;
    let mut nanos_deltas = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let nanos = row.datetime.timestamp_nanos_opt().ok_or_else(|| {
            CacheError::Serialization(format!("datetime out of range: {}", row.datetime))
        })?;
        if i == 0 {
            base_nanos = nanos;
            prev_nanos = nanos;
        }
        let delta = nanos.checked_sub(prev_nanos).ok_or_else(|| {
            CacheError::Serialization(format!(
                "datetime {} too far from the previous row",
                row.datetime
            ))
        })?;
        nanos_deltas.push(delta);
        prev_nanos = nanos;
    }

    let encoded = EncodedTable {
        tag_columns: set.tag_columns().iter().map(|c| strings.intern(c)).collect(),
        base_nanos,
        nanos_deltas,
        measurements: rows.iter().map(|r| strings.intern(&r.measurement)).collect(),
        fields: rows
            .iter()
            .map(|r| r.field.as_deref().map(|f| strings.intern(f)))
            .collect(),
        values: rows.iter().map(|r| r.value.clone()).collect(),
        row_tags: rows
            .iter()
            .map(|r| {
                r.tags
                    .iter()
                    .map(|(k, v)| (strings.intern(k), strings.intern(v)))
                    .collect()
            })
            .collect(),
        strings: strings.strings,
    };

    let serialized = bincode::serialize(&encoded)?;
    let body = lz4_flex::compress_prepend_size(&serialized);

    let row_count = u32::try_from(rows.len()).map_err(|_| {
        CacheError::Serialization(format!("too many rows for one cache file: {}", rows.len()))
    })?;

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&CACHE_MAGIC);
    out.extend_from_slice(&CACHE_VERSION.to_le_bytes());
    out.extend_from_slice(&[0u8; 2]);
    out.extend_from_slice(&row_count.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    out.extend_from_slice(&body);

    Ok(out)
}

/// Decode cache file bytes into a table with datetimes in `zone`
pub fn decode_table(data: &[u8], zone: Tz) -> CacheResult<ResultSet> {
    if data.len() < HEADER_SIZE {
        return Err(CacheError::Corruption(format!(
            "file too short: {} bytes",
            data.len()
        )));
    }

    let (header, body) = data.split_at(HEADER_SIZE);
    if header[0..4] != CACHE_MAGIC {
        return Err(CacheError::Corruption(format!(
            "invalid magic: {:?}",
            &header[0..4]
        )));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version > CACHE_VERSION {
        return Err(CacheError::Corruption(format!(
            "unsupported version: {}",
            version
        )));
    }

    let row_count = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    let stored_checksum = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
    let computed_checksum = crc32fast::hash(body);
    if stored_checksum != computed_checksum {
        return Err(CacheError::Corruption(format!(
            "checksum mismatch: stored={}, computed={}",
            stored_checksum, computed_checksum
        )));
    }

    let decompressed = lz4_flex::decompress_size_prepended(body)
        .map_err(|e| CacheError::Compression(format!("LZ4 decompression failed: {}", e)))?;
    let encoded: EncodedTable = bincode::deserialize(&decompressed)?;

    let columns_ok = [
        encoded.measurements.len(),
        encoded.fields.len(),
        encoded.values.len(),
        encoded.row_tags.len(),
    ]
    .iter()
    .all(|len| *len == encoded.nanos_deltas.len());
    if !columns_ok || encoded.nanos_deltas.len() != row_count {
        return Err(CacheError::Corruption(format!(
            "column lengths disagree with row count {}",
            row_count
        )));
    }

    let mut tag_columns = Vec::with_capacity(encoded.tag_columns.len());
    for idx in &encoded.tag_columns {
        tag_columns.push(encoded.string(*idx)?.to_string());
    }
    let mut set = ResultSet::new(tag_columns);

    let mut nanos = encoded.base_nanos;
    for i in 0..row_count {
        nanos = nanos
            .checked_add(encoded.nanos_deltas[i])
            .ok_or_else(|| CacheError::Corruption(format!("datetime overflow at row {}", i)))?;

        let mut tags = BTreeMap::new();
        for (k, v) in &encoded.row_tags[i] {
            tags.insert(encoded.string(*k)?.to_string(), encoded.string(*v)?.to_string());
        }

        set.push(ResultRow {
            datetime: zone.timestamp_nanos(nanos),
            measurement: encoded.string(encoded.measurements[i])?.to_string(),
            field: match encoded.fields[i] {
                Some(idx) => Some(encoded.string(idx)?.to_string()),
                None => None,
            },
            value: encoded.values[i].clone(),
            tags,
        });
    }

    Ok(set)
}
