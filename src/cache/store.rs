//! Cache directory layout and access

use crate::cache::encoding::{decode_table, encode_table};
use crate::cache::error::{CacheError, CacheResult};
use crate::table::ResultSet;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::path::{Path, PathBuf};

/// File extension shared by every cache file
pub const CACHE_EXTENSION: &str = "fxc.lz4";

/// A cache file, identified by its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub measurement: String,
    /// Local date of the last instant covered by the chunk
    pub end_date: NaiveDate,
    pub path: PathBuf,
}

/// Directory of cached chunks
#[derive(Debug, Clone)]
pub struct ChunkCache {
    dir: PathBuf,
}

impl ChunkCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a chunk, e.g. `temperature_2024-06-30.fxc.lz4`
    pub fn file_name(measurement: &str, end_date: NaiveDate) -> String {
        format!(
            "{}_{}.{}",
            measurement,
            end_date.format("%Y-%m-%d"),
            CACHE_EXTENSION
        )
    }

    /// Split a cache file name into measurement and end date
    ///
    /// The date is the last `_`-separated component, so measurements may
    /// contain underscores.
    pub fn parse_file_name(name: &str) -> CacheResult<Option<(String, NaiveDate)>> {
        let re = regex::Regex::new(r"^(.+)_(\d{4}-\d{2}-\d{2})\.fxc\.lz4$")
            .map_err(|e| CacheError::InvalidName(format!("file name pattern: {}", e)))?;

        let Some(caps) = re.captures(name) else {
            return Ok(None);
        };
        let date = match NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => return Ok(None),
        };
        Ok(Some((caps[1].to_string(), date)))
    }

    /// Write one chunk, replacing any file with the same key
    pub fn write(
        &self,
        measurement: &str,
        end_date: NaiveDate,
        set: &ResultSet,
    ) -> CacheResult<PathBuf> {
        if measurement.is_empty()
            || measurement.contains(['/', '\\'])
            || measurement.starts_with('.')
        {
            return Err(CacheError::InvalidName(measurement.to_string()));
        }

        std::fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(Self::file_name(measurement, end_date));
        let tmp = path.with_extension("lz4.tmp");
        std::fs::write(&tmp, encode_table(set)?)?;
        std::fs::rename(&tmp, &path)?;

        tracing::info!(
            measurement,
            end_date = %end_date,
            rows = set.len(),
            path = %path.display(),
            "Saved chunk"
        );
        Ok(path)
    }

    /// Every cache file in the directory, sorted by file name
    ///
    /// A missing directory is an empty cache. Files that do not follow the
    /// naming pattern are skipped.
    pub fn entries(&self) -> CacheResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();

        if !self.dir.exists() {
            return Ok(entries);
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            match Self::parse_file_name(&name)? {
                Some((measurement, end_date)) => entries.push(CacheEntry {
                    measurement,
                    end_date,
                    path,
                }),
                None if name.ends_with(CACHE_EXTENSION) => {
                    tracing::warn!("Ignoring unrecognised cache file {:?}", path);
                }
                None => {
                    tracing::debug!("Skipping {:?}", path);
                }
            }
        }

        entries.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(entries)
    }

    /// Entries for exactly one measurement
    pub fn entries_for(&self, measurement: &str) -> CacheResult<Vec<CacheEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.measurement == measurement)
            .collect())
    }

    /// Latest chunk end date recorded for a measurement
    pub fn latest_end_date(&self, measurement: &str) -> CacheResult<Option<NaiveDate>> {
        Ok(self
            .entries_for(measurement)?
            .into_iter()
            .map(|e| e.end_date)
            .max())
    }

    /// Decode one cache file, with datetimes in `zone`
    pub fn read(&self, entry: &CacheEntry, zone: Tz) -> CacheResult<ResultSet> {
        let data = std::fs::read(&entry.path)?;
        decode_table(&data, zone).map_err(|e| match e {
            CacheError::Corruption(msg) => {
                CacheError::Corruption(format!("{}: {}", entry.path.display(), msg))
            }
            other => other,
        })
    }

    /// Load and concatenate cached chunks in file-name order
    ///
    /// With a prefix, only measurements starting with it are read.
    pub fn read_all(&self, prefix: Option<&str>, zone: Tz) -> CacheResult<ResultSet> {
        let mut out = ResultSet::default();
        let mut files = 0usize;

        for entry in self.entries()? {
            if let Some(prefix) = prefix {
                if !entry.measurement.starts_with(prefix) {
                    continue;
                }
            }
            out.append(self.read(&entry, zone)?);
            files += 1;
        }

        tracing::debug!(files, rows = out.len(), "Loaded cached chunks");
        Ok(out)
    }
}
