//! # Config - SSTable write-path settings
//!
//! Every tunable the writer, index writer and segmented files consult lives
//! in [`Config`]. Values come from [`Config::default`] or from the
//! environment via [`Config::from_env`]:
//!
//! ```text
//! SSTABLE_INDEX_INTERVAL      keys between index summary samples (default: 128)
//! SSTABLE_BLOOM_FPR           target filter false-positive rate  (default: 0.001)
//! SSTABLE_DATA_BUFFER_KB      data file write buffer in KiB      (default: 1024)
//! SSTABLE_INDEX_BUFFER_KB     index file write buffer in KiB     (default: 1024)
//! SSTABLE_DISK_ACCESS_MODE    "standard" or "mmap"               (default: standard)
//! SSTABLE_INDEX_ACCESS_MODE   "standard" or "mmap"               (default: standard)
//! SSTABLE_MAX_SEGMENT_MB      largest mapped segment in MiB      (default: 2047)
//! ```

use std::str::FromStr;
use thiserror::Error;

/// Default number of keys between two index summary entries.
pub const DEFAULT_INDEX_INTERVAL: usize = 128;
/// Default bloom filter false-positive rate.
pub const DEFAULT_BLOOM_FPR: f64 = 0.001;
/// Default write buffer for the data file (1 MiB).
pub const DEFAULT_DATA_BUFFER_BYTES: usize = 1024 * 1024;
/// Default write buffer for the index file (1 MiB).
pub const DEFAULT_INDEX_BUFFER_BYTES: usize = 1024 * 1024;
/// Largest segment that is memory-mapped as a unit (`i32::MAX` bytes).
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = i32::MAX as u64;

/// How a finished component file is opened for reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiskAccessMode {
    /// Buffered reads through a regular file handle.
    #[default]
    Standard,
    /// Boundary-aligned memory-mapped segments.
    Mmap,
}

impl FromStr for DiskAccessMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(DiskAccessMode::Standard),
            "mmap" => Ok(DiskAccessMode::Mmap),
            other => Err(ConfigError::Invalid {
                key: "disk access mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Errors produced while loading or validating a [`Config`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A value could not be parsed or is outside its allowed range.
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Write-path settings shared by all writers of a process.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Every `index_interval`-th key is sampled into the index summary.
    pub index_interval: usize,
    /// Target false-positive rate of the membership filter.
    pub bloom_fpr: f64,
    /// Buffer size of the data file writer.
    pub data_buffer_bytes: usize,
    /// Buffer size of the index file writer.
    pub index_buffer_bytes: usize,
    /// Access mode for finished `Data.db` files.
    pub disk_access_mode: DiskAccessMode,
    /// Access mode for finished `Index.db` files.
    pub index_access_mode: DiskAccessMode,
    /// Upper bound of a single mapped segment.
    pub max_segment_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_interval: DEFAULT_INDEX_INTERVAL,
            bloom_fpr: DEFAULT_BLOOM_FPR,
            data_buffer_bytes: DEFAULT_DATA_BUFFER_BYTES,
            index_buffer_bytes: DEFAULT_INDEX_BUFFER_BYTES,
            disk_access_mode: DiskAccessMode::Standard,
            index_access_mode: DiskAccessMode::Standard,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }
}

impl Config {
    /// Builds a config from `SSTABLE_*` environment variables, falling back
    /// to the defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparsable,
    /// or if the resulting config fails [`validate`](Config::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Config::from_env) but reads variables through
    /// `lookup`, so callers and tests can supply their own source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let config = Config {
            index_interval: parse_or(&lookup, "SSTABLE_INDEX_INTERVAL", defaults.index_interval)?,
            bloom_fpr: parse_or(&lookup, "SSTABLE_BLOOM_FPR", defaults.bloom_fpr)?,
            data_buffer_bytes: parse_or(&lookup, "SSTABLE_DATA_BUFFER_KB", defaults.data_buffer_bytes / 1024)?
                * 1024,
            index_buffer_bytes: parse_or(&lookup, "SSTABLE_INDEX_BUFFER_KB", defaults.index_buffer_bytes / 1024)?
                * 1024,
            disk_access_mode: parse_or(&lookup, "SSTABLE_DISK_ACCESS_MODE", defaults.disk_access_mode)?,
            index_access_mode: parse_or(&lookup, "SSTABLE_INDEX_ACCESS_MODE", defaults.index_access_mode)?,
            max_segment_size: parse_or(
                &lookup,
                "SSTABLE_MAX_SEGMENT_MB",
                defaults.max_segment_size / (1024 * 1024),
            )? * 1024
                * 1024,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable by the writer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_interval == 0 {
            return Err(invalid("index_interval", self.index_interval));
        }
        if !(self.bloom_fpr > 0.0 && self.bloom_fpr < 1.0) {
            return Err(invalid("bloom_fpr", self.bloom_fpr));
        }
        if self.data_buffer_bytes == 0 {
            return Err(invalid("data_buffer_bytes", self.data_buffer_bytes));
        }
        if self.index_buffer_bytes == 0 {
            return Err(invalid("index_buffer_bytes", self.index_buffer_bytes));
        }
        if self.max_segment_size == 0 {
            return Err(invalid("max_segment_size", self.max_segment_size));
        }
        Ok(())
    }
}

fn invalid<T: std::fmt::Display>(key: &'static str, value: T) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
