//! CLI config for the caching catalog
use lakecat_cache::{CacheConfigError, CacheOptions};

use crate::memory_size::MemorySize;

/// Catalog cache options
#[derive(Debug, Clone, Copy, clap::Parser)]
pub struct CacheConfig {
    /// Wrap the catalog in a cache. When disabled every read goes to the catalog backend.
    #[clap(
        long = "cache-enabled",
        env = "LAKECAT_CACHE_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set,
    )]
    pub enabled: bool,

    /// Cached entries that are not read for this long expire, e.g. "10m", "30s".
    #[clap(
        long = "cache-expire-after-access",
        env = "LAKECAT_CACHE_EXPIRE_AFTER_ACCESS",
        default_value = "10m",
        action
    )]
    pub expire_after_access: humantime::Duration,

    /// Cached entries expire this long after they were loaded, whether read or not.
    #[clap(
        long = "cache-expire-after-write",
        env = "LAKECAT_CACHE_EXPIRE_AFTER_WRITE",
        action
    )]
    pub expire_after_write: Option<humantime::Duration>,

    /// Memory budget for manifest files of any size.
    ///
    /// When set, the small file settings are ignored.
    #[clap(
        long = "cache-manifest-max-memory",
        env = "LAKECAT_CACHE_MANIFEST_MAX_MEMORY",
        action
    )]
    pub manifest_max_memory: Option<MemorySize>,

    /// Memory budget for manifest files no larger than the small file threshold.
    #[clap(
        long = "cache-manifest-small-file-memory",
        env = "LAKECAT_CACHE_MANIFEST_SMALL_FILE_MEMORY",
        default_value = "128MiB",
        action
    )]
    pub manifest_small_file_memory: MemorySize,

    /// Manifest files larger than this are never cached.
    #[clap(
        long = "cache-manifest-small-file-threshold",
        env = "LAKECAT_CACHE_MANIFEST_SMALL_FILE_THRESHOLD",
        default_value = "1MiB",
        action
    )]
    pub manifest_small_file_threshold: MemorySize,

    /// Number of partitions cached across all tables, 0 disables partition caching.
    #[clap(
        long = "cache-partition-max-num",
        env = "LAKECAT_CACHE_PARTITION_MAX_NUM",
        default_value = "0",
        action
    )]
    pub partition_max_num: u64,

    /// Number of snapshots cached per table.
    #[clap(
        long = "cache-snapshot-max-num-per-table",
        env = "LAKECAT_CACHE_SNAPSHOT_MAX_NUM_PER_TABLE",
        default_value = "20",
        action
    )]
    pub snapshot_max_num_per_table: u64,
}

impl CacheConfig {
    /// Validated [`CacheOptions`] for these arguments
    pub fn to_options(&self) -> Result<CacheOptions, CacheConfigError> {
        let options = CacheOptions {
            enabled: self.enabled,
            expire_after_access: self.expire_after_access.into(),
            expire_after_write: self.expire_after_write.map(Into::into),
            manifest_small_file_memory: self.manifest_small_file_memory.bytes(),
            manifest_small_file_threshold: self.manifest_small_file_threshold.bytes(),
            manifest_max_memory: self.manifest_max_memory.map(|size| size.bytes()),
            partition_max_num: self.partition_max_num,
            snapshot_max_num_per_table: self.snapshot_max_num_per_table,
        };
        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_the_cache() {
        let config = CacheConfig::try_parse_from(["lakecat"]).unwrap();
        assert_eq!(config.to_options().unwrap(), CacheOptions::default());
    }

    #[test]
    fn flags() {
        let config = CacheConfig::try_parse_from([
            "lakecat",
            "--cache-enabled",
            "false",
            "--cache-expire-after-access",
            "30s",
            "--cache-expire-after-write",
            "1h",
            "--cache-manifest-max-memory",
            "64mb",
            "--cache-partition-max-num",
            "100",
            "--cache-snapshot-max-num-per-table",
            "5",
        ])
        .unwrap();
        let options = config.to_options().unwrap();
        assert_eq!(
            options,
            CacheOptions {
                enabled: false,
                expire_after_access: Duration::from_secs(30),
                expire_after_write: Some(Duration::from_secs(3600)),
                manifest_max_memory: Some(64 * 1024 * 1024),
                partition_max_num: 100,
                snapshot_max_num_per_table: 5,
                ..Default::default()
            }
        );
        assert_eq!(options.manifest_budget(), (64 * 1024 * 1024, u64::MAX));
    }

    #[test]
    fn zero_access_ttl_is_rejected() {
        let config =
            CacheConfig::try_parse_from(["lakecat", "--cache-expire-after-access", "0s"]).unwrap();
        let err = config.to_options().unwrap_err();
        assert!(matches!(err, CacheConfigError::NonPositiveDuration { .. }), "{err}");
    }

    #[test]
    fn bad_memory_size() {
        let err = CacheConfig::try_parse_from([
            "lakecat",
            "--cache-manifest-small-file-memory",
            "lots",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("lots"), "{err}");
    }
}
