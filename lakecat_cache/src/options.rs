use std::time::Duration;

use thiserror::Error;

use crate::TtlPolicy;

pub const CACHE_ENABLED: &str = "cache-enabled";
pub const EXPIRE_AFTER_ACCESS: &str = "cache.expire-after-access";
pub const EXPIRE_AFTER_WRITE: &str = "cache.expire-after-write";
pub const MANIFEST_MAX_MEMORY: &str = "cache.manifest.max-memory";
pub const MANIFEST_SMALL_FILE_MEMORY: &str = "cache.manifest.small-file-memory";
pub const MANIFEST_SMALL_FILE_THRESHOLD: &str = "cache.manifest.small-file-threshold";
pub const PARTITION_MAX_NUM: &str = "cache.partition.max-num";
pub const SNAPSHOT_MAX_NUM_PER_TABLE: &str = "cache.snapshot.max-num-per-table";

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CacheConfigError {
    #[error("When {key} is set, it must be greater than 0 but is {value:?}")]
    NonPositiveDuration { key: &'static str, value: Duration },

    #[error("{key} must be greater than 0")]
    Zero { key: &'static str },
}

/// Tuning of a [`CachingCatalog`](crate::CachingCatalog)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub enabled: bool,
    /// Entries not read for this long expire
    pub expire_after_access: Duration,
    /// Entries expire this long after they were stored, regardless of reads
    pub expire_after_write: Option<Duration>,
    /// Memory budget for manifest files below the small file threshold
    pub manifest_small_file_memory: u64,
    pub manifest_small_file_threshold: u64,
    /// Memory budget for manifest files of any size, replaces the small file settings
    pub manifest_max_memory: Option<u64>,
    /// Total number of partitions cached across tables, `0` disables the partition cache
    pub partition_max_num: u64,
    pub snapshot_max_num_per_table: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            expire_after_access: Duration::from_secs(10 * 60),
            expire_after_write: None,
            manifest_small_file_memory: 128 * MIB,
            manifest_small_file_threshold: MIB,
            manifest_max_memory: None,
            partition_max_num: 0,
            snapshot_max_num_per_table: 20,
        }
    }
}

impl CacheOptions {
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.expire_after_access.is_zero() {
            return Err(CacheConfigError::NonPositiveDuration {
                key: EXPIRE_AFTER_ACCESS,
                value: self.expire_after_access,
            });
        }
        if let Some(value) = self.expire_after_write.filter(Duration::is_zero) {
            return Err(CacheConfigError::NonPositiveDuration {
                key: EXPIRE_AFTER_WRITE,
                value,
            });
        }
        if self.snapshot_max_num_per_table == 0 {
            return Err(CacheConfigError::Zero {
                key: SNAPSHOT_MAX_NUM_PER_TABLE,
            });
        }
        Ok(())
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            expire_after_access: self.expire_after_access,
            expire_after_write: self.expire_after_write,
        }
    }

    /// Capacity and per-file threshold of the manifest cache
    pub fn manifest_budget(&self) -> (u64, u64) {
        match self.manifest_max_memory {
            Some(max_memory) => (max_memory, u64::MAX),
            None => (
                self.manifest_small_file_memory,
                self.manifest_small_file_threshold,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn access_ttl_must_be_positive() {
        let options = CacheOptions {
            expire_after_access: Duration::ZERO,
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("cache.expire-after-access"), "{err}");

        for secs in [1, 60, 3600] {
            let options = CacheOptions {
                expire_after_access: Duration::from_secs(secs),
                ..Default::default()
            };
            options.validate().unwrap();
        }
    }

    #[test]
    fn manifest_budget() {
        let options = CacheOptions::default();
        assert_eq!(options.manifest_budget(), (128 * MIB, MIB));

        let options = CacheOptions {
            manifest_max_memory: Some(10 * MIB),
            ..Default::default()
        };
        assert_eq!(options.manifest_budget(), (10 * MIB, u64::MAX));
    }
}
