//! Startup configuration for a cache instance.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::codec::CompressorId;
use crate::error::{AccrsError, Result};

/// Configuration for one `TierPair` (raw + comp tier sharing a memory budget).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Shared memory budget, in bytes, divided between the raw and comp tiers.
    pub total_memory: u64,
    /// Percent of `total_memory` given to the raw tier at startup, `[1, 99]`.
    pub raw_ratio: u8,
    /// Size of the shared mutex+condvar lock pool.
    pub max_locks: u16,
    /// Default sweep goal, as a percent of `current_size`, `[1, 99]`.
    pub sweep_goal_pct: u8,
    /// Which codec the tier pair uses to offload raw buffers into the comp tier.
    pub compressor: CompressorId,
    /// Root directory used by `FsPageSource`. `None` when buffers are seeded
    /// directly from byte slices (as in tests).
    pub page_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            total_memory: 64 * 1024 * 1024,
            raw_ratio: 80,
            max_locks: 1024,
            sweep_goal_pct: 10,
            compressor: CompressorId::Lz4,
            page_dir: None,
        }
    }
}

impl CacheConfig {
    /// Validates the configuration, rejecting anything that would later
    /// surface as a `BadArgs` error once the tier pair is built.
    pub fn validate(&self) -> Result<()> {
        if !(1..=99).contains(&self.raw_ratio) {
            return Err(AccrsError::BadArgs(format!(
                "raw_ratio must be in [1, 99], got {}",
                self.raw_ratio
            )));
        }
        if !(1..=99).contains(&self.sweep_goal_pct) {
            return Err(AccrsError::BadArgs(format!(
                "sweep_goal_pct must be in [1, 99], got {}",
                self.sweep_goal_pct
            )));
        }
        if self.max_locks == 0 {
            return Err(AccrsError::BadArgs("max_locks must be nonzero".into()));
        }
        if self.total_memory == 0 {
            return Err(AccrsError::BadArgs("total_memory must be nonzero".into()));
        }
        Ok(())
    }

    /// Reads `ACCRS_*` environment variables, falling back to `Default::default()`
    /// for any that are unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let total_memory = std::env::var("ACCRS_TOTAL_MEMORY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.total_memory);
        let raw_ratio = std::env::var("ACCRS_RAW_RATIO")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.raw_ratio);
        let max_locks = std::env::var("ACCRS_MAX_LOCKS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_locks);
        let sweep_goal_pct = std::env::var("ACCRS_SWEEP_GOAL_PCT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.sweep_goal_pct);
        let page_dir = std::env::var("ACCRS_PAGE_DIR").ok().map(PathBuf::from);

        Self {
            total_memory,
            raw_ratio,
            max_locks,
            sweep_goal_pct,
            compressor: defaults.compressor,
            page_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let mut cfg = CacheConfig::default();
        cfg.raw_ratio = 0;
        assert!(cfg.validate().is_err());
        cfg.raw_ratio = 100;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_locks() {
        let mut cfg = CacheConfig::default();
        cfg.max_locks = 0;
        assert!(cfg.validate().is_err());
    }
}
