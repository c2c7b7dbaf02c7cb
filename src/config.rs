//! Configuration for Zelos
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ZelosError};

/// Main configuration for a Zelos container
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all collection files
    /// Internal structure:
    ///   {base_dir}/
    ///     ├── users.zelos         (collection records)
    ///     ├── users.zelos.lock    (advisory lock, when file_lock is on)
    ///     └── users.zelos.compact (transient, only during compaction)
    pub base_dir: PathBuf,

    /// Sync strategy: how often appends are fsynced
    pub sync_strategy: SyncStrategy,

    /// Hold an exclusive advisory lock on every opened collection file
    pub file_lock: bool,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Compact once dead bytes / total bytes exceeds this ratio
    pub compaction_dead_ratio: f64,

    /// Files smaller than this are never compacted automatically (in bytes)
    pub compaction_min_bytes: u64,

    /// Run automatic compaction on a background worker instead of inline
    pub background_compaction: bool,

    /// Attempts made by automatic compaction before giving up until the next trigger
    pub compaction_attempts: usize,

    // -------------------------------------------------------------------------
    // Access Configuration
    // -------------------------------------------------------------------------
    /// Default wait for the write section; None waits indefinitely
    pub write_timeout: Option<Duration>,

    /// Decoded documents kept per collection (0 disables the cache)
    pub cache_capacity: usize,
}

/// Append sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced appends, on flush, and on close
    EveryNWrites { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./zelos_data"),
            sync_strategy: SyncStrategy::EveryWrite,
            file_lock: true,
            compaction_dead_ratio: 0.5,
            compaction_min_bytes: 64 * 1024, // 64 KB
            background_compaction: false,
            compaction_attempts: 3,
            write_timeout: None,
            cache_capacity: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that all values are usable
    pub fn validate(&self) -> Result<()> {
        if !(self.compaction_dead_ratio > 0.0 && self.compaction_dead_ratio <= 1.0) {
            return Err(ZelosError::Config(format!(
                "compaction_dead_ratio must be in (0, 1], got {}",
                self.compaction_dead_ratio
            )));
        }
        if let SyncStrategy::EveryNWrites { count: 0 } = self.sync_strategy {
            return Err(ZelosError::Config(
                "sync_strategy EveryNWrites needs a count of at least 1".to_string(),
            ));
        }
        if self.compaction_attempts == 0 {
            return Err(ZelosError::Config(
                "compaction_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the base directory (root for all collection files)
    pub fn base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_dir = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Shorthand: fsync every write (`true`) or batch every 100 writes (`false`)
    pub fn flush_on_write(mut self, enabled: bool) -> Self {
        self.config.sync_strategy = if enabled {
            SyncStrategy::EveryWrite
        } else {
            SyncStrategy::EveryNWrites { count: 100 }
        };
        self
    }

    /// Enable or disable the single-container-per-file lock
    pub fn file_lock(mut self, enabled: bool) -> Self {
        self.config.file_lock = enabled;
        self
    }

    /// Set the dead-bytes ratio that triggers compaction
    pub fn compaction_dead_ratio(mut self, ratio: f64) -> Self {
        self.config.compaction_dead_ratio = ratio;
        self
    }

    /// Set the minimum file size for automatic compaction (in bytes)
    pub fn compaction_min_bytes(mut self, bytes: u64) -> Self {
        self.config.compaction_min_bytes = bytes;
        self
    }

    /// Run automatic compaction on a background worker
    pub fn background_compaction(mut self, enabled: bool) -> Self {
        self.config.background_compaction = enabled;
        self
    }

    /// Set how many times automatic compaction is attempted
    pub fn compaction_attempts(mut self, attempts: usize) -> Self {
        self.config.compaction_attempts = attempts;
        self
    }

    /// Set the default write-section timeout
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the per-collection document cache capacity
    pub fn cache_capacity(mut self, documents: usize) -> Self {
        self.config.cache_capacity = documents;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
