//! Tuning for the synchronizer, the worker pool and the watcher.
//!
//! Every field has a default, so a YAML overlay only needs the keys it
//! changes:
//!
//! ```yaml
//! workers: 8
//! index_mode: inline
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// How save/delete hooks reach the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Submit a job to the worker pool and return immediately.
    #[default]
    Background,
    /// Update the catalog before the hook returns, so its errors reach the caller.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Concurrent workers.
    pub workers: usize,
    /// Jobs that may wait before `submit` blocks.
    pub queue_capacity: usize,
    /// Errors buffered for the supervisor before new ones are dropped.
    pub error_buffer: usize,
    /// Filesystem events buffered between the watcher thread and the sync loop.
    pub watch_buffer: usize,
    pub index_mode: IndexMode,
    /// Re-index every file under the watch root at startup.
    pub rewatch: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            error_buffer: 256,
            watch_buffer: 1024,
            index_mode: IndexMode::Background,
            rewatch: true,
        }
    }
}

impl SyncConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("workers", self.workers),
            ("queue_capacity", self.queue_capacity),
            ("error_buffer", self.error_buffer),
            ("watch_buffer", self.watch_buffer),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}
