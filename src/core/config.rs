//! Execution configuration.
//!
//! Parallel backend settings are passed explicitly to the engine rather than
//! read from process-wide state. They can be built in code or loaded from a
//! TOML file:
//!
//! ```toml
//! parallel = true
//! show_progress = false
//! cleanup = true
//!
//! [workers]
//! max_workers = 4
//! chunksize = 2
//! if_serial = "warn"
//! ```

use crate::core::error::BioappError;
use crate::core::parallel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Action taken when a parallel run resolves to a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IfSerial {
    Raise,
    #[default]
    Warn,
    Ignore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Worker count. Defaults to available cores minus one.
    pub max_workers: Option<usize>,
    /// Minimum number of consecutive inputs handed to one worker.
    pub chunksize: Option<usize>,
    pub if_serial: IfSerial,
}

impl ParallelConfig {
    pub fn resolved_workers(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| parallel::cpu_count().saturating_sub(1))
            .max(1)
    }
}

/// Options for a batch run of an app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyOptions {
    pub parallel: bool,
    pub show_progress: bool,
    /// Remove the output store's scratch artifacts once the batch finishes.
    pub cleanup: bool,
    pub workers: ParallelConfig,
}

impl ApplyOptions {
    pub fn serial() -> Self {
        Self::default()
    }

    pub fn parallel(workers: ParallelConfig) -> Self {
        Self {
            parallel: true,
            workers,
            ..Self::default()
        }
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, BioappError> {
        toml::from_str(content).map_err(|e| BioappError::Configuration(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, BioappError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
