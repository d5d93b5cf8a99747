//! Sweep configuration: defaults, validation and JSON loading.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::sequence::SeedOrder;
use crate::target::TargetDescriptor;

/// Errors raised when sweep configuration invariants are violated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("workers must be at least 1")]
    ZeroWorkers,
    #[error("workers is {workers}; at most {max} are allowed")]
    TooManyWorkers { workers: usize, max: usize },
    #[error("progress_interval must be at least 1")]
    ZeroProgressInterval,
    #[error("failed to parse sweep config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read sweep config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parameters of one sweep over a single target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub target: TargetDescriptor,
    #[serde(default)]
    pub base_seed: u32,
    /// Non-positive values run no trials.
    #[serde(default = "SweepConfig::default_trial_count")]
    pub trial_count: i64,
    #[serde(default)]
    pub order: SeedOrder,
    #[serde(default = "SweepConfig::default_workers")]
    pub workers: usize,
    /// Skip trials whose generation fails instead of aborting the sweep.
    #[serde(default = "SweepConfig::default_tolerate_failures")]
    pub tolerate_failures: bool,
    #[serde(default = "SweepConfig::default_progress_interval")]
    pub progress_interval: u64,
}

impl SweepConfig {
    /// Upper bound on worker threads per sweep.
    pub const MAX_WORKERS: usize = 256;

    const fn default_trial_count() -> i64 {
        0x1000
    }

    const fn default_workers() -> usize {
        1
    }

    const fn default_tolerate_failures() -> bool {
        true
    }

    const fn default_progress_interval() -> u64 {
        4096
    }

    #[must_use]
    pub fn new(target: TargetDescriptor) -> Self {
        Self {
            target,
            base_seed: 0,
            trial_count: Self::default_trial_count(),
            order: SeedOrder::default(),
            workers: Self::default_workers(),
            tolerate_failures: Self::default_tolerate_failures(),
            progress_interval: Self::default_progress_interval(),
        }
    }

    #[must_use]
    pub fn with_base_seed(mut self, base_seed: u32) -> Self {
        self.base_seed = base_seed;
        self
    }

    #[must_use]
    pub fn with_trial_count(mut self, trial_count: i64) -> Self {
        self.trial_count = trial_count;
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: SeedOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_tolerate_failures(mut self, tolerate: bool) -> Self {
        self.tolerate_failures = tolerate;
        self
    }

    /// Trial count clamped at zero.
    #[must_use]
    pub fn trials(&self) -> u64 {
        u64::try_from(self.trial_count).unwrap_or(0)
    }

    /// # Errors
    ///
    /// Returns an error when `workers` or `progress_interval` is zero, or when
    /// `workers` exceeds [`SweepConfig::MAX_WORKERS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.workers > Self::MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                workers: self.workers,
                max: Self::MAX_WORKERS,
            });
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::ZeroProgressInterval);
        }
        Ok(())
    }

    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}
