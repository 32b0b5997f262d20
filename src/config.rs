//! Configuration for the media catalog scanner

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::classifier;
use crate::hasher::DEFAULT_WORKERS;

/// Default number of files per catalog transaction
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default progress cadence (files processed)
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

/// Default number of error messages kept in a report
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 100;

/// Errors loading a config file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration for the scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Root directory to scan
    pub root: PathBuf,

    /// Whether to scan subdirectories recursively
    pub recursive: bool,

    /// Include entries whose name starts with `.` (or are hidden by the platform)
    pub include_hidden: bool,

    /// Skip files whose path, digest and mtime already match the catalog
    pub incremental: bool,

    /// Number of hash worker threads; 0 means auto-detect
    pub workers: usize,

    /// Files per catalog transaction
    pub batch_size: usize,

    /// Report progress every N files
    pub progress_interval: u64,

    /// Error messages kept in the report
    pub max_reported_errors: usize,

    /// File extensions to include (whitelist). Empty accepts all files.
    pub extensions: HashSet<String>,

    /// Database path for the catalog
    pub db_path: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            recursive: true,
            include_hidden: false,
            incremental: true,
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
            extensions: classifier::supported_extensions(),
            db_path: None,
        }
    }
}

impl ScanConfig {
    /// Create a new config for the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Load a JSON config file; absent fields keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the effective number of hash workers
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(DEFAULT_WORKERS)
        } else {
            self.workers
        }
    }

    /// Batch size, never zero
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config
    pub fn from_config(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn root(mut self, root: PathBuf) -> Self {
        self.config.root = root;
        self
    }

    pub fn recursive(mut self, enabled: bool) -> Self {
        self.config.recursive = enabled;
        self
    }

    pub fn include_hidden(mut self, enabled: bool) -> Self {
        self.config.include_hidden = enabled;
        self
    }

    pub fn incremental(mut self, enabled: bool) -> Self {
        self.config.incremental = enabled;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn progress_interval(mut self, interval: u64) -> Self {
        self.config.progress_interval = interval;
        self
    }

    pub fn max_reported_errors(mut self, max: usize) -> Self {
        self.config.max_reported_errors = max;
        self
    }

    /// Set the extensions whitelist
    pub fn extensions(mut self, extensions: HashSet<String>) -> Self {
        self.config.extensions = extensions;
        self
    }

    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = Some(path);
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        self.config
    }
}
