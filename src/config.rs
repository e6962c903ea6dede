//! Configuration for TableKV
//!
//! Centralized configuration with sensible defaults.
//!
//! Fields are read through accessors; the only way to change them is
//! `ConfigBuilder`, whose `build()` rejects unusable values. A `Config`
//! in hand is therefore always valid.

use std::path::{Path, PathBuf};

use crate::error::{Result, TableError};

/// Main configuration for a TableKV catalog
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Batch Configuration
    // -------------------------------------------------------------------------
    /// Maximum number of operations accepted in one batch
    max_batch_operations: usize,

    // -------------------------------------------------------------------------
    // Query Configuration
    // -------------------------------------------------------------------------
    /// Soft limit on entities per query page. A page always holds whole
    /// partitions, so it ends at the first partition boundary at or past
    /// this many entities.
    query_page_size: usize,

    // -------------------------------------------------------------------------
    // Snapshot Configuration
    // -------------------------------------------------------------------------
    /// Snapshot file loaded on open and written on close (None = memory only)
    snapshot_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch_operations: 100,
            query_page_size: 1000,
            snapshot_path: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn max_batch_operations(&self) -> usize {
        self.max_batch_operations
    }

    pub fn query_page_size(&self) -> usize {
        self.query_page_size
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Check that every limit is usable
    fn validate(&self) -> Result<()> {
        if self.max_batch_operations == 0 {
            return Err(TableError::Config(
                "max_batch_operations must be greater than zero".to_string(),
            ));
        }
        if self.query_page_size == 0 {
            return Err(TableError::Config(
                "query_page_size must be greater than zero".to_string(),
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
    /// Set the maximum number of operations per batch
    pub fn max_batch_operations(mut self, count: usize) -> Self {
        self.config.max_batch_operations = count;
        self
    }

    /// Set the number of entities fetched per query page
    pub fn query_page_size(mut self, size: usize) -> Self {
        self.config.query_page_size = size;
        self
    }

    /// Persist the catalog to this file on close
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
