//! Table Catalog
//!
//! Registry mapping table names to tables.
//!
//! ## Responsibilities
//! - Create tables on first use, hand out shared handles
//! - Delete tables together with all their entities
//! - Issue ETags from one clock shared by every table, so a recreated
//!   table never reuses an ETag of the table it replaced
//! - Load and persist snapshots when configured to

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::snapshot::{self, CatalogImage};
use crate::table::{Table, VersionClock};

/// Registry of named tables
pub struct TableCatalog {
    config: Config,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    clock: VersionClock,
}

impl TableCatalog {
    /// Create an empty, memory-only catalog
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tables: RwLock::new(HashMap::new()),
            clock: VersionClock::starting_at(1),
        }
    }

    /// Open a catalog, loading `config.snapshot_path` if the file exists
    pub fn open(config: Config) -> Result<Self> {
        match config.snapshot_path().map(Path::to_path_buf) {
            Some(path) if path.exists() => Self::load_snapshot(config, &path),
            _ => Ok(Self::new(config)),
        }
    }

    /// Return the named table, creating an empty one if absent
    pub fn create_if_not_exists(&self, name: &str) -> Arc<Table> {
        if let Some(table) = self.tables.read().get(name) {
            return Arc::clone(table);
        }

        let mut tables = self.tables.write();
        let table = tables.entry(name.to_string()).or_insert_with(|| {
            info!(table = name, "table created");
            Arc::new(Table::with_clock(name, self.config.clone(), self.clock.clone()))
        });
        Arc::clone(table)
    }

    /// Remove the named table and discard its entities.
    /// Returns false (and does nothing) if there was no such table.
    pub fn delete_if_exists(&self, name: &str) -> bool {
        let removed = self.tables.write().remove(name);

        match removed {
            Some(table) => {
                let discarded = table.drop_contents();
                info!(table = name, discarded, "table deleted");
                true
            }
            None => false,
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Handle to an existing table
    pub fn get(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.read().get(name).cloned()
    }

    /// Table names, sorted
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Write every table to a snapshot file.
    /// Tables deleted while the snapshot is taken are left out.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();

        let mut images: Vec<_> = tables.iter().filter_map(|table| table.to_image()).collect();
        images.sort_by(|a, b| a.name.cmp(&b.name));

        // Read after the images so it is past every ETag they hold
        let next_version = self.clock.peek();

        let entity_count: usize = images.iter().map(|image| image.entities.len()).sum();
        snapshot::write(
            path,
            &CatalogImage {
                next_version,
                tables: images,
            },
        )?;

        info!(path = %path.display(), entities = entity_count, "snapshot saved");
        Ok(())
    }

    /// Build a catalog from a snapshot file
    pub fn load_snapshot(config: Config, path: &Path) -> Result<Self> {
        let image = snapshot::read(path)?;
        let clock = VersionClock::starting_at(image.next_version);

        let mut tables = HashMap::with_capacity(image.tables.len());
        for table in image.tables {
            let name = table.name.clone();
            let table = Table::from_image(table, config.clone(), clock.clone());
            tables.insert(name, Arc::new(table));
        }

        info!(path = %path.display(), tables = tables.len(), "snapshot loaded");
        Ok(Self {
            config,
            tables: RwLock::new(tables),
            clock,
        })
    }

    /// Persist to `config.snapshot_path` if one is configured
    pub fn close(self) -> Result<()> {
        if let Some(path) = self.config.snapshot_path().map(Path::to_path_buf) {
            self.save_snapshot(&path)?;
        }
        Ok(())
    }
}

impl Default for TableCatalog {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
