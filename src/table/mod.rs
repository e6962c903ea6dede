//! Table Module
//!
//! An ordered collection of entities keyed by (PartitionKey, RowKey).
//!
//! ## Concurrency Model: Single Writer per Partition
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Table                                                    │
//! │  partitions: RwLock<BTreeMap<PartitionKey, Partition>>   │
//! │                                                          │
//! │   ┌─────────────────┐  ┌─────────────────┐               │
//! │   │ "Harp"          │  │ "Smith"         │   ...         │
//! │   │ RwLock<Rows>    │  │ RwLock<Rows>    │               │
//! │   └─────────────────┘  └─────────────────┘               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! - Every operation holds the partition map **read** lock for its duration;
//!   the map **write** lock is only taken to create or prune a partition, or
//!   to drop the table.
//! - Point and batch writes hold the partition's row **write** lock across
//!   validate + apply, so writes to one partition are serialized.
//! - Reads and query pages hold the row **read** lock. A query page copies
//!   every matching row of a partition under one acquisition, so a scan
//!   never sees a partition half before and half after a write.
//! - Lock order is always map → partition; nothing waits on the map while
//!   holding a partition lock.

mod operation;
mod partition;
mod query;

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::entity::{DynamicEntity, ETag, EntityKey};
use crate::error::{Result, TableError};

pub use operation::{OperationKind, TableBatchOperation, TableOperation, TableResult};
pub use query::{QueryIter, TableQuery};

use partition::{apply, collect_range, range_is_empty, stage, Partition, Rows};

pub(crate) use partition::VersionClock;

/// Serializable image of one table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TableImage {
    pub(crate) name: String,
    pub(crate) entities: Vec<DynamicEntity>,
}

/// A named table of entities
pub struct Table {
    name: String,
    config: Config,
    partitions: RwLock<BTreeMap<String, Arc<Partition>>>,
    clock: VersionClock,
    dropped: AtomicBool,
}

impl Table {
    /// Create an empty, unregistered table
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        Self::with_clock(name, config, VersionClock::starting_at(1))
    }

    /// Create an empty table drawing ETags from a shared clock
    pub(crate) fn with_clock(name: impl Into<String>, config: Config, clock: VersionClock) -> Self {
        Self {
            name: name.into(),
            config,
            partitions: RwLock::new(BTreeMap::new()),
            clock,
            dropped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// False once the table has been deleted from its catalog
    pub fn is_live(&self) -> bool {
        !self.dropped.load(Ordering::Acquire)
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Insert a new entity; `Conflict` if the key exists
    pub fn insert(&self, entity: DynamicEntity) -> Result<DynamicEntity> {
        self.execute_write(TableOperation::insert(entity))
    }

    /// Look up one entity; `NotFound` if absent
    pub fn retrieve(&self, partition_key: &str, row_key: &str) -> Result<DynamicEntity> {
        self.try_retrieve(partition_key, row_key)?
            .ok_or_else(|| TableError::not_found(partition_key, row_key))
    }

    /// Look up one entity, with absence as `Ok(None)`
    pub fn try_retrieve(&self, partition_key: &str, row_key: &str) -> Result<Option<DynamicEntity>> {
        let partitions = self.partitions.read();
        self.ensure_live()?;

        let found = partitions
            .get(partition_key)
            .and_then(|partition| partition.rows.read().get(row_key).cloned());

        debug!(table = %self.name, partition_key, row_key, found = found.is_some(), "retrieve");
        Ok(found)
    }

    /// Overwrite all properties of an existing entity.
    /// With `etag`, fails with `Concurrency` unless it matches the stored one.
    pub fn replace(&self, entity: DynamicEntity, etag: Option<&ETag>) -> Result<DynamicEntity> {
        self.execute_write(TableOperation::Replace {
            entity,
            etag: etag.cloned(),
        })
    }

    /// Overwrite only the supplied properties of an existing entity
    pub fn merge(&self, entity: DynamicEntity, etag: Option<&ETag>) -> Result<DynamicEntity> {
        self.execute_write(TableOperation::Merge {
            entity,
            etag: etag.cloned(),
        })
    }

    pub fn insert_or_replace(&self, entity: DynamicEntity) -> Result<DynamicEntity> {
        self.execute_write(TableOperation::insert_or_replace(entity))
    }

    pub fn insert_or_merge(&self, entity: DynamicEntity) -> Result<DynamicEntity> {
        self.execute_write(TableOperation::insert_or_merge(entity))
    }

    /// Remove an entity; `NotFound` if absent, `Concurrency` on ETag mismatch
    pub fn delete(&self, partition_key: &str, row_key: &str, etag: Option<&ETag>) -> Result<()> {
        self.execute(TableOperation::Delete {
            key: EntityKey::new(partition_key, row_key),
            etag: etag.cloned(),
        })?;
        Ok(())
    }

    /// Execute any single operation
    pub fn execute(&self, operation: TableOperation) -> Result<TableResult> {
        if let TableOperation::Retrieve { key } = &operation {
            let entity = self.retrieve(key.partition_key(), key.row_key())?;
            return Ok(TableResult::stored(entity));
        }

        let kind = operation.kind();
        let key = operation.key().clone();

        let result = self.write_partition(key.partition_key(), operation.may_create(), |rows| {
            let (staged, result) = stage(rows, &operation, &self.clock)?;
            apply(rows, staged);
            Ok(result)
        });

        match &result {
            Ok(_) => debug!(table = %self.name, op = kind.name(), key = %key, "applied"),
            Err(err) => debug!(table = %self.name, op = kind.name(), key = %key, error = %err, "rejected"),
        }
        result
    }

    fn execute_write(&self, operation: TableOperation) -> Result<DynamicEntity> {
        let key = operation.key().clone();
        self.execute(operation)?
            .into_entity()
            .ok_or_else(|| TableError::not_found(key.partition_key(), key.row_key()))
    }

    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Execute a batch atomically; see `execute_batch_with_cancel`
    pub fn execute_batch(&self, batch: &TableBatchOperation) -> Result<Vec<TableResult>> {
        self.execute_batch_with_cancel(batch, &CancellationToken::new())
    }

    /// Execute a batch atomically within one partition.
    ///
    /// All operations are checked against the current rows before any is
    /// applied; if one fails (or `cancel` fires first) nothing changes.
    /// Results come back in input order.
    pub fn execute_batch_with_cancel(
        &self,
        batch: &TableBatchOperation,
        cancel: &CancellationToken,
    ) -> Result<Vec<TableResult>> {
        let partition_key = self.validate_batch(batch)?;
        cancel.check()?;

        let may_create = batch.iter().any(TableOperation::may_create);

        let result = self.write_partition(&partition_key, may_create, |rows| {
            let mut staged = Vec::with_capacity(batch.len());
            for (index, operation) in batch.iter().enumerate() {
                cancel.check()?;
                let entry = stage(rows, operation, &self.clock).map_err(|source| {
                    TableError::BatchOperationFailed {
                        index,
                        source: Box::new(source),
                    }
                })?;
                staged.push(entry);
            }

            // Commit point: everything below is infallible
            Ok(staged
                .into_iter()
                .map(|(change, result)| {
                    apply(rows, change);
                    result
                })
                .collect::<Vec<_>>())
        });

        match &result {
            Ok(results) => debug!(
                table = %self.name,
                partition_key = %partition_key,
                operations = results.len(),
                "batch committed"
            ),
            Err(err) => warn!(
                table = %self.name,
                partition_key = %partition_key,
                error = %err,
                "batch rejected"
            ),
        }
        result
    }

    /// Structural checks that need no table state.
    /// Returns the batch's partition key.
    fn validate_batch(&self, batch: &TableBatchOperation) -> Result<String> {
        let first = batch
            .iter()
            .next()
            .ok_or_else(|| TableError::Validation("batch contains no operations".to_string()))?;

        if batch.len() > self.config.max_batch_operations() {
            return Err(TableError::Validation(format!(
                "batch has {} operations, limit is {}",
                batch.len(),
                self.config.max_batch_operations()
            )));
        }

        let partition_key = first.partition_key();
        let mut seen = HashSet::with_capacity(batch.len());

        for operation in batch {
            if operation.partition_key() != partition_key {
                return Err(TableError::BatchPartitionMismatch {
                    expected: partition_key.to_string(),
                    found: operation.partition_key().to_string(),
                });
            }
            if operation.kind() == OperationKind::Retrieve {
                return Err(TableError::Validation(
                    "retrieve is not allowed inside a batch".to_string(),
                ));
            }
            if !seen.insert(operation.key().row_key()) {
                return Err(TableError::Validation(format!(
                    "batch targets {} more than once",
                    operation.key()
                )));
            }
        }

        Ok(partition_key.to_string())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Lazily run a query
    pub fn query(&self, query: TableQuery) -> QueryIter<'_> {
        QueryIter::new(self, query, self.config.query_page_size())
    }

    /// Entities of one partition whose RowKey lies within the bounds,
    /// ascending by RowKey
    pub fn range_query(&self, partition_key: &str, lower: Bound<&str>, upper: Bound<&str>) -> QueryIter<'_> {
        self.query(
            TableQuery::new()
                .partition(partition_key)
                .row_key_range(lower, upper),
        )
    }

    /// Like `range_query`, returning only the named properties.
    /// Without a partition key every partition is scanned.
    pub fn project<I, S>(
        &self,
        partition_key: Option<&str>,
        lower: Bound<&str>,
        upper: Bound<&str>,
        properties: I,
    ) -> QueryIter<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut query = TableQuery::new().row_key_range(lower, upper).select(properties);
        if let Some(partition_key) = partition_key {
            query = query.partition(partition_key);
        }
        self.query(query)
    }

    /// Every entity in (PartitionKey, RowKey) order
    pub fn scan(&self) -> QueryIter<'_> {
        self.query(TableQuery::new())
    }

    /// Number of entities
    pub fn count(&self) -> Result<usize> {
        let partitions = self.partitions.read();
        self.ensure_live()?;
        Ok(partitions
            .values()
            .map(|partition| partition.rows.read().len())
            .sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    /// Number of non-empty partitions
    pub fn partition_count(&self) -> Result<usize> {
        let partitions = self.partitions.read();
        self.ensure_live()?;
        Ok(partitions
            .values()
            .filter(|partition| !partition.rows.read().is_empty())
            .count())
    }

    /// Delete every entity, one batch per partition (chunked to the batch
    /// limit). Returns the number of entities deleted.
    pub fn delete_all(&self) -> Result<usize> {
        let mut by_partition: BTreeMap<String, Vec<EntityKey>> = BTreeMap::new();
        for entity in self.scan() {
            let entity = entity?;
            by_partition
                .entry(entity.partition_key().to_string())
                .or_default()
                .push(entity.key().clone());
        }

        let mut deleted = 0;
        for (partition_key, keys) in by_partition {
            for chunk in keys.chunks(self.config.max_batch_operations()) {
                let batch: TableBatchOperation = chunk
                    .iter()
                    .map(|key| TableOperation::delete(key.partition_key(), key.row_key()))
                    .collect();
                self.execute_batch(&batch)?;
                deleted += chunk.len();
            }
            debug!(table = %self.name, partition_key = %partition_key, "partition wiped");
        }
        Ok(deleted)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(TableError::TableNotFound(self.name.clone()))
        }
    }

    /// Run `f` with exclusive access to a partition's rows.
    ///
    /// The partition is created first when `create` is set. Otherwise an
    /// absent partition is presented as empty rows. A partition left empty
    /// afterwards is pruned.
    fn write_partition<T>(
        &self,
        partition_key: &str,
        create: bool,
        f: impl FnOnce(&mut Rows) -> Result<T>,
    ) -> Result<T> {
        loop {
            {
                let partitions = self.partitions.read();
                self.ensure_live()?;

                let partition = partitions.get(partition_key);
                if partition.is_some() || !create {
                    let (result, now_empty) = match partition {
                        Some(partition) => {
                            let mut rows = partition.rows.write();
                            let result = f(&mut rows);
                            (result, rows.is_empty())
                        }
                        None => (f(&mut Rows::new()), false),
                    };
                    drop(partitions);

                    if now_empty {
                        self.prune(partition_key);
                    }
                    return result;
                }
            }

            // Partition missing and needed: create it, then retry under the read lock
            let mut partitions = self.partitions.write();
            self.ensure_live()?;
            partitions.entry(partition_key.to_string()).or_default();
        }
    }

    fn prune(&self, partition_key: &str) {
        let mut partitions = self.partitions.write();
        let empty = partitions
            .get(partition_key)
            .map(|partition| partition.rows.read().is_empty())
            .unwrap_or(false);
        if empty {
            partitions.remove(partition_key);
        }
    }

    /// One page of `query` results from partitions after `after`.
    ///
    /// Whole partitions are copied, each under a single read lock; the page
    /// closes at the first partition boundary once it holds `limit` entities.
    /// The flag is true when more results may follow.
    pub(crate) fn read_page(
        &self,
        query: &TableQuery,
        after: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<DynamicEntity>, bool)> {
        let partitions = self.partitions.read();
        self.ensure_live()?;

        let start = match (after, query.partition_key()) {
            (Some(after), _) => Bound::Excluded(after),
            (None, Some(pk)) => Bound::Included(pk),
            (None, None) => Bound::Unbounded,
        };
        let end = match query.partition_key() {
            Some(pk) => Bound::Included(pk),
            None => Bound::Unbounded,
        };
        if range_is_empty(start, end) {
            return Ok((Vec::new(), false));
        }

        let mut page = Vec::new();
        for partition in partitions.range::<str, _>((start, end)).map(|(_, p)| p) {
            let rows = partition.rows.read();
            collect_range(&rows, query.lower(), query.upper(), &mut page);
            drop(rows);

            if page.len() >= limit {
                return Ok((page, true));
            }
        }
        Ok((page, false))
    }

    /// Mark dropped and discard all entities; returns how many were held
    pub(crate) fn drop_contents(&self) -> usize {
        let mut partitions = self.partitions.write();
        self.dropped.store(true, Ordering::Release);
        let count = partitions
            .values()
            .map(|partition| partition.rows.read().len())
            .sum();
        partitions.clear();
        count
    }

    /// Image of the current contents; None once the table is dropped
    pub(crate) fn to_image(&self) -> Option<TableImage> {
        let partitions = self.partitions.read();
        if !self.is_live() {
            return None;
        }

        let entities = partitions
            .values()
            .flat_map(|partition| partition.rows.read().values().cloned().collect::<Vec<_>>())
            .collect();

        Some(TableImage {
            name: self.name.clone(),
            entities,
        })
    }

    pub(crate) fn from_image(image: TableImage, config: Config, clock: VersionClock) -> Self {
        let mut partitions: BTreeMap<String, Arc<Partition>> = BTreeMap::new();
        for entity in image.entities {
            let partition = partitions
                .entry(entity.partition_key().to_string())
                .or_default();
            partition
                .rows
                .write()
                .insert(entity.row_key().to_string(), entity);
        }

        Self {
            name: image.name,
            config,
            partitions: RwLock::new(partitions),
            clock,
            dropped: AtomicBool::new(false),
        }
    }
}
