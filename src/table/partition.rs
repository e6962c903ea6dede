//! Partition storage
//!
//! Rows of one partition live in a `BTreeMap` keyed by RowKey behind their
//! own `RwLock`. Writers to a partition are serialized by that lock; writers
//! to different partitions never contend on it.
//!
//! Every write is split in two phases:
//! - **stage**: check the operation against the current rows and compute
//!   the resulting row, without touching the map (fallible)
//! - **apply**: install the staged row (infallible)
//!
//! A batch stages all of its operations before applying any, so a failure
//! or cancellation during staging leaves the partition untouched.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::entity::{DynamicEntity, ETag};
use crate::error::{Result, TableError};

use super::operation::{TableOperation, TableResult};

/// Rows of one partition, ordered by RowKey
pub(crate) type Rows = BTreeMap<String, DynamicEntity>;

/// A single partition
#[derive(Default)]
pub(crate) struct Partition {
    pub(crate) rows: RwLock<Rows>,
}

/// Source of ETags and write timestamps.
///
/// Clones share one counter. A catalog hands the same clock to every table
/// it creates, so an ETag is never issued twice within a catalog, even
/// across a table being deleted and recreated under the same name.
#[derive(Clone)]
pub(crate) struct VersionClock {
    next_version: Arc<AtomicU64>,
}

impl VersionClock {
    pub(crate) fn starting_at(next_version: u64) -> Self {
        Self {
            next_version: Arc::new(AtomicU64::new(next_version)),
        }
    }

    pub(crate) fn peek(&self) -> u64 {
        self.next_version.load(Ordering::Acquire)
    }

    fn next_etag(&self) -> ETag {
        ETag::from_version(self.next_version.fetch_add(1, Ordering::AcqRel))
    }

    /// Wall clock, but never earlier than the row's previous write
    fn timestamp_after(&self, previous: Option<&DynamicEntity>) -> DateTime<Utc> {
        let now = Utc::now();
        match previous.and_then(DynamicEntity::timestamp) {
            Some(prev) if prev > now => prev,
            _ => now,
        }
    }

    fn stamp(&self, entity: &mut DynamicEntity, previous: Option<&DynamicEntity>) {
        let timestamp = self.timestamp_after(previous);
        entity.stamp(self.next_etag(), timestamp);
    }
}

/// A validated change waiting to be applied
pub(crate) enum Staged {
    Put(DynamicEntity),
    Remove(String),
}

// =============================================================================
// Stage / Apply
// =============================================================================

/// Check `op` against `rows` and compute its effect
pub(crate) fn stage(
    rows: &Rows,
    op: &TableOperation,
    clock: &VersionClock,
) -> Result<(Staged, TableResult)> {
    if let Some(entity) = op.entity() {
        entity.validate()?;
    }

    let key = op.key();
    let existing = rows.get(key.row_key());

    let staged = match op {
        TableOperation::Insert(entity) => {
            if existing.is_some() {
                return Err(TableError::conflict(key.partition_key(), key.row_key()));
            }
            insert_row(entity, clock)
        }
        TableOperation::Replace { entity, etag } => {
            let current = require(existing, op)?;
            check_etag(etag.as_ref(), current)?;
            replace_row(entity, current, clock)
        }
        TableOperation::Merge { entity, etag } => {
            let current = require(existing, op)?;
            check_etag(etag.as_ref(), current)?;
            merge_row(entity, current, clock)
        }
        TableOperation::InsertOrReplace(entity) => match existing {
            Some(current) => replace_row(entity, current, clock),
            None => insert_row(entity, clock),
        },
        TableOperation::InsertOrMerge(entity) => match existing {
            Some(current) => merge_row(entity, current, clock),
            None => insert_row(entity, clock),
        },
        TableOperation::Delete { etag, .. } => {
            let current = require(existing, op)?;
            check_etag(etag.as_ref(), current)?;
            return Ok((
                Staged::Remove(key.row_key().to_string()),
                TableResult::deleted(),
            ));
        }
        TableOperation::Retrieve { .. } => {
            return Err(TableError::Validation(
                "retrieve cannot be staged as a write".to_string(),
            ));
        }
    };

    let result = TableResult::stored(staged.clone());
    Ok((Staged::Put(staged), result))
}

/// Install a staged change
pub(crate) fn apply(rows: &mut Rows, staged: Staged) {
    match staged {
        Staged::Put(entity) => {
            rows.insert(entity.row_key().to_string(), entity);
        }
        Staged::Remove(row_key) => {
            rows.remove(&row_key);
        }
    }
}

fn insert_row(entity: &DynamicEntity, clock: &VersionClock) -> DynamicEntity {
    let mut row = entity.clone();
    clock.stamp(&mut row, None);
    row
}

fn replace_row(entity: &DynamicEntity, current: &DynamicEntity, clock: &VersionClock) -> DynamicEntity {
    let mut row = entity.clone();
    clock.stamp(&mut row, Some(current));
    row
}

fn merge_row(entity: &DynamicEntity, current: &DynamicEntity, clock: &VersionClock) -> DynamicEntity {
    let mut row = current.clone();
    row.merge_from(entity);
    clock.stamp(&mut row, Some(current));
    row
}

fn require<'a>(existing: Option<&'a DynamicEntity>, op: &TableOperation) -> Result<&'a DynamicEntity> {
    existing.ok_or_else(|| TableError::not_found(op.key().partition_key(), op.key().row_key()))
}

fn check_etag(expected: Option<&ETag>, current: &DynamicEntity) -> Result<()> {
    match (expected, current.etag()) {
        (Some(expected), Some(actual)) if expected != actual => Err(TableError::Concurrency {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Range Helpers
// =============================================================================

/// True if no key can satisfy both bounds.
///
/// `BTreeMap::range` panics on inverted bounds, so callers check first.
pub(crate) fn range_is_empty(lower: Bound<&str>, upper: Bound<&str>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

/// Append every row of `rows` within bounds to `out`
pub(crate) fn collect_range(
    rows: &Rows,
    lower: Bound<&str>,
    upper: Bound<&str>,
    out: &mut Vec<DynamicEntity>,
) {
    if range_is_empty(lower, upper) {
        return;
    }
    out.extend(
        rows.range::<str, _>((lower, upper))
            .map(|(_, entity)| entity.clone()),
    );
}
