//! Table operations
//!
//! A `TableOperation` describes one point read or write. Writes can be
//! executed alone or grouped into a `TableBatchOperation`, which commits
//! atomically within a single partition.

use crate::entity::{DynamicEntity, ETag, EntityKey};

/// Operation kinds, used for logging and batch validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Replace,
    Merge,
    InsertOrReplace,
    InsertOrMerge,
    Delete,
    Retrieve,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Replace => "replace",
            OperationKind::Merge => "merge",
            OperationKind::InsertOrReplace => "insert_or_replace",
            OperationKind::InsertOrMerge => "insert_or_merge",
            OperationKind::Delete => "delete",
            OperationKind::Retrieve => "retrieve",
        }
    }
}

/// A single operation against one entity.
///
/// `etag: None` means "match any version" (unconditional).
#[derive(Debug, Clone)]
pub enum TableOperation {
    /// Fails with `Conflict` if the key exists
    Insert(DynamicEntity),

    /// Full overwrite of an existing entity
    Replace {
        entity: DynamicEntity,
        etag: Option<ETag>,
    },

    /// Overwrite only the supplied properties of an existing entity
    Merge {
        entity: DynamicEntity,
        etag: Option<ETag>,
    },

    /// Unconditional replace, or insert if absent
    InsertOrReplace(DynamicEntity),

    /// Unconditional merge, or insert if absent
    InsertOrMerge(DynamicEntity),

    /// Remove an existing entity
    Delete { key: EntityKey, etag: Option<ETag> },

    /// Point lookup (not allowed inside a batch)
    Retrieve { key: EntityKey },
}

impl TableOperation {
    pub fn insert(entity: DynamicEntity) -> Self {
        TableOperation::Insert(entity)
    }

    /// Replace guarded by the ETag the entity was read with, if any
    pub fn replace(entity: DynamicEntity) -> Self {
        let etag = entity.etag().cloned();
        TableOperation::Replace { entity, etag }
    }

    /// Merge guarded by the ETag the entity was read with, if any
    pub fn merge(entity: DynamicEntity) -> Self {
        let etag = entity.etag().cloned();
        TableOperation::Merge { entity, etag }
    }

    pub fn insert_or_replace(entity: DynamicEntity) -> Self {
        TableOperation::InsertOrReplace(entity)
    }

    pub fn insert_or_merge(entity: DynamicEntity) -> Self {
        TableOperation::InsertOrMerge(entity)
    }

    /// Unconditional delete by key
    pub fn delete(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        TableOperation::Delete {
            key: EntityKey::new(partition_key, row_key),
            etag: None,
        }
    }

    /// Delete guarded by the ETag the entity was read with, if any
    pub fn delete_entity(entity: &DynamicEntity) -> Self {
        TableOperation::Delete {
            key: entity.key().clone(),
            etag: entity.etag().cloned(),
        }
    }

    pub fn retrieve(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        TableOperation::Retrieve {
            key: EntityKey::new(partition_key, row_key),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            TableOperation::Insert(_) => OperationKind::Insert,
            TableOperation::Replace { .. } => OperationKind::Replace,
            TableOperation::Merge { .. } => OperationKind::Merge,
            TableOperation::InsertOrReplace(_) => OperationKind::InsertOrReplace,
            TableOperation::InsertOrMerge(_) => OperationKind::InsertOrMerge,
            TableOperation::Delete { .. } => OperationKind::Delete,
            TableOperation::Retrieve { .. } => OperationKind::Retrieve,
        }
    }

    /// Key of the entity this operation targets
    pub fn key(&self) -> &EntityKey {
        match self {
            TableOperation::Insert(entity)
            | TableOperation::InsertOrReplace(entity)
            | TableOperation::InsertOrMerge(entity)
            | TableOperation::Replace { entity, .. }
            | TableOperation::Merge { entity, .. } => entity.key(),
            TableOperation::Delete { key, .. } | TableOperation::Retrieve { key } => key,
        }
    }

    pub fn partition_key(&self) -> &str {
        self.key().partition_key()
    }

    /// Entity payload carried by write operations
    pub(crate) fn entity(&self) -> Option<&DynamicEntity> {
        match self {
            TableOperation::Insert(entity)
            | TableOperation::InsertOrReplace(entity)
            | TableOperation::InsertOrMerge(entity)
            | TableOperation::Replace { entity, .. }
            | TableOperation::Merge { entity, .. } => Some(entity),
            TableOperation::Delete { .. } | TableOperation::Retrieve { .. } => None,
        }
    }

    /// Whether this operation may create a row (and so its partition)
    pub(crate) fn may_create(&self) -> bool {
        matches!(
            self,
            TableOperation::Insert(_)
                | TableOperation::InsertOrReplace(_)
                | TableOperation::InsertOrMerge(_)
        )
    }
}

/// Outcome of one operation
#[derive(Debug, Clone, PartialEq)]
pub struct TableResult {
    /// Stored entity after a write, or the entity found by a retrieve.
    /// None for deletes.
    pub entity: Option<DynamicEntity>,

    /// ETag of the stored entity (None for deletes)
    pub etag: Option<ETag>,
}

impl TableResult {
    pub(crate) fn stored(entity: DynamicEntity) -> Self {
        let etag = entity.etag().cloned();
        Self {
            entity: Some(entity),
            etag,
        }
    }

    pub(crate) fn deleted() -> Self {
        Self {
            entity: None,
            etag: None,
        }
    }

    pub fn into_entity(self) -> Option<DynamicEntity> {
        self.entity
    }
}

/// Ordered group of write operations on one partition
#[derive(Debug, Clone, Default)]
pub struct TableBatchOperation {
    operations: Vec<TableOperation>,
}

impl TableBatchOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, operation: TableOperation) {
        self.operations.push(operation);
    }

    pub fn insert(&mut self, entity: DynamicEntity) {
        self.add(TableOperation::insert(entity));
    }

    pub fn replace(&mut self, entity: DynamicEntity) {
        self.add(TableOperation::replace(entity));
    }

    pub fn merge(&mut self, entity: DynamicEntity) {
        self.add(TableOperation::merge(entity));
    }

    pub fn insert_or_replace(&mut self, entity: DynamicEntity) {
        self.add(TableOperation::insert_or_replace(entity));
    }

    pub fn insert_or_merge(&mut self, entity: DynamicEntity) {
        self.add(TableOperation::insert_or_merge(entity));
    }

    pub fn delete(&mut self, entity: &DynamicEntity) {
        self.add(TableOperation::delete_entity(entity));
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TableOperation> {
        self.operations.iter()
    }
}

impl FromIterator<TableOperation> for TableBatchOperation {
    fn from_iter<I: IntoIterator<Item = TableOperation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TableBatchOperation {
    type Item = &'a TableOperation;
    type IntoIter = std::slice::Iter<'a, TableOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}
