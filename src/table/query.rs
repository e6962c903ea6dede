//! Table queries
//!
//! A `TableQuery` selects entities by partition and RowKey bounds and may
//! project a subset of properties. Iteration is lazy and paged: each page
//! copies whole partitions, each under its read lock, then the locks are
//! released and the next page resumes at the partition after the last key
//! seen (the continuation key).
//!
//! ```text
//!   page 1              page 2                 page 3
//! ┌────────────┐      ┌───────────────┐      ┌──────┐
//! │ A1 A2 A3   │ ───▶ │ B1 │ C1 C2    │ ───▶ │ D1   │ ───▶ done
//! └────────────┘      └───────────────┘      └──────┘
//!          cont=A3                 cont=C2
//!
//!   (letters are partitions, page_size = 3)
//! ```
//!
//! A page never splits a partition, so the entities yielded for one
//! partition are a single consistent state of it. Different partitions may
//! be read at different moments between the query's start and its end.

use std::collections::VecDeque;
use std::ops::Bound;

use crate::cancel::CancellationToken;
use crate::entity::{DynamicEntity, EntityKey};
use crate::error::{Result, TableError};

use super::Table;

/// Query description; cheap to clone and re-issue
#[derive(Debug, Clone)]
pub struct TableQuery {
    partition_key: Option<String>,
    lower: Bound<String>,
    upper: Bound<String>,
    select: Option<Vec<String>>,
    take: Option<usize>,
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            partition_key: None,
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            select: None,
            take: None,
        }
    }
}

impl TableQuery {
    /// Query over every entity in the table
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one partition
    pub fn partition(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn row_key_ge(mut self, row_key: impl Into<String>) -> Self {
        self.lower = Bound::Included(row_key.into());
        self
    }

    pub fn row_key_gt(mut self, row_key: impl Into<String>) -> Self {
        self.lower = Bound::Excluded(row_key.into());
        self
    }

    pub fn row_key_le(mut self, row_key: impl Into<String>) -> Self {
        self.upper = Bound::Included(row_key.into());
        self
    }

    pub fn row_key_lt(mut self, row_key: impl Into<String>) -> Self {
        self.upper = Bound::Excluded(row_key.into());
        self
    }

    /// Set both RowKey bounds at once
    pub fn row_key_range(mut self, lower: Bound<&str>, upper: Bound<&str>) -> Self {
        self.lower = lower.map(str::to_string);
        self.upper = upper.map(str::to_string);
        self
    }

    /// Return only these properties (system fields are always kept)
    pub fn select<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Stop after `count` entities
    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    pub(crate) fn lower(&self) -> Bound<&str> {
        self.lower.as_ref().map(String::as_str)
    }

    pub(crate) fn upper(&self) -> Bound<&str> {
        self.upper.as_ref().map(String::as_str)
    }

    fn shape(&self, entity: DynamicEntity) -> DynamicEntity {
        match &self.select {
            Some(names) => entity.project(names),
            None => entity,
        }
    }
}

/// Lazy iterator over query results.
///
/// Yields `Err(Cancelled)` once if its token is cancelled, and
/// `Err(TableNotFound)` if the table is deleted mid-iteration; it is fused
/// after any error.
pub struct QueryIter<'a> {
    table: &'a Table,
    query: TableQuery,
    page_size: usize,
    page: VecDeque<DynamicEntity>,
    continuation: Option<EntityKey>,
    has_more: bool,
    yielded: usize,
    finished: bool,
    cancel: Option<CancellationToken>,
}

impl<'a> QueryIter<'a> {
    pub(crate) fn new(table: &'a Table, query: TableQuery, page_size: usize) -> Self {
        Self {
            table,
            query,
            page_size,
            page: VecDeque::new(),
            continuation: None,
            has_more: true,
            yielded: 0,
            finished: false,
            cancel: None,
        }
    }

    /// Attach a token checked before every yielded entity
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Start over from the first matching entity, observing current state
    pub fn restart(&mut self) {
        self.page.clear();
        self.continuation = None;
        self.has_more = true;
        self.yielded = 0;
        self.finished = false;
    }

    /// Last key of the current page; the next page starts at the
    /// partition after this key's partition
    pub fn continuation(&self) -> Option<&EntityKey> {
        self.continuation.as_ref()
    }

    pub fn query(&self) -> &TableQuery {
        &self.query
    }

    fn fail(&mut self, err: TableError) -> Option<Result<DynamicEntity>> {
        self.finished = true;
        self.page.clear();
        Some(Err(err))
    }

    fn fill_page(&mut self) -> Result<()> {
        let after = self.continuation.as_ref().map(EntityKey::partition_key);
        let (entities, more) = self.table.read_page(&self.query, after, self.page_size)?;

        if let Some(last) = entities.last() {
            self.continuation = Some(last.key().clone());
        }
        self.has_more = more;
        self.page.extend(entities);
        Ok(())
    }
}

impl Iterator for QueryIter<'_> {
    type Item = Result<DynamicEntity>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if let Some(token) = &self.cancel {
            if let Err(err) = token.check() {
                return self.fail(err);
            }
        }

        if matches!(self.query.take, Some(limit) if self.yielded >= limit) {
            self.finished = true;
            return None;
        }

        if self.page.is_empty() && self.has_more {
            if let Err(err) = self.fill_page() {
                return self.fail(err);
            }
        }

        match self.page.pop_front() {
            Some(entity) => {
                self.yielded += 1;
                Some(Ok(self.query.shape(entity)))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}
