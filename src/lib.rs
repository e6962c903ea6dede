//! # TableKV
//!
//! An in-process partitioned table store with:
//! - Entities keyed by (PartitionKey, RowKey) with typed property bags
//! - ETag-based optimistic concurrency for updates and deletes
//! - Atomic all-or-nothing batches within a single partition
//! - Lazy, paged range queries and property projection
//! - Checksummed snapshots for persistence between runs
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TableCatalog                           │
//! │                 (name → Arc<Table>)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Table                               │
//! │        (RwLock<PartitionKey → Partition>)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Partition  │          │  Partition  │
//!   │  (RwLock)   │   ...    │  (RwLock)   │
//!   └─────────────┘          └─────────────┘
//!    RowKey → DynamicEntity
//! ```
//!
//! ## Example
//!
//! ```
//! use tablekv::{DynamicEntity, TableCatalog};
//!
//! let catalog = TableCatalog::default();
//! let people = catalog.create_if_not_exists("people");
//!
//! let walter = DynamicEntity::new("Harp", "Walter")
//!     .with_property("Email", "Walter@contoso.com");
//! people.insert(walter).unwrap();
//!
//! let found = people.retrieve("Harp", "Walter").unwrap();
//! assert_eq!(found.string_property("Email"), Some("Walter@contoso.com"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod cancel;
pub mod entity;
pub mod table;
pub mod catalog;
pub mod snapshot;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{TableError, Result};
pub use config::Config;
pub use cancel::CancellationToken;
pub use entity::{DynamicEntity, EdmValue, ETag, EntityKey, TableEntity};
pub use table::{Table, TableBatchOperation, TableOperation, TableQuery, TableResult};
pub use catalog::TableCatalog;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TableKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
