//! Entity Module
//!
//! The data model stored in a table.
//!
//! ## Model
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ DynamicEntity                                             │
//! │ ┌─────────────────────────────┐ ┌───────────────────────┐ │
//! │ │ EntityKey (immutable)       │ │ System fields         │ │
//! │ │  PartitionKey │ RowKey      │ │  ETag │ Timestamp     │ │
//! │ └─────────────────────────────┘ └───────────────────────┘ │
//! │ ┌───────────────────────────────────────────────────────┐ │
//! │ │ Properties: name → EdmValue                           │ │
//! │ └───────────────────────────────────────────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys compare ordinally (byte-wise), PartitionKey first, then RowKey.

mod dynamic;
mod value;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use dynamic::{DynamicEntity, Properties, TableEntity, RESERVED_PROPERTIES};
pub use value::{EdmType, EdmValue};

/// Property name carrying the partition key in a flat property bag
pub const PARTITION_KEY: &str = "PartitionKey";
/// Property name carrying the row key in a flat property bag
pub const ROW_KEY: &str = "RowKey";
/// System property set by the store on every write
pub const TIMESTAMP: &str = "Timestamp";
/// System property holding the version token
pub const ETAG: &str = "ETag";

/// Composite identity of an entity within a table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    partition_key: String,
    row_key: String,
}

impl EntityKey {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn row_key(&self) -> &str {
        &self.row_key
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.partition_key, self.row_key)
    }
}

/// Opaque version token; only ever compared for equality
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ETag(String);

impl ETag {
    /// Build the token for a table-wide version number
    pub(crate) fn from_version(version: u64) -> Self {
        ETag(format!("W/\"{:016x}\"", version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ETag {
    fn from(value: String) -> Self {
        ETag(value)
    }
}

impl From<&str> for ETag {
    fn from(value: &str) -> Self {
        ETag(value.to_string())
    }
}
