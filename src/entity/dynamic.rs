//! Dynamic entities and the typed-entity bridge

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};

use super::{EdmValue, ETag, EntityKey, ETAG, PARTITION_KEY, ROW_KEY, TIMESTAMP};

/// Property bag: name → typed value, iterated in name order
pub type Properties = BTreeMap<String, EdmValue>;

/// Names that belong to the store and may not appear as user properties
pub const RESERVED_PROPERTIES: [&str; 4] = [PARTITION_KEY, ROW_KEY, TIMESTAMP, ETAG];

/// An entity: immutable key, system fields, and a mutable property bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicEntity {
    key: EntityKey,
    properties: Properties,
    etag: Option<ETag>,
    timestamp: Option<DateTime<Utc>>,
}

impl DynamicEntity {
    /// Create an entity with no properties
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self::with_key(EntityKey::new(partition_key, row_key))
    }

    pub fn with_key(key: EntityKey) -> Self {
        Self {
            key,
            properties: Properties::new(),
            etag: None,
            timestamp: None,
        }
    }

    /// Build an entity from a flat property bag that carries its own keys.
    ///
    /// `PartitionKey` and `RowKey` must be present as strings. `ETag` and
    /// `Timestamp` are store-owned and are dropped if supplied.
    pub fn from_properties(mut properties: Properties) -> Result<Self> {
        let partition_key = take_key(&mut properties, PARTITION_KEY)?;
        let row_key = take_key(&mut properties, ROW_KEY)?;
        properties.remove(ETAG);
        properties.remove(TIMESTAMP);

        let entity = Self {
            key: EntityKey::new(partition_key, row_key),
            properties,
            etag: None,
            timestamp: None,
        };
        entity.validate()?;
        Ok(entity)
    }

    /// Builder-style property setter
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<EdmValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Set a property, returning the previous value
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<EdmValue>) -> Option<EdmValue> {
        self.properties.insert(name.into(), value.into())
    }

    pub fn remove_property(&mut self, name: &str) -> Option<EdmValue> {
        self.properties.remove(name)
    }

    pub fn property(&self, name: &str) -> Option<&EdmValue> {
        self.properties.get(name)
    }

    /// Shorthand for a string-typed property
    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(EdmValue::as_str)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn into_properties(self) -> Properties {
        self.properties
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn partition_key(&self) -> &str {
        self.key.partition_key()
    }

    pub fn row_key(&self) -> &str {
        self.key.row_key()
    }

    /// Version token assigned by the last successful write (None before storing)
    pub fn etag(&self) -> Option<&ETag> {
        self.etag.as_ref()
    }

    /// Time of the last successful write (None before storing)
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Reject property names the store cannot accept
    pub fn validate(&self) -> Result<()> {
        for name in self.properties.keys() {
            if name.is_empty() {
                return Err(TableError::Validation(format!(
                    "entity {} has a property with an empty name",
                    self.key
                )));
            }
            if RESERVED_PROPERTIES.contains(&name.as_str()) {
                return Err(TableError::Validation(format!(
                    "entity {} uses reserved property name '{}'",
                    self.key, name
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Store-side helpers
    // =========================================================================

    pub(crate) fn stamp(&mut self, etag: ETag, timestamp: DateTime<Utc>) {
        self.etag = Some(etag);
        self.timestamp = Some(timestamp);
    }

    /// Overlay `other`'s properties on top of ours
    pub(crate) fn merge_from(&mut self, other: &DynamicEntity) {
        for (name, value) in &other.properties {
            self.properties.insert(name.clone(), value.clone());
        }
    }

    /// Copy keeping the system fields and only the named properties
    pub(crate) fn project(&self, names: &[String]) -> DynamicEntity {
        let properties = names
            .iter()
            .filter_map(|name| {
                self.properties
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();

        DynamicEntity {
            key: self.key.clone(),
            properties,
            etag: self.etag.clone(),
            timestamp: self.timestamp,
        }
    }
}

fn take_key(properties: &mut Properties, name: &str) -> Result<String> {
    match properties.remove(name) {
        Some(EdmValue::String(value)) => Ok(value),
        Some(other) => Err(TableError::Validation(format!(
            "{} must be {}, got {}",
            name,
            super::EdmType::String.name(),
            other.edm_type().name()
        ))),
        None => Err(TableError::Validation(format!("missing required property {}", name))),
    }
}

// =============================================================================
// Typed Entities
// =============================================================================

/// A caller-defined record that can be stored as a `DynamicEntity`.
///
/// ```
/// use tablekv::entity::{DynamicEntity, EntityKey, Properties, TableEntity};
/// use tablekv::Result;
///
/// struct Tag { group: String, name: String, weight: i64 }
///
/// impl TableEntity for Tag {
///     fn key(&self) -> EntityKey {
///         EntityKey::new(self.group.clone(), self.name.clone())
///     }
///
///     fn to_properties(&self) -> Properties {
///         let mut props = Properties::new();
///         props.insert("Weight".to_string(), self.weight.into());
///         props
///     }
///
///     fn from_entity(entity: &DynamicEntity) -> Result<Self> {
///         Ok(Tag {
///             group: entity.partition_key().to_string(),
///             name: entity.row_key().to_string(),
///             weight: entity.property("Weight").and_then(|v| v.as_i64()).unwrap_or_default(),
///         })
///     }
/// }
///
/// let tag = Tag { group: "colors".into(), name: "red".into(), weight: 3 };
/// let round_trip = Tag::from_entity(&tag.to_entity()).unwrap();
/// assert_eq!(round_trip.weight, 3);
/// ```
pub trait TableEntity: Sized {
    fn key(&self) -> EntityKey;

    fn to_properties(&self) -> Properties;

    fn from_entity(entity: &DynamicEntity) -> Result<Self>;

    fn to_entity(&self) -> DynamicEntity {
        let mut entity = DynamicEntity::with_key(self.key());
        entity.properties = self.to_properties();
        entity
    }
}
