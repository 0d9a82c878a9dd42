//! Batch write protocol (spec.md §4.4, §4.6 `writeBatch`).
//!
//! A `BatchUpdate` bundles any combination of preallocation, object
//! creation, new versions, new tags, config-entry writes, and config
//! tombstones into a single all-or-nothing unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConfigDetails, ConfigEntry, Definition, Header, ObjectType};
use crate::tag_update::TagUpdate;

/// Reserves `(object_id, object_type)` without making it visible to readers
/// (spec.md §3.3 "preallocate + save").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preallocate {
    pub object_id: Uuid,
    pub object_type: ObjectType,
}

/// First save against either a fresh ID or one reserved via [`Preallocate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateObject {
    /// `None` for a direct create (ID generated by the store); `Some` when
    /// saving against a previously preallocated ID.
    pub object_id: Option<Uuid>,
    pub object_type: ObjectType,
    pub definition: Definition,
    pub tag_updates: Vec<TagUpdate>,
    /// Effective time for the new version/tag=1 pair. Assigned by the
    /// service layer (wall clock, dependency-injected per spec.md §9), not
    /// by the caller of the public RPC surface.
    pub object_timestamp: DateTime<Utc>,
    pub tag_timestamp: DateTime<Utc>,
}

/// Appends a new version (and its first tag) to an existing object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVersion {
    pub object_id: Uuid,
    pub object_type: ObjectType,
    pub definition: Definition,
    pub tag_updates: Vec<TagUpdate>,
    pub object_timestamp: DateTime<Utc>,
    pub tag_timestamp: DateTime<Utc>,
}

/// Appends a new tag to an existing object version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTag {
    pub object_id: Uuid,
    pub object_type: ObjectType,
    pub object_version: i32,
    pub tag_updates: Vec<TagUpdate>,
    pub tag_timestamp: DateTime<Utc>,
}

/// A config-entry directory write: create, update, or implicit
/// tombstone-clearing create (spec.md §4.6 "Config Entry CRUD").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntryWrite {
    pub config_class: String,
    pub config_key: String,
    pub details: ConfigDetails,
}

/// Tombstones the latest live entry for a directory key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigTombstone {
    pub config_class: String,
    pub config_key: String,
}

/// One atomic bundle of heterogeneous writes (spec.md §4.4 `saveBatchUpdate`,
/// §5 "a batch write is atomic end-to-end").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchUpdate {
    pub preallocate: Vec<Preallocate>,
    pub create_objects: Vec<CreateObject>,
    pub new_versions: Vec<NewVersion>,
    pub new_tags: Vec<NewTag>,
    pub config_entries: Vec<ConfigEntryWrite>,
    pub tombstones: Vec<ConfigTombstone>,
}

impl BatchUpdate {
    pub fn is_empty(&self) -> bool {
        self.preallocate.is_empty()
            && self.create_objects.is_empty()
            && self.new_versions.is_empty()
            && self.new_tags.is_empty()
            && self.config_entries.is_empty()
            && self.tombstones.is_empty()
    }

    /// Total number of rows this batch would touch, across every kind of
    /// write it bundles. Used to enforce `StorageConfig::max_batch_items`.
    pub fn item_count(&self) -> usize {
        self.preallocate.len()
            + self.create_objects.len()
            + self.new_versions.len()
            + self.new_tags.len()
            + self.config_entries.len()
            + self.tombstones.len()
    }
}

/// Headers and config entries produced by a committed [`BatchUpdate`], in
/// the same order as the corresponding input vectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchUpdateResult {
    pub created_objects: Vec<Header>,
    pub new_versions: Vec<Header>,
    pub new_tags: Vec<Header>,
    pub config_entries: Vec<ConfigEntry>,
}
