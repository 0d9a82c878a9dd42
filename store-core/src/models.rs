//! Core domain types (spec.md §3): tenants, objects, versions, tags,
//! attributes, headers, and config-entry directory records.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::value::Value;

/// Fixed object-type enumeration (spec.md §3.1). Closed set, mirrored in
/// `store-storage` as a Postgres enum rather than a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ObjectType {
    Data,
    Model,
    Flow,
    Job,
    File,
    Storage,
    Schema,
    Custom,
    Config,
    Resource,
}

impl ObjectType {
    /// Object types creatable through the restricted public write surface
    /// (spec.md §6.1 "Public writes (restricted object types)").
    pub fn is_public_writable(self) -> bool {
        !matches!(self, ObjectType::Config | ObjectType::Resource)
    }
}

/// Opaque version payload: raw bytes plus a caller-defined type tag.
/// Domain-specific validation of the payload (schema/flow/model content)
/// is out of scope (spec.md §1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub definition_type: String,
    pub content: Vec<u8>,
}

/// An append-only attribute map keyed by attribute name.
///
/// Iteration order is not significant; `BTreeMap` is used for deterministic
/// equality comparisons in tests, not because ordering is part of the
/// contract.
pub type AttributeMap = BTreeMap<String, Value>;

/// Truncates a timestamp to microsecond precision, the grid every stored and
/// queried timestamp is compared on (spec.md §9 "Time resolution").
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// An object identity plus its fixed type, as established at creation
/// (spec.md §3.1 "Object").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub object_id: Uuid,
    pub object_type: ObjectType,
}

/// The header projection returned alongside every resolved tag
/// (spec.md §3.1 "Header").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub object_type: ObjectType,
    pub object_id: Uuid,
    pub object_version: i32,
    pub object_timestamp: DateTime<Utc>,
    pub tag_version: i32,
    pub tag_timestamp: DateTime<Utc>,
    pub is_latest_object: bool,
    pub is_latest_tag: bool,
}

/// A fully materialized tag: header, definition, and attribute map.
///
/// `definition` is `None` when returned from search (spec.md §4.5: "the
/// `definition` field is cleared").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub header: Header,
    pub definition: Option<Definition>,
    pub attrs: AttributeMap,
}

impl Tag {
    /// Returns a copy with `definition` cleared, as search results require.
    pub fn without_definition(&self) -> Tag {
        Tag { header: self.header.clone(), definition: None, attrs: self.attrs.clone() }
    }
}

/// One of the three ways a version or tag may be targeted
/// (spec.md §3.1 "Tag Selector"): explicit number, as-of time, or latest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VersionCriteria {
    Explicit(i32),
    AsOf(DateTime<Utc>),
    Latest,
}

/// A query over identity: object type/id plus independent criteria for the
/// object version and the tag version (spec.md §3.1 "Tag Selector").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagSelector {
    pub object_type: ObjectType,
    pub object_id: Uuid,
    pub object_criteria: VersionCriteria,
    pub tag_criteria: VersionCriteria,
}

impl TagSelector {
    pub fn latest(object_type: ObjectType, object_id: Uuid) -> Self {
        TagSelector {
            object_type,
            object_id,
            object_criteria: VersionCriteria::Latest,
            tag_criteria: VersionCriteria::Latest,
        }
    }

    pub fn explicit(object_type: ObjectType, object_id: Uuid, object_version: i32, tag_version: i32) -> Self {
        TagSelector {
            object_type,
            object_id,
            object_criteria: VersionCriteria::Explicit(object_version),
            tag_criteria: VersionCriteria::Explicit(tag_version),
        }
    }
}

/// The sub-type carried by a config entry's `details` (spec.md §3.1
/// "Config Entry"): which object this directory key currently points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDetails {
    pub object_selector: TagSelector,
    pub object_type: ObjectType,
    pub resource_sub_type: Option<String>,
}

/// A directory row in the config-entry keyspace
/// (spec.md §3.1 "Config Entry", §4.6 "Config Entry CRUD").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub config_class: String,
    pub config_key: String,
    pub config_version: i32,
    pub config_timestamp: DateTime<Utc>,
    pub is_latest_config: bool,
    pub config_deleted: bool,
    pub details: Option<ConfigDetails>,
}

/// Reserved attribute prefix (spec.md §3.2 invariant 7, §6.2).
pub const RESERVED_ATTR_PREFIX: &str = "trac_";

pub const ATTR_CREATE_TIME: &str = "trac_create_time";
pub const ATTR_CREATE_USER_ID: &str = "trac_create_user_id";
pub const ATTR_CREATE_USER_NAME: &str = "trac_create_user_name";
pub const ATTR_UPDATE_TIME: &str = "trac_update_time";
pub const ATTR_UPDATE_USER_ID: &str = "trac_update_user_id";
pub const ATTR_UPDATE_USER_NAME: &str = "trac_update_user_name";

pub fn is_reserved_attr_name(name: &str) -> bool {
    name.starts_with(RESERVED_ATTR_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_object_types_are_not_public_writable() {
        assert!(!ObjectType::Config.is_public_writable());
        assert!(!ObjectType::Resource.is_public_writable());
        assert!(ObjectType::Data.is_public_writable());
    }

    #[test]
    fn reserved_prefix_is_detected() {
        assert!(is_reserved_attr_name("trac_create_time"));
        assert!(!is_reserved_attr_name("dataset_class"));
    }
}
