//! Diesel ORM structs: one pair of `Db*` enum mirrors plus Queryable/
//! Insertable row structs per table, one `diesel_derive_enum` Postgres
//! enum per fixed closed-set column.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use uuid::Uuid;

use store_core::{BasicType, ObjectType};

use crate::schema::*;

#[derive(Debug, DbEnum, Clone, Copy, PartialEq, Eq)]
#[ExistingTypePath = "crate::schema::sql_types::ObjectTypeEnum"]
pub enum DbObjectType {
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

impl From<ObjectType> for DbObjectType {
    fn from(value: ObjectType) -> Self {
        match value {
            ObjectType::Data => Self::Data,
            ObjectType::Model => Self::Model,
            ObjectType::Flow => Self::Flow,
            ObjectType::Job => Self::Job,
            ObjectType::File => Self::File,
            ObjectType::Storage => Self::Storage,
            ObjectType::Schema => Self::Schema,
            ObjectType::Custom => Self::Custom,
            ObjectType::Config => Self::Config,
            ObjectType::Resource => Self::Resource,
        }
    }
}

impl From<DbObjectType> for ObjectType {
    fn from(value: DbObjectType) -> Self {
        match value {
            DbObjectType::Data => Self::Data,
            DbObjectType::Model => Self::Model,
            DbObjectType::Flow => Self::Flow,
            DbObjectType::Job => Self::Job,
            DbObjectType::File => Self::File,
            DbObjectType::Storage => Self::Storage,
            DbObjectType::Schema => Self::Schema,
            DbObjectType::Custom => Self::Custom,
            DbObjectType::Config => Self::Config,
            DbObjectType::Resource => Self::Resource,
        }
    }
}

#[derive(Debug, DbEnum, Clone, Copy, PartialEq, Eq)]
#[ExistingTypePath = "crate::schema::sql_types::BasicTypeEnum"]
pub enum DbBasicType {
    Boolean,
    Integer,
    Float,
    String,
    Decimal,
    Date,
    Datetime,
}

impl From<BasicType> for DbBasicType {
    fn from(value: BasicType) -> Self {
        match value {
            BasicType::Boolean => Self::Boolean,
            BasicType::Integer => Self::Integer,
            BasicType::Float => Self::Float,
            BasicType::String => Self::String,
            BasicType::Decimal => Self::Decimal,
            BasicType::Date => Self::Date,
            BasicType::Datetime => Self::Datetime,
        }
    }
}

impl From<DbBasicType> for BasicType {
    fn from(value: DbBasicType) -> Self {
        match value {
            DbBasicType::Boolean => Self::Boolean,
            DbBasicType::Integer => Self::Integer,
            DbBasicType::Float => Self::Float,
            DbBasicType::String => Self::String,
            DbBasicType::Decimal => Self::Decimal,
            DbBasicType::Date => Self::Date,
            DbBasicType::Datetime => Self::Datetime,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = tenant)]
pub struct Tenant {
    pub id: i64,
    pub tenant_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tenant)]
pub struct NewTenant<'a> {
    pub tenant_code: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Associations)]
#[diesel(table_name = object, belongs_to(Tenant))]
pub struct Object {
    pub id: i64,
    pub tenant_id: i64,
    pub object_id: Uuid,
    pub object_type: DbObjectType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = object)]
pub struct NewObject {
    pub tenant_id: i64,
    pub object_id: Uuid,
    pub object_type: DbObjectType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Associations)]
#[diesel(table_name = object_version, belongs_to(Object, foreign_key = object_row_id))]
pub struct ObjectVersion {
    pub id: i64,
    pub object_row_id: i64,
    pub object_version: i32,
    pub object_timestamp: DateTime<Utc>,
    pub definition_type: String,
    pub definition_content: Vec<u8>,
    pub is_latest_object: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = object_version)]
pub struct NewObjectVersion {
    pub object_row_id: i64,
    pub object_version: i32,
    pub object_timestamp: DateTime<Utc>,
    pub definition_type: String,
    pub definition_content: Vec<u8>,
    pub is_latest_object: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Associations)]
#[diesel(table_name = tag, belongs_to(ObjectVersion, foreign_key = object_version_row_id))]
pub struct Tag {
    pub id: i64,
    pub object_version_row_id: i64,
    pub tag_version: i32,
    pub tag_timestamp: DateTime<Utc>,
    pub is_latest_tag: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tag)]
pub struct NewTag {
    pub object_version_row_id: i64,
    pub tag_version: i32,
    pub tag_timestamp: DateTime<Utc>,
    pub is_latest_tag: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Associations)]
#[diesel(table_name = tag_attr, belongs_to(Tag, foreign_key = tag_row_id))]
pub struct TagAttr {
    pub id: i64,
    pub tag_row_id: i64,
    pub attr_name: String,
    pub element_index: i32,
    pub element_type: DbBasicType,
    pub value_boolean: Option<bool>,
    pub value_integer: Option<i64>,
    pub value_float: Option<f64>,
    pub value_string: Option<String>,
    pub value_decimal: Option<rust_decimal::Decimal>,
    pub value_date: Option<chrono::NaiveDate>,
    pub value_datetime: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tag_attr)]
pub struct NewTagAttr {
    pub tag_row_id: i64,
    pub attr_name: String,
    pub element_index: i32,
    pub element_type: DbBasicType,
    pub value_boolean: Option<bool>,
    pub value_integer: Option<i64>,
    pub value_float: Option<f64>,
    pub value_string: Option<String>,
    pub value_decimal: Option<rust_decimal::Decimal>,
    pub value_date: Option<chrono::NaiveDate>,
    pub value_datetime: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Associations)]
#[diesel(table_name = config_entry, belongs_to(Tenant))]
pub struct ConfigEntryRow {
    pub id: i64,
    pub tenant_id: i64,
    pub config_class: String,
    pub config_key: String,
    pub config_version: i32,
    pub config_timestamp: DateTime<Utc>,
    pub is_latest_config: bool,
    pub config_deleted: bool,
    pub selector_object_id: Option<Uuid>,
    pub selector_object_type: Option<DbObjectType>,
    pub selector_object_version: Option<i32>,
    pub selector_tag_version: Option<i32>,
    pub resource_sub_type: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = config_entry)]
pub struct NewConfigEntryRow {
    pub tenant_id: i64,
    pub config_class: String,
    pub config_key: String,
    pub config_version: i32,
    pub config_timestamp: DateTime<Utc>,
    pub is_latest_config: bool,
    pub config_deleted: bool,
    pub selector_object_id: Option<Uuid>,
    pub selector_object_type: Option<DbObjectType>,
    pub selector_object_version: Option<i32>,
    pub selector_tag_version: Option<i32>,
    pub resource_sub_type: Option<String>,
}
