//! General-purpose fixtures for database state modification.
//!
//! These write straight through `schema::` column expressions rather than
//! `gateway.rs`'s insert helpers, so a bug in the gateway under test can't
//! also break the fixtures that set its test data up.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::orm::{DbBasicType, DbObjectType};
use crate::schema;

pub async fn insert_tenant(conn: &mut AsyncPgConnection, tenant_code: &str) -> i64 {
    diesel::insert_into(schema::tenant::table)
        .values(schema::tenant::tenant_code.eq(tenant_code))
        .returning(schema::tenant::id)
        .get_result(conn)
        .await
        .unwrap()
}

pub async fn insert_object(conn: &mut AsyncPgConnection, tenant_id: i64, object_id: Uuid, object_type: DbObjectType) -> i64 {
    diesel::insert_into(schema::object::table)
        .values((
            schema::object::tenant_id.eq(tenant_id),
            schema::object::object_id.eq(object_id),
            schema::object::object_type.eq(object_type),
            schema::object::created_at.eq(Utc::now()),
        ))
        .returning(schema::object::id)
        .get_result(conn)
        .await
        .unwrap()
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_object_version(
    conn: &mut AsyncPgConnection,
    object_row_id: i64,
    object_version: i32,
    object_timestamp: DateTime<Utc>,
    definition_type: &str,
    definition_content: &[u8],
    is_latest_object: bool,
) -> i64 {
    diesel::insert_into(schema::object_version::table)
        .values((
            schema::object_version::object_row_id.eq(object_row_id),
            schema::object_version::object_version.eq(object_version),
            schema::object_version::object_timestamp.eq(object_timestamp),
            schema::object_version::definition_type.eq(definition_type),
            schema::object_version::definition_content.eq(definition_content),
            schema::object_version::is_latest_object.eq(is_latest_object),
        ))
        .returning(schema::object_version::id)
        .get_result(conn)
        .await
        .unwrap()
}

pub async fn insert_tag(
    conn: &mut AsyncPgConnection,
    object_version_row_id: i64,
    tag_version: i32,
    tag_timestamp: DateTime<Utc>,
    is_latest_tag: bool,
) -> i64 {
    diesel::insert_into(schema::tag::table)
        .values((
            schema::tag::object_version_row_id.eq(object_version_row_id),
            schema::tag::tag_version.eq(tag_version),
            schema::tag::tag_timestamp.eq(tag_timestamp),
            schema::tag::is_latest_tag.eq(is_latest_tag),
        ))
        .returning(schema::tag::id)
        .get_result(conn)
        .await
        .unwrap()
}

pub async fn insert_string_attr(conn: &mut AsyncPgConnection, tag_row_id: i64, name: &str, element_index: i32, value: &str) -> i64 {
    diesel::insert_into(schema::tag_attr::table)
        .values((
            schema::tag_attr::tag_row_id.eq(tag_row_id),
            schema::tag_attr::attr_name.eq(name),
            schema::tag_attr::element_index.eq(element_index),
            schema::tag_attr::element_type.eq(DbBasicType::String),
            schema::tag_attr::value_string.eq(value),
        ))
        .returning(schema::tag_attr::id)
        .get_result(conn)
        .await
        .unwrap()
}

pub async fn insert_integer_attr(conn: &mut AsyncPgConnection, tag_row_id: i64, name: &str, element_index: i32, value: i64) -> i64 {
    diesel::insert_into(schema::tag_attr::table)
        .values((
            schema::tag_attr::tag_row_id.eq(tag_row_id),
            schema::tag_attr::attr_name.eq(name),
            schema::tag_attr::element_index.eq(element_index),
            schema::tag_attr::element_type.eq(DbBasicType::Integer),
            schema::tag_attr::value_integer.eq(value),
        ))
        .returning(schema::tag_attr::id)
        .get_result(conn)
        .await
        .unwrap()
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_config_entry(
    conn: &mut AsyncPgConnection,
    tenant_id: i64,
    config_class: &str,
    config_key: &str,
    config_version: i32,
    config_timestamp: DateTime<Utc>,
    is_latest_config: bool,
    config_deleted: bool,
    selector_object_id: Option<Uuid>,
    selector_object_type: Option<DbObjectType>,
    selector_object_version: Option<i32>,
    selector_tag_version: Option<i32>,
) -> i64 {
    diesel::insert_into(schema::config_entry::table)
        .values((
            schema::config_entry::tenant_id.eq(tenant_id),
            schema::config_entry::config_class.eq(config_class),
            schema::config_entry::config_key.eq(config_key),
            schema::config_entry::config_version.eq(config_version),
            schema::config_entry::config_timestamp.eq(config_timestamp),
            schema::config_entry::is_latest_config.eq(is_latest_config),
            schema::config_entry::config_deleted.eq(config_deleted),
            schema::config_entry::selector_object_id.eq(selector_object_id),
            schema::config_entry::selector_object_type.eq(selector_object_type),
            schema::config_entry::selector_object_version.eq(selector_object_version),
            schema::config_entry::selector_tag_version.eq(selector_tag_version),
        ))
        .returning(schema::config_entry::id)
        .get_result(conn)
        .await
        .unwrap()
}
