//! Config Entry directory (spec.md §3.1 "Config Entry", §3.2 invariant 8,
//! §4.6 "Config Entry CRUD"): a mutable, versioned lookup keyed by
//! `(tenant, config_class, config_key)` that points at an immutable
//! underlying object version. Entries never overwrite; every create,
//! update, or delete appends a new `config_entry` row and flips the
//! previous latest row's `is_latest_config`, the same latest-pointer
//! discipline `latest.rs` applies to objects and tags.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use store_core::{
    ConfigDetails, ConfigEntry, ConfigEntryWrite, ConfigTombstone, ObjectType, StoreError, TagSelector, VersionCriteria,
};

use crate::error::{storage_error_from_diesel, PostgresError};
use crate::latest::flip_previous_config_latest;
use crate::orm::{ConfigEntryRow, DbObjectType, NewConfigEntryRow};
use crate::schema::config_entry;

/// A config entry's `object_selector` must pin an explicit `(object_version,
/// tag_version)` pair — the directory points at an immutable version, not a
/// moving target (spec.md §3.1: "points to an immutable underlying object
/// version"). `latest`/`as-of` selectors are rejected as `InvalidRequest`.
fn explicit_versions(selector: &TagSelector) -> Result<(i32, i32), PostgresError> {
    let object_version = match selector.object_criteria {
        VersionCriteria::Explicit(v) => v,
        _ => {
            return Err(PostgresError(StoreError::InvalidRequest(
                "config entry object_selector must use an explicit object_version".to_string(),
            )))
        }
    };
    let tag_version = match selector.tag_criteria {
        VersionCriteria::Explicit(v) => v,
        _ => {
            return Err(PostgresError(StoreError::InvalidRequest(
                "config entry object_selector must use an explicit tag_version".to_string(),
            )))
        }
    };
    Ok((object_version, tag_version))
}

fn row_to_entry(row: ConfigEntryRow) -> ConfigEntry {
    let details = match (row.selector_object_id, row.selector_object_type, row.selector_object_version, row.selector_tag_version) {
        (Some(object_id), Some(object_type), Some(object_version), Some(tag_version)) => Some(ConfigDetails {
            object_selector: TagSelector {
                object_type: object_type.into(),
                object_id,
                object_criteria: VersionCriteria::Explicit(object_version),
                tag_criteria: VersionCriteria::Explicit(tag_version),
            },
            object_type: object_type.into(),
            resource_sub_type: row.resource_sub_type,
        }),
        _ => None,
    };
    ConfigEntry {
        config_class: row.config_class,
        config_key: row.config_key,
        config_version: row.config_version,
        config_timestamp: row.config_timestamp,
        is_latest_config: row.is_latest_config,
        config_deleted: row.config_deleted,
        details,
    }
}

async fn find_latest(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    config_class: &str,
    config_key: &str,
) -> Result<Option<ConfigEntryRow>, PostgresError> {
    let row = config_entry::table
        .filter(config_entry::tenant_id.eq(tenant_row_id))
        .filter(config_entry::config_class.eq(config_class))
        .filter(config_entry::config_key.eq(config_key))
        .filter(config_entry::is_latest_config.eq(true))
        .select(ConfigEntryRow::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(row)
}

fn new_row(
    tenant_row_id: i64,
    item: &ConfigEntryWrite,
    config_version: i32,
    config_deleted: bool,
) -> Result<NewConfigEntryRow, PostgresError> {
    let (object_version, tag_version) = explicit_versions(&item.details.object_selector)?;
    Ok(NewConfigEntryRow {
        tenant_id: tenant_row_id,
        config_class: item.config_class.clone(),
        config_key: item.config_key.clone(),
        config_version,
        config_timestamp: Utc::now(),
        is_latest_config: true,
        config_deleted,
        selector_object_id: Some(item.details.object_selector.object_id),
        selector_object_type: Some(item.details.object_type.into()),
        selector_object_version: Some(object_version),
        selector_tag_version: Some(tag_version),
        resource_sub_type: item.details.resource_sub_type.clone(),
    })
}

async fn insert_and_flip(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    config_class: &str,
    config_key: &str,
    row: NewConfigEntryRow,
) -> Result<ConfigEntry, PostgresError> {
    let new_version = row.config_version;
    let inserted: ConfigEntryRow = diesel::insert_into(config_entry::table)
        .values(row)
        .returning(ConfigEntryRow::as_select())
        .get_result(conn)
        .await
        .map_err(|e| storage_error_from_diesel(e, "config_entry", &format!("{config_class}/{config_key}/{new_version}")))?;
    flip_previous_config_latest(conn, tenant_row_id, config_class, config_key, inserted.id).await?;
    Ok(row_to_entry(inserted))
}

/// `createConfigObject` (spec.md §4.6): allowed against an absent key or one
/// whose latest entry is a tombstone (bumps `config_version`, clears
/// `config_deleted`); fails `Duplicate` against a live key.
pub(crate) async fn save_config_entry(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    item: &ConfigEntryWrite,
) -> Result<ConfigEntry, PostgresError> {
    let next_version = match find_latest(conn, tenant_row_id, &item.config_class, &item.config_key).await? {
        None => 1,
        Some(latest) if latest.config_deleted => latest.config_version + 1,
        Some(_) => {
            return Err(PostgresError(StoreError::Duplicate(format!(
                "config entry {}/{} already has a live version",
                item.config_class, item.config_key
            ))))
        }
    };
    let row = new_row(tenant_row_id, item, next_version, false)?;
    insert_and_flip(conn, tenant_row_id, &item.config_class, &item.config_key, row).await
}

/// `updateConfigObject` (spec.md §4.6): requires a live prior entry,
/// `NotFound` otherwise; bumps `config_version` and replaces `details`.
pub(crate) async fn update_config_entry(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    item: &ConfigEntryWrite,
) -> Result<ConfigEntry, PostgresError> {
    let latest = find_latest(conn, tenant_row_id, &item.config_class, &item.config_key)
        .await?
        .filter(|latest| !latest.config_deleted)
        .ok_or_else(|| PostgresError(StoreError::not_found("config_entry", format!("{}/{}", item.config_class, item.config_key))))?;
    let row = new_row(tenant_row_id, item, latest.config_version + 1, false)?;
    insert_and_flip(conn, tenant_row_id, &item.config_class, &item.config_key, row).await
}

/// `deleteConfigObject` (spec.md §4.6): requires a live prior entry,
/// `NotFound` otherwise; appends a tombstoning version carrying forward the
/// prior version's `details` (the entry's history, not the pointed-at
/// object, is what gets deleted).
pub(crate) async fn tombstone_config_entry(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    item: &ConfigTombstone,
) -> Result<(), PostgresError> {
    let latest = find_latest(conn, tenant_row_id, &item.config_class, &item.config_key)
        .await?
        .filter(|latest| !latest.config_deleted)
        .ok_or_else(|| PostgresError(StoreError::not_found("config_entry", format!("{}/{}", item.config_class, item.config_key))))?;

    let new_version = latest.config_version + 1;
    let row = NewConfigEntryRow {
        tenant_id: tenant_row_id,
        config_class: item.config_class.clone(),
        config_key: item.config_key.clone(),
        config_version: new_version,
        config_timestamp: Utc::now(),
        is_latest_config: true,
        config_deleted: true,
        selector_object_id: latest.selector_object_id,
        selector_object_type: latest.selector_object_type,
        selector_object_version: latest.selector_object_version,
        selector_tag_version: latest.selector_tag_version,
        resource_sub_type: latest.resource_sub_type.clone(),
    };
    insert_and_flip(conn, tenant_row_id, &item.config_class, &item.config_key, row).await?;
    Ok(())
}

/// `readConfigObject` (spec.md §4.6): the latest entry for the key,
/// deleted or not — callers inspect `config_deleted` themselves.
pub(crate) async fn read_config_entry(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    config_class: &str,
    config_key: &str,
) -> Result<ConfigEntry, PostgresError> {
    let row = find_latest(conn, tenant_row_id, config_class, config_key)
        .await?
        .ok_or_else(|| PostgresError(StoreError::not_found("config_entry", format!("{config_class}/{config_key}"))))?;
    Ok(row_to_entry(row))
}

/// `readConfigBatch` (spec.md §4.6): preserves input order, failing the
/// whole batch on the first missing key.
pub(crate) async fn read_config_batch(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    keys: &[(String, String)],
) -> Result<Vec<ConfigEntry>, PostgresError> {
    let mut out = Vec::with_capacity(keys.len());
    for (config_class, config_key) in keys {
        out.push(read_config_entry(conn, tenant_row_id, config_class, config_key).await?);
    }
    Ok(out)
}

/// `listConfigEntries(configClass, includeDeleted, objectType?, resourceSubType?)`
/// (spec.md §4.6).
pub(crate) async fn list_config_entries(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    config_class: &str,
    include_deleted: bool,
    object_type: Option<ObjectType>,
    resource_sub_type: Option<&str>,
) -> Result<Vec<ConfigEntry>, PostgresError> {
    let mut query = config_entry::table
        .filter(config_entry::tenant_id.eq(tenant_row_id))
        .filter(config_entry::config_class.eq(config_class))
        .filter(config_entry::is_latest_config.eq(true))
        .into_boxed();

    if !include_deleted {
        query = query.filter(config_entry::config_deleted.eq(false));
    }
    if let Some(object_type) = object_type {
        let db_type: DbObjectType = object_type.into();
        query = query.filter(config_entry::selector_object_type.eq(db_type));
    }
    if let Some(resource_sub_type) = resource_sub_type {
        query = query.filter(config_entry::resource_sub_type.eq(resource_sub_type));
    }

    let rows: Vec<ConfigEntryRow> = query
        .select(ConfigEntryRow::as_select())
        .order(config_entry::config_key.asc())
        .load(conn)
        .await?;
    Ok(rows.into_iter().map(row_to_entry).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use diesel_async::AsyncConnection;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use crate::db_fixtures;

    async fn setup_db() -> AsyncPgConnection {
        let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for testing");
        let mut conn = AsyncPgConnection::establish(&db_url).await.expect("failed to connect");
        conn.begin_test_transaction().await.expect("failed to open test transaction");
        conn
    }

    fn write(config_class: &str, config_key: &str, object_id: Uuid, object_version: i32, tag_version: i32) -> ConfigEntryWrite {
        ConfigEntryWrite {
            config_class: config_class.to_string(),
            config_key: config_key.to_string(),
            details: ConfigDetails {
                object_selector: TagSelector {
                    object_type: ObjectType::Data,
                    object_id,
                    object_criteria: VersionCriteria::Explicit(object_version),
                    tag_criteria: VersionCriteria::Explicit(tag_version),
                },
                object_type: ObjectType::Data,
                resource_sub_type: None,
            },
        }
    }

    async fn seed_object_version(conn: &mut AsyncPgConnection, tenant_id: i64) -> Uuid {
        let object_id = Uuid::new_v4();
        let object_row_id = db_fixtures::insert_object(conn, tenant_id, object_id, crate::orm::DbObjectType::Data).await;
        db_fixtures::insert_object_version(conn, object_row_id, 1, Utc::now(), "json", b"v1", true).await;
        object_id
    }

    #[tokio::test]
    async fn create_against_absent_key_starts_at_version_one() {
        let mut conn = setup_db().await;
        let tenant_id = db_fixtures::insert_tenant(&mut conn, "ACME").await;
        let object_id = seed_object_version(&mut conn, tenant_id).await;

        let entry = save_config_entry(&mut conn, tenant_id, &write("schema", "k1", object_id, 1, 1))
            .await
            .unwrap();
        assert_eq!(entry.config_version, 1);
        assert!(!entry.config_deleted);
    }

    #[tokio::test]
    async fn create_against_live_key_is_duplicate() {
        let mut conn = setup_db().await;
        let tenant_id = db_fixtures::insert_tenant(&mut conn, "ACME").await;
        let object_id = seed_object_version(&mut conn, tenant_id).await;

        save_config_entry(&mut conn, tenant_id, &write("schema", "k1", object_id, 1, 1)).await.unwrap();
        let err = save_config_entry(&mut conn, tenant_id, &write("schema", "k1", object_id, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err.0, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn update_of_absent_key_is_not_found() {
        let mut conn = setup_db().await;
        let tenant_id = db_fixtures::insert_tenant(&mut conn, "ACME").await;
        let object_id = seed_object_version(&mut conn, tenant_id).await;

        let err = update_config_entry(&mut conn, tenant_id, &write("schema", "missing", object_id, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err.0, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_then_create_bumps_version_and_clears_tombstone() {
        let mut conn = setup_db().await;
        let tenant_id = db_fixtures::insert_tenant(&mut conn, "ACME").await;
        let object_id = seed_object_version(&mut conn, tenant_id).await;

        save_config_entry(&mut conn, tenant_id, &write("schema", "k1", object_id, 1, 1)).await.unwrap();
        tombstone_config_entry(
            &mut conn,
            tenant_id,
            &ConfigTombstone { config_class: "schema".to_string(), config_key: "k1".to_string() },
        )
        .await
        .unwrap();

        let deleted = read_config_entry(&mut conn, tenant_id, "schema", "k1").await.unwrap();
        assert_eq!(deleted.config_version, 2);
        assert!(deleted.config_deleted);

        let err = tombstone_config_entry(
            &mut conn,
            tenant_id,
            &ConfigTombstone { config_class: "schema".to_string(), config_key: "k1".to_string() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err.0, StoreError::NotFound(_)));

        let recreated = save_config_entry(&mut conn, tenant_id, &write("schema", "k1", object_id, 1, 1))
            .await
            .unwrap();
        assert_eq!(recreated.config_version, 3);
        assert!(!recreated.config_deleted);
    }

    #[tokio::test]
    async fn list_config_entries_excludes_deleted_by_default() {
        let mut conn = setup_db().await;
        let tenant_id = db_fixtures::insert_tenant(&mut conn, "ACME").await;
        let object_id = seed_object_version(&mut conn, tenant_id).await;

        save_config_entry(&mut conn, tenant_id, &write("schema", "k1", object_id, 1, 1)).await.unwrap();
        save_config_entry(&mut conn, tenant_id, &write("schema", "k2", object_id, 1, 1)).await.unwrap();
        tombstone_config_entry(
            &mut conn,
            tenant_id,
            &ConfigTombstone { config_class: "schema".to_string(), config_key: "k2".to_string() },
        )
        .await
        .unwrap();

        let live = list_config_entries(&mut conn, tenant_id, "schema", false, None, None).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].config_key, "k1");

        let all = list_config_entries(&mut conn, tenant_id, "schema", true, None, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
