//! Metadata Store / DAL core (spec.md §4.4): `saveNewObject`,
//! `saveNewVersion`, `saveNewTag`, `preallocateObjectId`/`savePreallocated`,
//! `loadObject`/`loadObjects`/`loadTag(s)`, `search`, and `saveBatchUpdate`.
//!
//! Every multi-statement write runs inside a single diesel-async
//! transaction: a connection reference threads through common-purpose CRUD
//! helpers with an explicit transaction boundary, since the invariants in
//! spec.md §3.2/§5 require atomicity across every row a single write
//! touches.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{pooled_connection::deadpool::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::debug;
use uuid::Uuid;

use store_core::{
    AttributeMap, BatchUpdate, BatchUpdateResult, ConfigEntry, ConfigEntryWrite, ConfigTombstone, Definition, Header,
    ObjectType, SearchParameters, StoreError, StoreResult, Tag, TagSelector,
};

use crate::attrs::{attr_map_to_rows, rows_to_attr_map};
use crate::cache::TenantCache;
use crate::config;
use crate::error::{storage_error_from_diesel, PostgresError};
use crate::latest::{flip_previous_object_latest, flip_previous_tag_latest};
use crate::orm::{DbObjectType, NewObject, NewObjectVersion, NewTag as NewTagRow, NewTenant, ObjectVersion, TagAttr};
use crate::resolver::{resolve, resolve_batch, ResolvedTag};
use crate::schema::{object, object_version, tag, tag_attr, tenant};
use crate::search::execute_search;

/// Connection-pool-backed entry point for every DAL operation. One instance
/// is shared across the process; tenant lookups are cached (spec.md §5
/// "in-process caches must be per-tenant-keyed").
pub struct MetadataGateway {
    pool: Pool<AsyncPgConnection>,
    tenants: TenantCache,
    max_batch_items: usize,
}

impl MetadataGateway {
    pub fn new(pool: Pool<AsyncPgConnection>) -> Self {
        MetadataGateway { pool, tenants: TenantCache::new(), max_batch_items: crate::pool::StorageConfig::DEFAULT_MAX_BATCH_ITEMS }
    }

    /// Overrides the `writeBatch` item bound a [`StorageConfig`] would
    /// otherwise set (`StorageConfig::max_batch_items`).
    pub fn with_max_batch_items(mut self, max_batch_items: usize) -> Self {
        self.max_batch_items = max_batch_items;
        self
    }

    async fn connection(&self) -> StoreResult<diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>> {
        self.pool.get().await.map_err(|e| StoreError::Unexpected(format!("failed to acquire connection: {e}")))
    }

    async fn tenant_id(&self, tenant_code: &str) -> StoreResult<i64> {
        self.tenants.resolve(tenant_code, &self.pool).await
    }

    /// Registers a tenant row if one does not already exist. Tenant
    /// provisioning itself is an admin concern out of scope (spec.md §1);
    /// this exists so callers (and tests) that already hold a tenant code
    /// don't need a separate out-of-band bootstrap path.
    pub async fn ensure_tenant(&self, tenant_code: &str) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let row_id: i64 = diesel::insert_into(tenant::table)
            .values(NewTenant { tenant_code })
            .on_conflict(tenant::tenant_code)
            .do_update()
            .set(tenant::tenant_code.eq(tenant::tenant_code))
            .returning(tenant::id)
            .get_result(&mut conn)
            .await
            .map_err(|e| storage_error_from_diesel(e, "tenant", tenant_code))?;
        self.tenants.insert(tenant_code, row_id);
        Ok(())
    }

    /// Reserves `(object_id, object_type)` without making it visible to
    /// readers (spec.md §3.3 "preallocate + save").
    pub async fn preallocate_object_id(&self, tenant_code: &str, object_id: Uuid, object_type: ObjectType) -> StoreResult<()> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        diesel::insert_into(object::table)
            .values(NewObject { tenant_id: tenant_row_id, object_id, object_type: object_type.into(), created_at: Utc::now() })
            .execute(&mut conn)
            .await
            .map_err(|e| storage_error_from_diesel(e, "object", &object_id.to_string()))?;
        Ok(())
    }

    /// `saveNewObject` (spec.md §4.4): direct create of a fresh ID, or
    /// `savePreallocated` against one already reserved, depending on
    /// whether an `object` row exists for `object_id`.
    pub async fn save_new_object(
        &self,
        tenant_code: &str,
        object_id: Option<Uuid>,
        object_type: ObjectType,
        definition: Definition,
        object_timestamp: DateTime<Utc>,
        tag_timestamp: DateTime<Utc>,
        attrs: AttributeMap,
    ) -> StoreResult<Header> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        let result = conn
            .transaction::<Header, PostgresError, _>(|conn| {
                async move {
                    let object_row_id = match object_id {
                        Some(id) => lookup_preallocated(conn, tenant_row_id, id, object_type).await?,
                        None => {
                            let id = Uuid::new_v4();
                            diesel::insert_into(object::table)
                                .values(NewObject {
                                    tenant_id: tenant_row_id,
                                    object_id: id,
                                    object_type: object_type.into(),
                                    created_at: object_timestamp,
                                })
                                .returning((object::id, object::object_id))
                                .get_result::<(i64, Uuid)>(conn)
                                .await
                                .map_err(|e| storage_error_from_diesel(e, "object", &id.to_string()))?
                                .0
                        }
                    };
                    insert_first_version(conn, object_row_id, object_id.unwrap_or_default(), object_type, definition, object_timestamp, tag_timestamp, attrs)
                        .await
                }
                .scope_boxed()
            })
            .await;
        match result {
            Ok(header) => Ok(header),
            Err(e) => Err(e.into()),
        }
    }

    /// `saveNewVersion` (spec.md §4.4): appends `object_version = current +
    /// 1` with its own tag=1, flipping the prior version's
    /// `is_latest_object` in the same transaction.
    pub async fn save_new_version(
        &self,
        tenant_code: &str,
        object_id: Uuid,
        object_type: ObjectType,
        definition: Definition,
        object_timestamp: DateTime<Utc>,
        tag_timestamp: DateTime<Utc>,
        attrs: AttributeMap,
    ) -> StoreResult<Header> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        conn.transaction::<Header, PostgresError, _>(|conn| {
            async move {
                let (object_row_id, stored_type): (i64, DbObjectType) = object::table
                    .filter(object::tenant_id.eq(tenant_row_id))
                    .filter(object::object_id.eq(object_id))
                    .select((object::id, object::object_type))
                    .first(conn)
                    .await
                    .map_err(|_| PostgresError(StoreError::not_found("object", object_id)))?;
                if ObjectType::from(stored_type) != object_type {
                    return Err(PostgresError(StoreError::WrongType(format!(
                        "object {object_id} has type {} but request specified {object_type}",
                        ObjectType::from(stored_type)
                    ))));
                }

                let latest: Option<(i64, i32, DateTime<Utc>)> = object_version::table
                    .filter(object_version::object_row_id.eq(object_row_id))
                    .filter(object_version::is_latest_object.eq(true))
                    .select((object_version::id, object_version::object_version, object_version::object_timestamp))
                    .first(conn)
                    .await
                    .optional()?;
                let (prev_row_id, prev_version, prev_ts) = latest
                    .ok_or_else(|| PostgresError(StoreError::not_found("object_version", object_id)))?;
                if object_timestamp < prev_ts {
                    return Err(PostgresError(StoreError::InvalidRequest(format!(
                        "object_timestamp {object_timestamp} precedes predecessor timestamp {prev_ts}"
                    ))));
                }

                let new_version = prev_version + 1;
                let new_version_row_id: i64 = diesel::insert_into(object_version::table)
                    .values(NewObjectVersion {
                        object_row_id,
                        object_version: new_version,
                        object_timestamp,
                        definition_type: definition.definition_type.clone(),
                        definition_content: definition.content.clone(),
                        is_latest_object: true,
                    })
                    .returning(object_version::id)
                    .get_result(conn)
                    .await
                    .map_err(|e| storage_error_from_diesel(e, "object_version", &new_version.to_string()))?;
                flip_previous_object_latest(conn, object_row_id, new_version_row_id).await?;
                debug!(%object_id, new_version, "flipped is_latest_object to the new version");

                let tag_row_id: i64 = diesel::insert_into(tag::table)
                    .values(NewTagRow { object_version_row_id: new_version_row_id, tag_version: 1, tag_timestamp, is_latest_tag: true })
                    .returning(tag::id)
                    .get_result(conn)
                    .await
                    .map_err(|e| storage_error_from_diesel(e, "tag", "1"))?;
                insert_attrs(conn, tag_row_id, &attrs).await?;

                let _ = prev_row_id;
                Ok(Header {
                    object_type,
                    object_id,
                    object_version: new_version,
                    object_timestamp,
                    tag_version: 1,
                    tag_timestamp,
                    is_latest_object: true,
                    is_latest_tag: true,
                })
            }
            .scope_boxed()
        })
        .await
        .map_err(StoreError::from)
    }

    /// `saveNewTag` (spec.md §4.4): appends a new tag to an existing
    /// `(object_id, object_version)`, which need not be the object's latest
    /// version (scenario 2 in spec.md §8 tags an earlier version directly).
    pub async fn save_new_tag(
        &self,
        tenant_code: &str,
        object_id: Uuid,
        object_type: ObjectType,
        object_version_no: i32,
        tag_timestamp: DateTime<Utc>,
        attrs: AttributeMap,
    ) -> StoreResult<Header> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        conn.transaction::<Header, PostgresError, _>(|conn| {
            async move {
                let (object_row_id, stored_type): (i64, DbObjectType) = object::table
                    .filter(object::tenant_id.eq(tenant_row_id))
                    .filter(object::object_id.eq(object_id))
                    .select((object::id, object::object_type))
                    .first(conn)
                    .await
                    .map_err(|_| PostgresError(StoreError::not_found("object", object_id)))?;
                if ObjectType::from(stored_type) != object_type {
                    return Err(PostgresError(StoreError::WrongType(format!(
                        "object {object_id} has type {} but request specified {object_type}",
                        ObjectType::from(stored_type)
                    ))));
                }

                let version_row_id: i64 = object_version::table
                    .filter(object_version::object_row_id.eq(object_row_id))
                    .filter(object_version::object_version.eq(object_version_no))
                    .select(object_version::id)
                    .first(conn)
                    .await
                    .map_err(|_| PostgresError(StoreError::not_found("object_version", object_version_no)))?;

                let latest_tag: Option<(i64, i32, DateTime<Utc>)> = tag::table
                    .filter(tag::object_version_row_id.eq(version_row_id))
                    .filter(tag::is_latest_tag.eq(true))
                    .select((tag::id, tag::tag_version, tag::tag_timestamp))
                    .first(conn)
                    .await
                    .optional()?;
                let (_, prev_tag_version, prev_ts) =
                    latest_tag.ok_or_else(|| PostgresError(StoreError::Unexpected("object_version has no tags".to_string())))?;
                if tag_timestamp < prev_ts {
                    return Err(PostgresError(StoreError::InvalidRequest(format!(
                        "tag_timestamp {tag_timestamp} precedes predecessor timestamp {prev_ts}"
                    ))));
                }

                let new_tag_version = prev_tag_version + 1;
                let tag_row_id: i64 = diesel::insert_into(tag::table)
                    .values(NewTagRow { object_version_row_id: version_row_id, tag_version: new_tag_version, tag_timestamp, is_latest_tag: true })
                    .returning(tag::id)
                    .get_result(conn)
                    .await
                    .map_err(|e| storage_error_from_diesel(e, "tag", &new_tag_version.to_string()))?;
                flip_previous_tag_latest(conn, version_row_id, tag_row_id).await?;
                insert_attrs(conn, tag_row_id, &attrs).await?;

                let object_timestamp: DateTime<Utc> = object_version::table
                    .find(version_row_id)
                    .select(object_version::object_timestamp)
                    .first(conn)
                    .await?;

                Ok(Header {
                    object_type,
                    object_id,
                    object_version: object_version_no,
                    object_timestamp,
                    tag_version: new_tag_version,
                    tag_timestamp,
                    is_latest_object: is_latest_object_version(conn, version_row_id).await?,
                    is_latest_tag: true,
                })
            }
            .scope_boxed()
        })
        .await
        .map_err(StoreError::from)
    }

    /// `loadObject`/`loadTag` (spec.md §4.4): resolves `selector` and
    /// returns the full tag.
    pub async fn load_tag(&self, tenant_code: &str, selector: &TagSelector) -> StoreResult<Tag> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        let resolved = resolve(&mut conn, tenant_row_id, selector).await?;
        materialize_tag(&mut conn, resolved).await
    }

    /// `loadObjects`/`loadTags` (spec.md §4.4): resolves every selector in
    /// order, failing the whole batch on the first element error.
    pub async fn load_tags(&self, tenant_code: &str, selectors: &[TagSelector]) -> StoreResult<Vec<Tag>> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        let resolved = resolve_batch(&mut conn, tenant_row_id, selectors).await?;
        let mut out = Vec::with_capacity(resolved.len());
        for r in resolved {
            out.push(materialize_tag(&mut conn, r).await?);
        }
        Ok(out)
    }

    /// `search` (spec.md §4.5), delegated to the search planner/executor.
    pub async fn search(&self, tenant_code: &str, params: &SearchParameters) -> StoreResult<Vec<Tag>> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        execute_search(&mut conn, tenant_row_id, params).await
    }

    /// `saveBatchUpdate` (spec.md §4.4, §4.6 `writeBatch`): executes every
    /// contained write in one transaction. Tag-update application against
    /// inherited state happens here (not in the service layer) so the read
    /// of that state shares the write's transactional snapshot.
    pub async fn save_batch_update(&self, tenant_code: &str, batch: &BatchUpdate) -> StoreResult<BatchUpdateResult> {
        if batch.item_count() > self.max_batch_items {
            return Err(StoreError::InvalidRequest(format!(
                "writeBatch touches {} rows, exceeding the {} row limit",
                batch.item_count(),
                self.max_batch_items
            )));
        }
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        conn.transaction::<BatchUpdateResult, PostgresError, _>(|conn| {
            async move {
                let mut result = BatchUpdateResult::default();

                for item in &batch.preallocate {
                    diesel::insert_into(object::table)
                        .values(NewObject {
                            tenant_id: tenant_row_id,
                            object_id: item.object_id,
                            object_type: item.object_type.into(),
                            created_at: Utc::now(),
                        })
                        .execute(conn)
                        .await
                        .map_err(|e| storage_error_from_diesel(e, "object", &item.object_id.to_string()))?;
                }

                for item in &batch.create_objects {
                    let attrs = store_core::apply_tag_update(&AttributeMap::new(), &item.tag_updates)?;
                    let object_row_id = match item.object_id {
                        Some(id) => lookup_preallocated(conn, tenant_row_id, id, item.object_type).await?,
                        None => {
                            let id = Uuid::new_v4();
                            diesel::insert_into(object::table)
                                .values(NewObject {
                                    tenant_id: tenant_row_id,
                                    object_id: id,
                                    object_type: item.object_type.into(),
                                    created_at: item.object_timestamp,
                                })
                                .returning(object::id)
                                .get_result::<i64>(conn)
                                .await
                                .map_err(|e| storage_error_from_diesel(e, "object", &id.to_string()))?
                        }
                    };
                    let header = insert_first_version(
                        conn,
                        object_row_id,
                        item.object_id.unwrap_or_default(),
                        item.object_type,
                        item.definition.clone(),
                        item.object_timestamp,
                        item.tag_timestamp,
                        attrs,
                    )
                    .await?;
                    result.created_objects.push(header);
                }

                for item in &batch.new_versions {
                    let (object_row_id, stored_type): (i64, DbObjectType) = object::table
                        .filter(object::tenant_id.eq(tenant_row_id))
                        .filter(object::object_id.eq(item.object_id))
                        .select((object::id, object::object_type))
                        .first(conn)
                        .await
                        .map_err(|_| PostgresError(StoreError::not_found("object", item.object_id)))?;
                    if ObjectType::from(stored_type) != item.object_type {
                        return Err(PostgresError(StoreError::WrongType(format!(
                            "object {} has type {} but request specified {}",
                            item.object_id,
                            ObjectType::from(stored_type),
                            item.object_type
                        ))));
                    }
                    let latest: (i64, i32) = object_version::table
                        .filter(object_version::object_row_id.eq(object_row_id))
                        .filter(object_version::is_latest_object.eq(true))
                        .select((object_version::id, object_version::object_version))
                        .first(conn)
                        .await
                        .map_err(|_| PostgresError(StoreError::not_found("object_version", item.object_id)))?;
                    let prior_attrs = load_latest_tag_attrs(conn, latest.0).await?;
                    let attrs = store_core::apply_tag_update(&prior_attrs, &item.tag_updates)?;

                    let new_version = latest.1 + 1;
                    let new_version_row_id: i64 = diesel::insert_into(object_version::table)
                        .values(NewObjectVersion {
                            object_row_id,
                            object_version: new_version,
                            object_timestamp: item.object_timestamp,
                            definition_type: item.definition.definition_type.clone(),
                            definition_content: item.definition.content.clone(),
                            is_latest_object: true,
                        })
                        .returning(object_version::id)
                        .get_result(conn)
                        .await
                        .map_err(|e| storage_error_from_diesel(e, "object_version", &new_version.to_string()))?;
                    flip_previous_object_latest(conn, object_row_id, new_version_row_id).await?;

                    let tag_row_id: i64 = diesel::insert_into(tag::table)
                        .values(NewTagRow { object_version_row_id: new_version_row_id, tag_version: 1, tag_timestamp: item.tag_timestamp, is_latest_tag: true })
                        .returning(tag::id)
                        .get_result(conn)
                        .await
                        .map_err(|e| storage_error_from_diesel(e, "tag", "1"))?;
                    insert_attrs(conn, tag_row_id, &attrs).await?;

                    result.new_versions.push(Header {
                        object_type: item.object_type,
                        object_id: item.object_id,
                        object_version: new_version,
                        object_timestamp: item.object_timestamp,
                        tag_version: 1,
                        tag_timestamp: item.tag_timestamp,
                        is_latest_object: true,
                        is_latest_tag: true,
                    });
                }

                for item in &batch.new_tags {
                    let (object_row_id, stored_type): (i64, DbObjectType) = object::table
                        .filter(object::tenant_id.eq(tenant_row_id))
                        .filter(object::object_id.eq(item.object_id))
                        .select((object::id, object::object_type))
                        .first(conn)
                        .await
                        .map_err(|_| PostgresError(StoreError::not_found("object", item.object_id)))?;
                    if ObjectType::from(stored_type) != item.object_type {
                        return Err(PostgresError(StoreError::WrongType(format!(
                            "object {} has type {} but request specified {}",
                            item.object_id,
                            ObjectType::from(stored_type),
                            item.object_type
                        ))));
                    }
                    let version_row_id: i64 = object_version::table
                        .filter(object_version::object_row_id.eq(object_row_id))
                        .filter(object_version::object_version.eq(item.object_version))
                        .select(object_version::id)
                        .first(conn)
                        .await
                        .map_err(|_| PostgresError(StoreError::not_found("object_version", item.object_version)))?;
                    let (prev_tag_row_id, prev_tag_version): (i64, i32) = tag::table
                        .filter(tag::object_version_row_id.eq(version_row_id))
                        .filter(tag::is_latest_tag.eq(true))
                        .select((tag::id, tag::tag_version))
                        .first(conn)
                        .await
                        .map_err(|_| PostgresError(StoreError::Unexpected("object_version has no tags".to_string())))?;
                    let prior_rows: Vec<TagAttr> = tag_attr::table
                        .filter(tag_attr::tag_row_id.eq(prev_tag_row_id))
                        .select(TagAttr::as_select())
                        .load(conn)
                        .await?;
                    let prior_attrs = rows_to_attr_map(prior_rows)?;
                    let attrs = store_core::apply_tag_update(&prior_attrs, &item.tag_updates)?;

                    let new_tag_version = prev_tag_version + 1;
                    let tag_row_id: i64 = diesel::insert_into(tag::table)
                        .values(NewTagRow { object_version_row_id: version_row_id, tag_version: new_tag_version, tag_timestamp: item.tag_timestamp, is_latest_tag: true })
                        .returning(tag::id)
                        .get_result(conn)
                        .await
                        .map_err(|e| storage_error_from_diesel(e, "tag", &new_tag_version.to_string()))?;
                    flip_previous_tag_latest(conn, version_row_id, tag_row_id).await?;
                    insert_attrs(conn, tag_row_id, &attrs).await?;

                    let object_timestamp: DateTime<Utc> =
                        object_version::table.find(version_row_id).select(object_version::object_timestamp).first(conn).await?;
                    result.new_tags.push(Header {
                        object_type: item.object_type,
                        object_id: item.object_id,
                        object_version: item.object_version,
                        object_timestamp,
                        tag_version: new_tag_version,
                        tag_timestamp: item.tag_timestamp,
                        is_latest_object: is_latest_object_version(conn, version_row_id).await?,
                        is_latest_tag: true,
                    });
                }

                for item in &batch.config_entries {
                    result.config_entries.push(config::save_config_entry(conn, tenant_row_id, item).await?);
                }
                for item in &batch.tombstones {
                    config::tombstone_config_entry(conn, tenant_row_id, item).await?;
                }

                Ok(result)
            }
            .scope_boxed()
        })
        .await
        .map_err(StoreError::from)
    }

    /// `createConfigObject` (spec.md §4.6), run as its own transaction for
    /// callers that write a single entry outside `writeBatch`.
    pub async fn create_config_entry(&self, tenant_code: &str, item: &ConfigEntryWrite) -> StoreResult<ConfigEntry> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        conn.transaction::<ConfigEntry, PostgresError, _>(|conn| {
            async move { config::save_config_entry(conn, tenant_row_id, item).await }.scope_boxed()
        })
        .await
        .map_err(StoreError::from)
    }

    /// `updateConfigObject` (spec.md §4.6), run as its own transaction
    /// outside `saveBatchUpdate` since the batch protocol only bundles
    /// creates and tombstones.
    pub async fn update_config_entry(&self, tenant_code: &str, item: &ConfigEntryWrite) -> StoreResult<ConfigEntry> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        conn.transaction::<ConfigEntry, PostgresError, _>(|conn| {
            async move { config::update_config_entry(conn, tenant_row_id, item).await }.scope_boxed()
        })
        .await
        .map_err(StoreError::from)
    }

    /// `deleteConfigObject` (spec.md §4.6), run as its own transaction.
    pub async fn delete_config_entry(&self, tenant_code: &str, item: &ConfigTombstone) -> StoreResult<()> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        conn.transaction::<(), PostgresError, _>(|conn| {
            async move { config::tombstone_config_entry(conn, tenant_row_id, item).await }.scope_boxed()
        })
        .await
        .map_err(StoreError::from)
    }

    /// `readConfigObject` (spec.md §4.6).
    pub async fn read_config_entry(&self, tenant_code: &str, config_class: &str, config_key: &str) -> StoreResult<ConfigEntry> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        config::read_config_entry(&mut conn, tenant_row_id, config_class, config_key).await.map_err(StoreError::from)
    }

    /// `readConfigBatch` (spec.md §4.6).
    pub async fn read_config_batch(&self, tenant_code: &str, keys: &[(String, String)]) -> StoreResult<Vec<ConfigEntry>> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        config::read_config_batch(&mut conn, tenant_row_id, keys).await.map_err(StoreError::from)
    }

    /// `listConfigEntries(configClass, includeDeleted, objectType?, resourceSubType?)`
    /// (spec.md §4.6).
    pub async fn list_config_entries(
        &self,
        tenant_code: &str,
        config_class: &str,
        include_deleted: bool,
        object_type: Option<ObjectType>,
        resource_sub_type: Option<&str>,
    ) -> StoreResult<Vec<ConfigEntry>> {
        let tenant_row_id = self.tenant_id(tenant_code).await?;
        let mut conn = self.connection().await?;
        config::list_config_entries(&mut conn, tenant_row_id, config_class, include_deleted, object_type, resource_sub_type)
            .await
            .map_err(StoreError::from)
    }
}

async fn lookup_preallocated(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    object_id: Uuid,
    object_type: ObjectType,
) -> Result<i64, PostgresError> {
    let (object_row_id, stored_type): (i64, DbObjectType) = object::table
        .filter(object::tenant_id.eq(tenant_row_id))
        .filter(object::object_id.eq(object_id))
        .select((object::id, object::object_type))
        .first(conn)
        .await
        .map_err(|_| PostgresError(StoreError::not_found("object", object_id)))?;
    if ObjectType::from(stored_type) != object_type {
        return Err(PostgresError(StoreError::WrongType(format!(
            "preallocated object {object_id} has type {} but save specified {object_type}",
            ObjectType::from(stored_type)
        ))));
    }
    let existing_version: i64 = object_version::table
        .filter(object_version::object_row_id.eq(object_row_id))
        .count()
        .get_result(conn)
        .await?;
    if existing_version > 0 {
        return Err(PostgresError(StoreError::Duplicate(format!("object {object_id} already has a version 1"))));
    }
    Ok(object_row_id)
}

#[allow(clippy::too_many_arguments)]
async fn insert_first_version(
    conn: &mut AsyncPgConnection,
    object_row_id: i64,
    object_id: Uuid,
    object_type: ObjectType,
    definition: Definition,
    object_timestamp: DateTime<Utc>,
    tag_timestamp: DateTime<Utc>,
    attrs: AttributeMap,
) -> Result<Header, PostgresError> {
    let version_row_id: i64 = diesel::insert_into(object_version::table)
        .values(NewObjectVersion {
            object_row_id,
            object_version: 1,
            object_timestamp,
            definition_type: definition.definition_type,
            definition_content: definition.content,
            is_latest_object: true,
        })
        .returning(object_version::id)
        .get_result(conn)
        .await
        .map_err(|e| storage_error_from_diesel(e, "object_version", "1"))?;

    let tag_row_id: i64 = diesel::insert_into(tag::table)
        .values(NewTagRow { object_version_row_id: version_row_id, tag_version: 1, tag_timestamp, is_latest_tag: true })
        .returning(tag::id)
        .get_result(conn)
        .await
        .map_err(|e| storage_error_from_diesel(e, "tag", "1"))?;
    insert_attrs(conn, tag_row_id, &attrs).await?;

    let resolved_object_id = if object_id.is_nil() {
        object::table.find(object_row_id).select(object::object_id).first(conn).await?
    } else {
        object_id
    };

    Ok(Header {
        object_type,
        object_id: resolved_object_id,
        object_version: 1,
        object_timestamp,
        tag_version: 1,
        tag_timestamp,
        is_latest_object: true,
        is_latest_tag: true,
    })
}

async fn insert_attrs(conn: &mut AsyncPgConnection, tag_row_id: i64, attrs: &AttributeMap) -> Result<(), PostgresError> {
    let rows = attr_map_to_rows(tag_row_id, attrs);
    if rows.is_empty() {
        return Ok(());
    }
    diesel::insert_into(tag_attr::table).values(rows).execute(conn).await?;
    Ok(())
}

async fn load_latest_tag_attrs(conn: &mut AsyncPgConnection, version_row_id: i64) -> Result<AttributeMap, PostgresError> {
    let tag_row_id: i64 = tag::table
        .filter(tag::object_version_row_id.eq(version_row_id))
        .filter(tag::is_latest_tag.eq(true))
        .select(tag::id)
        .first(conn)
        .await
        .map_err(|_| PostgresError(StoreError::Unexpected("object_version has no tags".to_string())))?;
    let rows: Vec<TagAttr> = tag_attr::table.filter(tag_attr::tag_row_id.eq(tag_row_id)).select(TagAttr::as_select()).load(conn).await?;
    Ok(rows_to_attr_map(rows)?)
}

async fn is_latest_object_version(conn: &mut AsyncPgConnection, version_row_id: i64) -> Result<bool, PostgresError> {
    let is_latest: bool = object_version::table.find(version_row_id).select(object_version::is_latest_object).first(conn).await?;
    Ok(is_latest)
}

pub(crate) async fn materialize_tag(conn: &mut AsyncPgConnection, resolved: ResolvedTag) -> StoreResult<Tag> {
    let version_row: ObjectVersion = object_version::table.find(resolved.version_row_id).first(conn).await?;
    let attr_rows: Vec<TagAttr> = tag_attr::table
        .filter(tag_attr::tag_row_id.eq(resolved.tag_row_id))
        .select(TagAttr::as_select())
        .load(conn)
        .await?;
    let attrs = rows_to_attr_map(attr_rows)?;
    Ok(Tag {
        header: resolved.header,
        definition: Some(Definition { definition_type: version_row.definition_type, content: version_row.definition_content }),
        attrs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use store_core::{BatchUpdate, CreateObject, NewTag as NewTagItem, NewVersion, ScalarValue, TagUpdate, Value, VersionCriteria};

    use crate::testing::run_against_db;

    fn def(bytes: &[u8]) -> Definition {
        Definition { definition_type: "json".to_string(), content: bytes.to_vec() }
    }

    fn attrs_with_name(name: &str) -> AttributeMap {
        let mut map = AttributeMap::new();
        map.insert("name".to_string(), Value::scalar(ScalarValue::String(name.to_string())));
        map
    }

    /// A deadpool `Pool` doesn't dial the database until a connection is
    /// actually checked out, so this builds one against a URL that is never
    /// reachable — good enough for exercising the pre-transaction batch-size
    /// check, which must reject before `self.connection()` is ever called.
    fn unreachable_pool() -> Pool<AsyncPgConnection> {
        let manager = diesel_async::pooled_connection::AsyncDieselConnectionManager::<AsyncPgConnection>::new(
            "postgres://unreachable/unreachable",
        );
        Pool::builder(manager).build().expect("pool construction itself does not connect")
    }

    #[tokio::test]
    async fn batch_over_the_configured_limit_is_rejected_before_touching_a_connection() {
        let gw = MetadataGateway::new(unreachable_pool()).with_max_batch_items(1);
        let batch = BatchUpdate {
            preallocate: vec![
                store_core::Preallocate { object_id: Uuid::new_v4(), object_type: ObjectType::Data },
                store_core::Preallocate { object_id: Uuid::new_v4(), object_type: ObjectType::Data },
            ],
            create_objects: vec![],
            new_versions: vec![],
            new_tags: Vec::<NewTagItem>::new(),
            config_entries: vec![],
            tombstones: vec![],
        };

        let err = gw.save_batch_update("ACME", &batch).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }

    /// spec.md §8 scenario 1: save, then find it again via search.
    #[tokio::test]
    async fn save_new_object_round_trips_through_search() {
        run_against_db(|pool| async move {
            let gw = MetadataGateway::new(pool);
            gw.ensure_tenant("ACME").await.unwrap();

            let t0 = Utc::now();
            let header = gw
                .save_new_object(
                    "ACME",
                    None,
                    ObjectType::Data,
                    def(b"payload-v1"),
                    t0,
                    t0,
                    attrs_with_name("widget"),
                )
                .await
                .unwrap();
            assert_eq!(header.object_version, 1);
            assert_eq!(header.tag_version, 1);

            let found = gw
                .search(
                    "ACME",
                    &SearchParameters {
                        object_type: ObjectType::Data,
                        expression: store_core::SearchExpression::term(
                            "name",
                            store_core::BasicType::String,
                            store_core::Operator::Eq,
                            store_core::TermValue::Scalar(ScalarValue::String("widget".to_string())),
                        ),
                        search_as_of: None,
                        prior_versions: false,
                        prior_tags: false,
                    },
                )
                .await
                .unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].header.object_id, header.object_id);
        })
        .await;
    }

    /// spec.md §8 scenario 2: V1 (t1) -> V2 (t2) -> a second tag on V1 (t3).
    /// `latest` resolves to V2/tag1; explicit version 1 resolves to its own
    /// latest tag (tag 2), independent of V2's existence.
    #[tokio::test]
    async fn explicit_version_navigates_independently_of_latest_object() {
        run_against_db(|pool| async move {
            let gw = MetadataGateway::new(pool);
            gw.ensure_tenant("ACME").await.unwrap();

            let t1 = Utc::now();
            let header_v1 = gw
                .save_new_object("ACME", None, ObjectType::Data, def(b"v1"), t1, t1, AttributeMap::new())
                .await
                .unwrap();

            let t2 = t1 + Duration::seconds(1);
            let header_v2 = gw
                .save_new_version("ACME", header_v1.object_id, ObjectType::Data, def(b"v2"), t2, t2, AttributeMap::new())
                .await
                .unwrap();
            assert_eq!(header_v2.object_version, 2);

            let t3 = t2 + Duration::seconds(1);
            let retagged_v1 = gw
                .save_new_tag("ACME", header_v1.object_id, ObjectType::Data, 1, t3, attrs_with_name("re-tagged"))
                .await
                .unwrap();
            assert_eq!(retagged_v1.object_version, 1);
            assert_eq!(retagged_v1.tag_version, 2);

            let latest = gw
                .load_tag("ACME", &store_core::TagSelector::latest(ObjectType::Data, header_v1.object_id))
                .await
                .unwrap();
            assert_eq!(latest.header.object_version, 2);
            assert_eq!(latest.header.tag_version, 1);

            let explicit_v1 = gw
                .load_tag(
                    "ACME",
                    &store_core::TagSelector {
                        object_type: ObjectType::Data,
                        object_id: header_v1.object_id,
                        object_criteria: VersionCriteria::Explicit(1),
                        tag_criteria: VersionCriteria::Latest,
                    },
                )
                .await
                .unwrap();
            assert_eq!(explicit_v1.header.tag_version, 2);
            assert_eq!(explicit_v1.attrs.get("name"), attrs_with_name("re-tagged").get("name"));
        })
        .await;
    }

    /// spec.md §8 scenario 3: `as-of` just after V1 resolves to V1; `as-of`
    /// before the object's earliest version is `NotFound`.
    #[tokio::test]
    async fn as_of_resolution_picks_the_version_live_at_that_instant() {
        run_against_db(|pool| async move {
            let gw = MetadataGateway::new(pool);
            gw.ensure_tenant("ACME").await.unwrap();

            let t1 = Utc::now();
            let header_v1 = gw
                .save_new_object("ACME", None, ObjectType::Data, def(b"v1"), t1, t1, AttributeMap::new())
                .await
                .unwrap();
            let t2 = t1 + Duration::seconds(10);
            gw.save_new_version("ACME", header_v1.object_id, ObjectType::Data, def(b"v2"), t2, t2, AttributeMap::new())
                .await
                .unwrap();

            let as_of_just_after_t1 = store_core::TagSelector {
                object_type: ObjectType::Data,
                object_id: header_v1.object_id,
                object_criteria: VersionCriteria::AsOf(t1 + Duration::microseconds(500)),
                tag_criteria: VersionCriteria::Latest,
            };
            let resolved = gw.load_tag("ACME", &as_of_just_after_t1).await.unwrap();
            assert_eq!(resolved.header.object_version, 1);

            let as_of_before_creation = store_core::TagSelector {
                object_type: ObjectType::Data,
                object_id: header_v1.object_id,
                object_criteria: VersionCriteria::AsOf(t1 - Duration::milliseconds(1)),
                tag_criteria: VersionCriteria::Latest,
            };
            let err = gw.load_tag("ACME", &as_of_before_creation).await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
        })
        .await;
    }

    /// spec.md §8 scenario 6: a batch where the second item targets an
    /// object that was never saved must leave the first item's write rolled
    /// back, not partially committed.
    #[tokio::test]
    async fn batch_update_is_all_or_nothing() {
        run_against_db(|pool| async move {
            let gw = MetadataGateway::new(pool);
            gw.ensure_tenant("ACME").await.unwrap();

            let unsaved_object_id = Uuid::new_v4();
            let batch = BatchUpdate {
                preallocate: vec![],
                create_objects: vec![CreateObject {
                    object_id: None,
                    object_type: ObjectType::Data,
                    definition: def(b"batch-item"),
                    object_timestamp: Utc::now(),
                    tag_timestamp: Utc::now(),
                    tag_updates: vec![TagUpdate::create("name".to_string(), Value::scalar(ScalarValue::String("batched".to_string())))],
                }],
                new_versions: vec![NewVersion {
                    object_id: unsaved_object_id,
                    object_type: ObjectType::Data,
                    definition: def(b"no-such-object"),
                    object_timestamp: Utc::now(),
                    tag_timestamp: Utc::now(),
                    tag_updates: vec![],
                }],
                new_tags: Vec::<NewTagItem>::new(),
                config_entries: vec![],
                tombstones: vec![],
            };

            let err = gw.save_batch_update("ACME", &batch).await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));

            let found = gw
                .search(
                    "ACME",
                    &SearchParameters {
                        object_type: ObjectType::Data,
                        expression: store_core::SearchExpression::term(
                            "name",
                            store_core::BasicType::String,
                            store_core::Operator::Eq,
                            store_core::TermValue::Scalar(ScalarValue::String("batched".to_string())),
                        ),
                        search_as_of: None,
                        prior_versions: false,
                        prior_tags: false,
                    },
                )
                .await
                .unwrap();
            assert!(found.is_empty(), "the create_objects item must have been rolled back alongside the failing new_versions item");
        })
        .await;
    }
}

