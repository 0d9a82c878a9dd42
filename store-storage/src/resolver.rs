//! Selector Resolver (spec.md §4.3): translates a [`TagSelector`] into a
//! concrete `(object_row_id, version_row_id, tag_row_id)` triple plus the
//! [`Header`] projection.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use store_core::{Header, ObjectType, StoreError, StoreResult, TagSelector, VersionCriteria};

use crate::orm::DbObjectType;
use crate::schema::{object, object_version, tag};

pub struct ResolvedTag {
    pub object_row_id: i64,
    pub version_row_id: i64,
    pub tag_row_id: i64,
    pub header: Header,
}

/// Resolves a single selector against the given tenant. Mirrors spec.md
/// §4.3's four-step algorithm exactly.
pub(crate) async fn resolve(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    selector: &TagSelector,
) -> StoreResult<ResolvedTag> {
    let (object_row_id, stored_type): (i64, DbObjectType) = object::table
        .filter(object::tenant_id.eq(tenant_row_id))
        .filter(object::object_id.eq(selector.object_id))
        .select((object::id, object::object_type))
        .first(conn)
        .await
        .map_err(|_| StoreError::not_found("object", selector.object_id))?;

    let version_row = resolve_object_version(conn, object_row_id, selector.object_criteria).await?;
    let tag_row = resolve_tag_version(conn, version_row.0, selector.tag_criteria).await?;

    let stored_type: ObjectType = stored_type.into();
    if stored_type != selector.object_type {
        return Err(StoreError::WrongType(format!(
            "object {} has type {} but selector requested {}",
            selector.object_id, stored_type, selector.object_type
        )));
    }

    Ok(ResolvedTag {
        object_row_id,
        version_row_id: version_row.0,
        tag_row_id: tag_row.0,
        header: Header {
            object_type: stored_type,
            object_id: selector.object_id,
            object_version: version_row.1,
            object_timestamp: version_row.2,
            tag_version: tag_row.1,
            tag_timestamp: tag_row.2,
            is_latest_object: version_row.3,
            is_latest_tag: tag_row.3,
        },
    })
}

/// Returns `(version_row_id, object_version, object_timestamp, is_latest_object)`.
async fn resolve_object_version(
    conn: &mut AsyncPgConnection,
    object_row_id: i64,
    criteria: VersionCriteria,
) -> StoreResult<(i64, i32, chrono::DateTime<chrono::Utc>, bool)> {
    use object_version::dsl;

    let base = dsl::object_version.filter(dsl::object_row_id.eq(object_row_id));

    let row: (i64, i32, chrono::DateTime<chrono::Utc>, bool) = match criteria {
        VersionCriteria::Explicit(v) => base
            .filter(dsl::object_version.eq(v))
            .select((dsl::id, dsl::object_version, dsl::object_timestamp, dsl::is_latest_object))
            .first(conn)
            .await
            .map_err(|_| StoreError::not_found("object_version", v))?,
        VersionCriteria::AsOf(t) => base
            .filter(dsl::object_timestamp.le(t))
            .order(dsl::object_timestamp.desc())
            .select((dsl::id, dsl::object_version, dsl::object_timestamp, dsl::is_latest_object))
            .first(conn)
            .await
            .map_err(|_| StoreError::not_found("object_version as-of", t))?,
        VersionCriteria::Latest => base
            .filter(dsl::is_latest_object.eq(true))
            .select((dsl::id, dsl::object_version, dsl::object_timestamp, dsl::is_latest_object))
            .first(conn)
            .await
            .map_err(|_| StoreError::Unexpected("no latest object_version row present".to_string()))?,
    };
    Ok(row)
}

/// Returns `(tag_row_id, tag_version, tag_timestamp, is_latest_tag)`.
async fn resolve_tag_version(
    conn: &mut AsyncPgConnection,
    version_row_id: i64,
    criteria: VersionCriteria,
) -> StoreResult<(i64, i32, chrono::DateTime<chrono::Utc>, bool)> {
    use tag::dsl;

    let base = dsl::tag.filter(dsl::object_version_row_id.eq(version_row_id));

    let row: (i64, i32, chrono::DateTime<chrono::Utc>, bool) = match criteria {
        VersionCriteria::Explicit(v) => base
            .filter(dsl::tag_version.eq(v))
            .select((dsl::id, dsl::tag_version, dsl::tag_timestamp, dsl::is_latest_tag))
            .first(conn)
            .await
            .map_err(|_| StoreError::not_found("tag", v))?,
        VersionCriteria::AsOf(t) => base
            .filter(dsl::tag_timestamp.le(t))
            .order(dsl::tag_timestamp.desc())
            .select((dsl::id, dsl::tag_version, dsl::tag_timestamp, dsl::is_latest_tag))
            .first(conn)
            .await
            .map_err(|_| StoreError::not_found("tag as-of", t))?,
        VersionCriteria::Latest => base
            .filter(dsl::is_latest_tag.eq(true))
            .select((dsl::id, dsl::tag_version, dsl::tag_timestamp, dsl::is_latest_tag))
            .first(conn)
            .await
            .map_err(|_| StoreError::Unexpected("no latest tag row present".to_string()))?,
    };
    Ok(row)
}

/// Resolves a batch of selectors, preserving input order. On any element
/// error, the whole batch fails with that error (spec.md §4.3).
pub(crate) async fn resolve_batch(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    selectors: &[TagSelector],
) -> StoreResult<Vec<ResolvedTag>> {
    let mut out = Vec::with_capacity(selectors.len());
    for selector in selectors {
        out.push(resolve(conn, tenant_row_id, selector).await?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use diesel_async::AsyncConnection;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use crate::db_fixtures;
    use crate::orm::DbObjectType;

    async fn setup_db() -> AsyncPgConnection {
        let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for testing");
        let mut conn = AsyncPgConnection::establish(&db_url).await.expect("failed to connect");
        conn.begin_test_transaction().await.expect("failed to open test transaction");
        conn
    }

    /// Seeds `tenant/object/object_version(x2)/tag(x3)` mirroring spec.md §8
    /// scenario 2: V1 at t1, V2 at t2, then a second tag on V1 at t3.
    async fn seed_object(conn: &mut AsyncPgConnection) -> (i64, Uuid, chrono::DateTime<Utc>, chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
        let tenant_id = db_fixtures::insert_tenant(conn, "ACME").await;
        let object_id = Uuid::new_v4();
        let object_row_id = db_fixtures::insert_object(conn, tenant_id, object_id, DbObjectType::Data).await;

        let t1 = Utc::now() - Duration::hours(2);
        let t2 = Utc::now() - Duration::hours(1);
        let t3 = Utc::now();

        let v1_row = db_fixtures::insert_object_version(conn, object_row_id, 1, t1, "json", b"v1", false).await;
        db_fixtures::insert_tag(conn, v1_row, 1, t1, false).await;
        let v2_row = db_fixtures::insert_object_version(conn, object_row_id, 2, t2, "json", b"v2", true).await;
        db_fixtures::insert_tag(conn, v2_row, 1, t2, true).await;
        // V1's tag 2, created after V2 exists, is still latest for V1 (spec.md §8 scenario 2).
        db_fixtures::insert_tag(conn, v1_row, 2, t3, true).await;

        (tenant_id, object_id, t1, t2, t3)
    }

    #[tokio::test]
    async fn latest_object_and_latest_tag_resolves_to_v2_t1() {
        let mut conn = setup_db().await;
        let (tenant_id, object_id, _, t2, _) = seed_object(&mut conn).await;

        let selector = TagSelector::latest(ObjectType::Data, object_id);
        let resolved = resolve(&mut conn, tenant_id, &selector).await.unwrap();

        assert_eq!(resolved.header.object_version, 2);
        assert_eq!(resolved.header.tag_version, 1);
        assert_eq!(resolved.header.object_timestamp, t2);
    }

    #[tokio::test]
    async fn explicit_version_one_resolves_to_its_own_latest_tag() {
        let mut conn = setup_db().await;
        let (tenant_id, object_id, _, _, t3) = seed_object(&mut conn).await;

        let selector = TagSelector {
            object_type: ObjectType::Data,
            object_id,
            object_criteria: VersionCriteria::Explicit(1),
            tag_criteria: VersionCriteria::Latest,
        };
        let resolved = resolve(&mut conn, tenant_id, &selector).await.unwrap();

        assert_eq!(resolved.header.object_version, 1);
        assert_eq!(resolved.header.tag_version, 2);
        assert_eq!(resolved.header.tag_timestamp, t3);
    }

    #[tokio::test]
    async fn as_of_between_v1_and_v2_resolves_to_v1() {
        let mut conn = setup_db().await;
        let (tenant_id, object_id, t1, t2, _) = seed_object(&mut conn).await;

        let as_of = t1 + (t2 - t1) / 2;
        let selector = TagSelector {
            object_type: ObjectType::Data,
            object_id,
            object_criteria: VersionCriteria::AsOf(as_of),
            tag_criteria: VersionCriteria::Latest,
        };
        let resolved = resolve(&mut conn, tenant_id, &selector).await.unwrap();
        assert_eq!(resolved.header.object_version, 1);
    }

    #[tokio::test]
    async fn as_of_before_earliest_version_is_not_found() {
        let mut conn = setup_db().await;
        let (tenant_id, object_id, t1, _, _) = seed_object(&mut conn).await;

        let selector = TagSelector {
            object_type: ObjectType::Data,
            object_id,
            object_criteria: VersionCriteria::AsOf(t1 - Duration::milliseconds(1)),
            tag_criteria: VersionCriteria::Latest,
        };
        let err = resolve(&mut conn, tenant_id, &selector).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn wrong_type_selector_is_rejected() {
        let mut conn = setup_db().await;
        let (tenant_id, object_id, ..) = seed_object(&mut conn).await;

        let selector = TagSelector::latest(ObjectType::Model, object_id);
        let err = resolve(&mut conn, tenant_id, &selector).await.unwrap_err();
        assert!(matches!(err, StoreError::WrongType(_)));
    }

    #[tokio::test]
    async fn batch_resolution_preserves_order_and_fails_whole_batch_on_first_error() {
        let mut conn = setup_db().await;
        let (tenant_id, object_id, ..) = seed_object(&mut conn).await;

        let good = TagSelector::latest(ObjectType::Data, object_id);
        let missing = TagSelector::explicit(ObjectType::Data, object_id, 99, 1);

        let err = resolve_batch(&mut conn, tenant_id, &[good, missing]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
