//! Latest-pointer maintenance: flips a single `is_latest_*` boolean to
//! `false` for the previous holder before the new row takes over
//! (spec.md §3.2 invariant 5, §5 "the `is_latest_*` flag transfer and the
//! insertion of the new row must be in the same transaction as each
//! other").
//!
//! Every flipped row gets the same terminal value (`false`), so a single
//! `WHERE` clause covers the whole batch instead of a per-row `VALUES`
//! bind-parameter list.

use diesel::sql_query;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::PostgresError;

/// Sets `is_latest_object = false` on every version of `object_row_id`
/// other than `keep_version_row_id`.
pub(crate) async fn flip_previous_object_latest(
    conn: &mut AsyncPgConnection,
    object_row_id: i64,
    keep_version_row_id: i64,
) -> Result<(), PostgresError> {
    sql_query(
        "UPDATE object_version SET is_latest_object = false \
         WHERE object_row_id = $1 AND id != $2 AND is_latest_object = true",
    )
    .bind::<diesel::sql_types::BigInt, _>(object_row_id)
    .bind::<diesel::sql_types::BigInt, _>(keep_version_row_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Sets `is_latest_tag = false` on every tag of `object_version_row_id`
/// other than `keep_tag_row_id`.
pub(crate) async fn flip_previous_tag_latest(
    conn: &mut AsyncPgConnection,
    object_version_row_id: i64,
    keep_tag_row_id: i64,
) -> Result<(), PostgresError> {
    sql_query(
        "UPDATE tag SET is_latest_tag = false \
         WHERE object_version_row_id = $1 AND id != $2 AND is_latest_tag = true",
    )
    .bind::<diesel::sql_types::BigInt, _>(object_version_row_id)
    .bind::<diesel::sql_types::BigInt, _>(keep_tag_row_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Sets `is_latest_config = false` on every version of the directory key
/// other than `keep_entry_row_id`.
pub(crate) async fn flip_previous_config_latest(
    conn: &mut AsyncPgConnection,
    tenant_id: i64,
    config_class: &str,
    config_key: &str,
    keep_entry_row_id: i64,
) -> Result<(), PostgresError> {
    sql_query(
        "UPDATE config_entry SET is_latest_config = false \
         WHERE tenant_id = $1 AND config_class = $2 AND config_key = $3 \
           AND id != $4 AND is_latest_config = true",
    )
    .bind::<diesel::sql_types::BigInt, _>(tenant_id)
    .bind::<diesel::sql_types::Text, _>(config_class)
    .bind::<diesel::sql_types::Text, _>(config_key)
    .bind::<diesel::sql_types::BigInt, _>(keep_entry_row_id)
    .execute(conn)
    .await?;
    Ok(())
}
