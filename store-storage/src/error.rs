//! Diesel-to-[`StoreError`] translation via a local `PostgresError`
//! newtype and `storage_error_from_diesel`.

use store_core::StoreError;

pub(crate) struct PostgresError(pub StoreError);

impl From<diesel::result::Error> for PostgresError {
    fn from(value: diesel::result::Error) -> Self {
        PostgresError(StoreError::Unexpected(format!("diesel error: {value}")))
    }
}

impl From<PostgresError> for StoreError {
    fn from(value: PostgresError) -> Self {
        value.0
    }
}

impl From<StoreError> for PostgresError {
    fn from(value: StoreError) -> Self {
        PostgresError(value)
    }
}

/// Maps a diesel error onto the store's error taxonomy, given the entity
/// and identifier under operation (spec.md §7).
pub(crate) fn storage_error_from_diesel(
    err: diesel::result::Error,
    entity: &str,
    id: &str,
) -> PostgresError {
    let err_string = err.to_string();
    match err {
        diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _) => {
            PostgresError(StoreError::Duplicate(format!("{entity}: {id}")))
        }
        diesel::result::Error::NotFound => {
            PostgresError(StoreError::not_found(entity.to_string(), id))
        }
        _ => PostgresError(StoreError::Unexpected(err_string)),
    }
}
