//! Transport-agnostic error mapping (spec.md §6.1, §7). `store-core`'s
//! `StoreError` taxonomy is internal; this module is the one place that
//! translates it (plus service-layer validation failures) into the
//! handful of codes an outer RPC layer is expected to map onto status
//! codes. The RPC layer itself is out of scope (spec.md §1).

use store_core::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    AlreadyExists,
    PermissionDenied,
    /// Not part of spec.md §6.1's table; covers `StoreError::Conflict` and
    /// `StoreError::Unexpected`, which have no public-facing code of their
    /// own and are surfaced to an operator rather than mapped to a specific
    /// client-actionable condition.
    Internal,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiError { code, message: message.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ApiError::new(ApiErrorCode::InvalidArgument, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        ApiError::new(ApiErrorCode::PermissionDenied, message)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::NotFound(_) => ApiErrorCode::NotFound,
            StoreError::Duplicate(_) => ApiErrorCode::AlreadyExists,
            StoreError::WrongType(_) => ApiErrorCode::FailedPrecondition,
            StoreError::BadUpdate(_) => ApiErrorCode::InvalidArgument,
            StoreError::InvalidRequest(_) => ApiErrorCode::InvalidArgument,
            StoreError::Conflict(_) => ApiErrorCode::Internal,
            StoreError::Unexpected(_) => ApiErrorCode::Internal,
        };
        ApiError::new(code, err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_type_maps_to_failed_precondition() {
        let err: ApiError = StoreError::WrongType("x".to_string()).into();
        assert_eq!(err.code, ApiErrorCode::FailedPrecondition);
    }

    #[test]
    fn duplicate_maps_to_already_exists() {
        let err: ApiError = StoreError::Duplicate("x".to_string()).into();
        assert_eq!(err.code, ApiErrorCode::AlreadyExists);
    }
}
