//! Shared error taxonomy (spec.md §7).
//!
//! Every component in this workspace that can fail surfaces one of these
//! kinds. Transport-level mapping (to HTTP/gRPC status codes) happens
//! outside this repository; see spec.md §6.1 for the mapping table this
//! type is designed to be translated through.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// A selector or directory lookup has no match.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write would violate a uniqueness invariant (object, version, tag,
    /// preallocation, or a live config-entry key).
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// The stored `object_type` disagrees with the request's.
    #[error("wrong type: {0}")]
    WrongType(String),

    /// A tag-update precondition was violated.
    #[error("bad update: {0}")]
    BadUpdate(String),

    /// Structural or validation failure in the request itself.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Optimistic-concurrency loss; retrying is acceptable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An invariant was violated at runtime that the caller cannot have
    /// caused directly; surfaced as an internal error and logged.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound(format!("{}: {}", entity.into(), id))
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
