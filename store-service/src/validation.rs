//! Request validation and attribute-name policy (spec.md §6.2, §4.6).
//!
//! Mirrors the grammar a public caller's request must satisfy before it
//! reaches the DAL. `store-core`'s tag-update engine and resolver trust
//! their inputs; this is the boundary that doesn't.

use lazy_static::lazy_static;
use regex::Regex;
use store_core::{is_reserved_attr_name, ObjectType};

use crate::context::CallerTrust;
use crate::error::ApiError;

lazy_static! {
    static ref ATTR_NAME_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").expect("invalid regex");
    static ref TENANT_CODE_RE: Regex = Regex::new(r"^[A-Z][A-Z0-9_]{0,31}$").expect("invalid regex");
    static ref RESOURCE_KEY_RE: Regex = Regex::new(r"^[A-Z][A-Z0-9_]{0,63}$").expect("invalid regex");
    static ref APPLICATION_CODE_RE: Regex = Regex::new(r"^[a-z][a-z0-9-]*$").expect("invalid regex");
}

pub fn validate_tenant_code(tenant_code: &str) -> Result<(), ApiError> {
    if TENANT_CODE_RE.is_match(tenant_code) {
        Ok(())
    } else {
        Err(ApiError::invalid_argument(format!("'{tenant_code}' is not a valid tenant code")))
    }
}

pub fn validate_resource_key(resource_key: &str) -> Result<(), ApiError> {
    if RESOURCE_KEY_RE.is_match(resource_key) {
        Ok(())
    } else {
        Err(ApiError::invalid_argument(format!("'{resource_key}' is not a valid resource key")))
    }
}

pub fn validate_application_code(application: &str) -> Result<(), ApiError> {
    if APPLICATION_CODE_RE.is_match(application) {
        Ok(())
    } else {
        Err(ApiError::invalid_argument(format!("'{application}' is not a valid application code")))
    }
}

pub fn validate_attr_name(name: &str) -> Result<(), ApiError> {
    if ATTR_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ApiError::invalid_argument(format!("'{name}' is not a valid attribute name")))
    }
}

/// Enforces spec.md §3.2 invariant 7: reserved attribute names may only be
/// written by trusted, server-originated code paths. The open question in
/// spec.md §9 is resolved in favor of `InvalidArgument` over
/// `PermissionDenied` (see DESIGN.md) — a public caller naming a `trac_`
/// attribute has sent a structurally invalid request, not an otherwise
/// valid one it lacks permission for.
pub fn check_attr_write_permitted(name: &str, trust: CallerTrust) -> Result<(), ApiError> {
    validate_attr_name(name)?;
    if is_reserved_attr_name(name) && trust != CallerTrust::Trusted {
        return Err(ApiError::invalid_argument(format!(
            "attribute '{name}' uses the reserved prefix and may only be written by trusted callers"
        )));
    }
    Ok(())
}

/// Enforces the restricted-object-type split on the public write surface
/// (spec.md §6.1 "restricted object type via public endpoint ->
/// PermissionDenied"). CONFIG and RESOURCE objects are only writable
/// through trusted paths.
pub fn check_object_type_writable(object_type: ObjectType, trust: CallerTrust) -> Result<(), ApiError> {
    if !object_type.is_public_writable() && trust != CallerTrust::Trusted {
        return Err(ApiError::permission_denied(format!(
            "object type {object_type} may only be written by trusted callers"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_attr_rejected_for_public_caller() {
        let err = check_attr_write_permitted("trac_create_time", CallerTrust::Public).unwrap_err();
        assert_eq!(err.code, crate::error::ApiErrorCode::InvalidArgument);
    }

    #[test]
    fn reserved_attr_allowed_for_trusted_caller() {
        assert!(check_attr_write_permitted("trac_create_time", CallerTrust::Trusted).is_ok());
    }

    #[test]
    fn malformed_attr_name_rejected() {
        assert!(validate_attr_name("9bad").is_err());
        assert!(validate_attr_name("ok_name.v2").is_ok());
    }

    #[test]
    fn config_object_type_requires_trust() {
        assert!(check_object_type_writable(ObjectType::Config, CallerTrust::Public).is_err());
        assert!(check_object_type_writable(ObjectType::Config, CallerTrust::Trusted).is_ok());
        assert!(check_object_type_writable(ObjectType::Data, CallerTrust::Public).is_ok());
    }

    #[test]
    fn tenant_code_grammar() {
        assert!(validate_tenant_code("ACME").is_ok());
        assert!(validate_tenant_code("acme").is_err());
    }
}
