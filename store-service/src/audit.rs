//! Mandatory audit attribute enrichment (spec.md §4.4): every tag the
//! service layer writes gets `trac_create_time`/`trac_create_user_id`/
//! `trac_create_user_name` and `trac_update_time`/`trac_update_user_id`/
//! `trac_update_user_name` stamped in, beyond whatever the caller supplied.

use chrono::{DateTime, Utc};
use store_core::models::{
    ATTR_CREATE_TIME, ATTR_CREATE_USER_ID, ATTR_CREATE_USER_NAME, ATTR_UPDATE_TIME, ATTR_UPDATE_USER_ID,
    ATTR_UPDATE_USER_NAME,
};
use store_core::{AttributeMap, ScalarValue, Value};

use crate::context::CallerIdentity;

/// Stamps all six audit attrs into `attrs`, overwriting anything already
/// present under those names. Used on first save (spec.md §4.4: "On new
/// version save, create attrs propagate from V1" — for V1 itself, create
/// and update are the same event).
pub(crate) fn stamp_creation(attrs: &mut AttributeMap, now: DateTime<Utc>, identity: &CallerIdentity) {
    attrs.insert(ATTR_CREATE_TIME.to_string(), Value::scalar(ScalarValue::Datetime(now)));
    attrs.insert(ATTR_CREATE_USER_ID.to_string(), Value::scalar(ScalarValue::String(identity.user_id.clone())));
    attrs.insert(ATTR_CREATE_USER_NAME.to_string(), Value::scalar(ScalarValue::String(identity.user_name.clone())));
    stamp_update(attrs, now, identity);
}

/// Stamps only the `trac_update_*` attrs, leaving `trac_create_*` as
/// inherited from the prior version/tag (spec.md §4.4: "update attrs
/// reflect the current request").
pub(crate) fn stamp_update(attrs: &mut AttributeMap, now: DateTime<Utc>, identity: &CallerIdentity) {
    attrs.insert(ATTR_UPDATE_TIME.to_string(), Value::scalar(ScalarValue::Datetime(now)));
    attrs.insert(ATTR_UPDATE_USER_ID.to_string(), Value::scalar(ScalarValue::String(identity.user_id.clone())));
    attrs.insert(ATTR_UPDATE_USER_NAME.to_string(), Value::scalar(ScalarValue::String(identity.user_name.clone())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn creation_stamps_all_six_attrs() {
        let mut attrs = AttributeMap::new();
        let identity = CallerIdentity::new("u1", "Alice");
        stamp_creation(&mut attrs, Utc::now(), &identity);
        assert_eq!(attrs.len(), 6);
        assert!(attrs.contains_key(ATTR_CREATE_TIME));
        assert!(attrs.contains_key(ATTR_UPDATE_TIME));
    }

    #[test]
    fn update_leaves_create_attrs_untouched() {
        let mut attrs = AttributeMap::new();
        let identity = CallerIdentity::new("u1", "Alice");
        let created_at = Utc::now();
        stamp_creation(&mut attrs, created_at, &identity);

        let updater = CallerIdentity::new("u2", "Bob");
        stamp_update(&mut attrs, created_at, &updater);

        assert_eq!(attrs.get(ATTR_CREATE_USER_ID), Some(&Value::scalar(ScalarValue::String("u1".to_string()))));
        assert_eq!(attrs.get(ATTR_UPDATE_USER_ID), Some(&Value::scalar(ScalarValue::String("u2".to_string()))));
    }
}
