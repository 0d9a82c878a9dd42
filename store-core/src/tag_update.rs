//! Tag Update Engine (spec.md §4.2).
//!
//! `apply` is a pure function: given a starting tag attribute map and an
//! ordered list of [`TagUpdate`]s, it produces the resulting map or the
//! first precondition failure. There is no partial effect on failure.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{is_reserved_attr_name, AttributeMap};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UpdateOperation {
    CreateAttr,
    ReplaceAttr,
    AppendAttr,
    DeleteAttr,
    ClearAllAttr,
    #[default]
    CreateOrReplaceAttr,
    CreateOrAppendAttr,
}

/// One declarative mutation against a tag's attribute map.
///
/// `attr_name`/`value` are ignored by `ClearAllAttr`. A missing `operation`
/// defaults to `CreateOrReplaceAttr` (spec.md §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagUpdate {
    pub operation: UpdateOperation,
    pub attr_name: String,
    pub value: Option<Value>,
}

impl TagUpdate {
    pub fn create(attr_name: impl Into<String>, value: Value) -> Self {
        TagUpdate { operation: UpdateOperation::CreateAttr, attr_name: attr_name.into(), value: Some(value) }
    }

    pub fn replace(attr_name: impl Into<String>, value: Value) -> Self {
        TagUpdate { operation: UpdateOperation::ReplaceAttr, attr_name: attr_name.into(), value: Some(value) }
    }

    pub fn append(attr_name: impl Into<String>, value: Value) -> Self {
        TagUpdate { operation: UpdateOperation::AppendAttr, attr_name: attr_name.into(), value: Some(value) }
    }

    pub fn delete(attr_name: impl Into<String>) -> Self {
        TagUpdate { operation: UpdateOperation::DeleteAttr, attr_name: attr_name.into(), value: None }
    }

    pub fn clear_all() -> Self {
        TagUpdate { operation: UpdateOperation::ClearAllAttr, attr_name: String::new(), value: None }
    }
}

/// Applies `updates` left-to-right against `starting`, returning the
/// resulting map or the first `BadUpdate`/`InvalidRequest` encountered.
/// `starting` is left untouched on failure.
pub fn apply(starting: &AttributeMap, updates: &[TagUpdate]) -> Result<AttributeMap, StoreError> {
    let mut current = starting.clone();
    for update in updates {
        apply_one(&mut current, update)?;
    }
    Ok(current)
}

fn apply_one(current: &mut AttributeMap, update: &TagUpdate) -> Result<(), StoreError> {
    match update.operation {
        UpdateOperation::ClearAllAttr => {
            current.retain(|name, _| is_reserved_attr_name(name));
            return Ok(());
        }
        UpdateOperation::CreateOrReplaceAttr => {
            return if current.contains_key(&update.attr_name) {
                apply_replace(current, update)
            } else {
                apply_create(current, update)
            };
        }
        UpdateOperation::CreateOrAppendAttr => {
            return if current.contains_key(&update.attr_name) {
                apply_append(current, update)
            } else {
                apply_create(current, update)
            };
        }
        UpdateOperation::CreateAttr => return apply_create(current, update),
        UpdateOperation::ReplaceAttr => return apply_replace(current, update),
        UpdateOperation::AppendAttr => return apply_append(current, update),
        UpdateOperation::DeleteAttr => return apply_delete(current, update),
    }
}

fn required_value(update: &TagUpdate) -> Result<&Value, StoreError> {
    update
        .value
        .as_ref()
        .ok_or_else(|| StoreError::InvalidRequest(format!("update on '{}' requires a value", update.attr_name)))
}

fn apply_create(current: &mut AttributeMap, update: &TagUpdate) -> Result<(), StoreError> {
    if current.contains_key(&update.attr_name) {
        return Err(StoreError::BadUpdate(format!(
            "CREATE_ATTR: attribute '{}' already exists",
            update.attr_name
        )));
    }
    let value = required_value(update)?.clone();
    current.insert(update.attr_name.clone(), value);
    Ok(())
}

fn apply_replace(current: &mut AttributeMap, update: &TagUpdate) -> Result<(), StoreError> {
    let existing = current.get(&update.attr_name).ok_or_else(|| {
        StoreError::BadUpdate(format!("REPLACE_ATTR: attribute '{}' does not exist", update.attr_name))
    })?;
    let new_value = required_value(update)?;
    if existing.element_type() != new_value.element_type() {
        return Err(StoreError::BadUpdate(format!(
            "REPLACE_ATTR: attribute '{}' has element type {} but replacement has {}",
            update.attr_name,
            existing.element_type(),
            new_value.element_type()
        )));
    }
    if existing.is_array() != new_value.is_array() {
        return Err(StoreError::BadUpdate(format!(
            "REPLACE_ATTR: attribute '{}' is {} but replacement is {}",
            update.attr_name,
            if existing.is_array() { "an array" } else { "a scalar" },
            if new_value.is_array() { "an array" } else { "a scalar" },
        )));
    }
    current.insert(update.attr_name.clone(), new_value.clone());
    Ok(())
}

fn apply_append(current: &mut AttributeMap, update: &TagUpdate) -> Result<(), StoreError> {
    let existing = current.get(&update.attr_name).ok_or_else(|| {
        StoreError::BadUpdate(format!("APPEND_ATTR: attribute '{}' does not exist", update.attr_name))
    })?;
    let new_value = required_value(update)?;
    if existing.element_type() != new_value.element_type() {
        return Err(StoreError::BadUpdate(format!(
            "APPEND_ATTR: attribute '{}' has element type {} but appended value has {}",
            update.attr_name,
            existing.element_type(),
            new_value.element_type()
        )));
    }
    let appended = existing.appended(new_value.elements())?;
    current.insert(update.attr_name.clone(), appended);
    Ok(())
}

fn apply_delete(current: &mut AttributeMap, update: &TagUpdate) -> Result<(), StoreError> {
    if current.remove(&update.attr_name).is_none() {
        return Err(StoreError::BadUpdate(format!(
            "DELETE_ATTR: attribute '{}' does not exist",
            update.attr_name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarValue;
    use pretty_assertions::assert_eq;

    fn attr_map(pairs: &[(&str, Value)]) -> AttributeMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn create_on_existing_attr_is_bad_update() {
        let starting = attr_map(&[("x", Value::scalar(ScalarValue::Integer(1)))]);
        let err = apply(&starting, &[TagUpdate::create("x", Value::scalar(ScalarValue::Integer(2)))]).unwrap_err();
        assert!(matches!(err, StoreError::BadUpdate(_)));
    }

    #[test]
    fn delete_then_create_is_a_net_replace() {
        let starting = attr_map(&[("x", Value::scalar(ScalarValue::Integer(1)))]);
        let updates = vec![TagUpdate::delete("x"), TagUpdate::create("x", Value::scalar(ScalarValue::Integer(2)))];
        let result = apply(&starting, &updates).unwrap();
        assert_eq!(result.get("x"), Some(&Value::scalar(ScalarValue::Integer(2))));
    }

    #[test]
    fn failed_update_leaves_no_partial_effect() {
        let starting = attr_map(&[("x", Value::scalar(ScalarValue::Integer(1)))]);
        let updates = vec![
            TagUpdate::create("y", Value::scalar(ScalarValue::Integer(9))),
            TagUpdate::create("x", Value::scalar(ScalarValue::Integer(2))),
        ];
        let err = apply(&starting, &updates).unwrap_err();
        assert!(matches!(err, StoreError::BadUpdate(_)));
        // starting itself is untouched; caller must not have committed `y`.
        assert_eq!(starting.len(), 1);
    }

    #[test]
    fn sequential_appends_equal_one_combined_append() {
        let starting: AttributeMap = AttributeMap::new();
        let mut via_two_steps = apply(
            &starting,
            &[TagUpdate::create("a", Value::scalar(ScalarValue::Integer(1)))],
        )
        .unwrap();
        via_two_steps = apply(&via_two_steps, &[TagUpdate::append("a", Value::scalar(ScalarValue::Integer(2)))]).unwrap();
        via_two_steps = apply(&via_two_steps, &[TagUpdate::append("a", Value::scalar(ScalarValue::Integer(3)))]).unwrap();

        let mut via_combined = apply(
            &starting,
            &[TagUpdate::create("a", Value::scalar(ScalarValue::Integer(1)))],
        )
        .unwrap();
        via_combined = apply(
            &via_combined,
            &[TagUpdate::append(
                "a",
                Value::array(crate::value::BasicType::Integer, vec![ScalarValue::Integer(2), ScalarValue::Integer(3)]).unwrap(),
            )],
        )
        .unwrap();

        assert_eq!(via_two_steps, via_combined);
    }

    #[test]
    fn clear_all_preserves_reserved_attrs_only() {
        let starting = attr_map(&[
            ("dataset_class", Value::scalar(ScalarValue::String("a".into()))),
            ("trac_create_time", Value::scalar(ScalarValue::String("t".into()))),
        ]);
        let result = apply(&starting, &[TagUpdate::clear_all()]).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("trac_create_time"));
    }

    #[test]
    fn replace_rejects_scalar_for_same_typed_array() {
        let starting = attr_map(&[(
            "tags",
            Value::array(crate::value::BasicType::String, vec![ScalarValue::String("a".into())]).unwrap(),
        )]);
        let err = apply(&starting, &[TagUpdate::replace("tags", Value::scalar(ScalarValue::String("b".into())))]).unwrap_err();
        assert!(matches!(err, StoreError::BadUpdate(_)));
    }

    #[test]
    fn replace_rejects_array_for_same_typed_scalar() {
        let starting = attr_map(&[("x", Value::scalar(ScalarValue::Integer(1)))]);
        let err = apply(
            &starting,
            &[TagUpdate::replace("x", Value::array(crate::value::BasicType::Integer, vec![ScalarValue::Integer(1)]).unwrap())],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::BadUpdate(_)));
    }

    #[test]
    fn create_or_replace_defaults_when_operation_unset() {
        let update = TagUpdate { operation: Default::default(), attr_name: "x".into(), value: Some(Value::scalar(ScalarValue::Integer(1))) };
        assert_eq!(update.operation, UpdateOperation::CreateOrReplaceAttr);
    }
}
