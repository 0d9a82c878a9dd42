//! Conversion between `store_core::Value`/`AttributeMap` and the
//! normalized `tag_attr` row shape mandated by spec.md §4.4: "one row per
//! `(tag, attribute_name, element_index, element_type, element_value)`,
//! with `element_index = 0` for scalar attributes and ordered positive
//! indices for arrays."

use std::collections::BTreeMap;

use store_core::{AttributeMap, BasicType, ScalarValue, StoreError, Value};

use crate::orm::{DbBasicType, NewTagAttr, TagAttr};

pub(crate) fn attr_map_to_rows(tag_row_id: i64, attrs: &AttributeMap) -> Vec<NewTagAttr> {
    let mut rows = Vec::new();
    for (name, value) in attrs {
        for (idx, element) in value.elements().iter().enumerate() {
            rows.push(scalar_to_row(tag_row_id, name, idx as i32, value.element_type(), element));
        }
    }
    rows
}

fn scalar_to_row(tag_row_id: i64, name: &str, element_index: i32, element_type: BasicType, value: &ScalarValue) -> NewTagAttr {
    let mut row = NewTagAttr {
        tag_row_id,
        attr_name: name.to_string(),
        element_index,
        element_type: element_type.into(),
        value_boolean: None,
        value_integer: None,
        value_float: None,
        value_string: None,
        value_decimal: None,
        value_date: None,
        value_datetime: None,
    };
    match value {
        ScalarValue::Boolean(b) => row.value_boolean = Some(*b),
        ScalarValue::Integer(i) => row.value_integer = Some(*i),
        ScalarValue::Float(f) => row.value_float = Some(*f),
        ScalarValue::String(s) => row.value_string = Some(s.clone()),
        ScalarValue::Decimal(d) => row.value_decimal = Some(*d),
        ScalarValue::Date(d) => row.value_date = Some(*d),
        ScalarValue::Datetime(dt) => row.value_datetime = Some(*dt),
    }
    row
}

fn row_to_scalar(row: &TagAttr) -> Result<ScalarValue, StoreError> {
    let basic_type: BasicType = row.element_type.into();
    let missing = || StoreError::Unexpected(format!("tag_attr row for '{}' missing its {} value", row.attr_name, basic_type));
    Ok(match basic_type {
        BasicType::Boolean => ScalarValue::Boolean(row.value_boolean.ok_or_else(missing)?),
        BasicType::Integer => ScalarValue::Integer(row.value_integer.ok_or_else(missing)?),
        BasicType::Float => ScalarValue::Float(row.value_float.ok_or_else(missing)?),
        BasicType::String => ScalarValue::String(row.value_string.clone().ok_or_else(missing)?),
        BasicType::Decimal => ScalarValue::Decimal(row.value_decimal.ok_or_else(missing)?),
        BasicType::Date => ScalarValue::Date(row.value_date.ok_or_else(missing)?),
        BasicType::Datetime => ScalarValue::Datetime(row.value_datetime.ok_or_else(missing)?),
    })
}

/// Reassembles an [`AttributeMap`] from the normalized rows for one tag.
/// Rows are grouped by `attr_name` and ordered by `element_index`; a single
/// row at index 0 becomes a scalar, more than one becomes an array.
pub(crate) fn rows_to_attr_map(mut rows: Vec<TagAttr>) -> Result<AttributeMap, StoreError> {
    rows.sort_by(|a, b| (a.attr_name.as_str(), a.element_index).cmp(&(b.attr_name.as_str(), b.element_index)));

    let mut grouped: BTreeMap<String, Vec<TagAttr>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.attr_name.clone()).or_default().push(row);
    }

    let mut attrs = AttributeMap::new();
    for (name, group) in grouped {
        let element_type: BasicType = group[0].element_type.into();
        if group.len() == 1 && group[0].element_index == 0 {
            let scalar = row_to_scalar(&group[0])?;
            attrs.insert(name, Value::scalar(scalar));
        } else {
            let mut elements = Vec::with_capacity(group.len());
            for row in &group {
                elements.push(row_to_scalar(row)?);
            }
            attrs.insert(name, Value::array(element_type, elements)?);
        }
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_roundtrips_through_rows() {
        let mut attrs = AttributeMap::new();
        attrs.insert("count".to_string(), Value::scalar(ScalarValue::Integer(7)));
        let rows = attr_map_to_rows(1, &attrs);
        assert_eq!(rows.len(), 1);

        let tag_attr_rows: Vec<TagAttr> = rows
            .into_iter()
            .enumerate()
            .map(|(i, r)| TagAttr {
                id: i as i64,
                tag_row_id: r.tag_row_id,
                attr_name: r.attr_name,
                element_index: r.element_index,
                element_type: r.element_type,
                value_boolean: r.value_boolean,
                value_integer: r.value_integer,
                value_float: r.value_float,
                value_string: r.value_string,
                value_decimal: r.value_decimal,
                value_date: r.value_date,
                value_datetime: r.value_datetime,
            })
            .collect();

        let rebuilt = rows_to_attr_map(tag_attr_rows).unwrap();
        assert_eq!(rebuilt, attrs);
    }
}
