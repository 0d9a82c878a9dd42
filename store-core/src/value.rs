//! Type system & value codec (spec.md §4.1).
//!
//! A typed value carries a [`BasicType`] and either a single scalar or an
//! ordered array of scalars of that type. Canonical encoding guarantees that
//! logically equal values round-trip to identical byte sequences regardless
//! of how they were constructed.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum BasicType {
    Boolean,
    Integer,
    Float,
    String,
    Decimal,
    Date,
    Datetime,
}

impl BasicType {
    /// Types exposing a total order (spec.md §4.1).
    pub fn is_ordered(self) -> bool {
        !matches!(self, BasicType::Boolean | BasicType::String)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Decimal(Decimal),
    Date(NaiveDate),
    /// Always stored truncated to microsecond precision (spec.md §9).
    Datetime(DateTime<Utc>),
}

impl ScalarValue {
    pub fn basic_type(&self) -> BasicType {
        match self {
            ScalarValue::Boolean(_) => BasicType::Boolean,
            ScalarValue::Integer(_) => BasicType::Integer,
            ScalarValue::Float(_) => BasicType::Float,
            ScalarValue::String(_) => BasicType::String,
            ScalarValue::Decimal(_) => BasicType::Decimal,
            ScalarValue::Date(_) => BasicType::Date,
            ScalarValue::Datetime(_) => BasicType::Datetime,
        }
    }

    /// Normalizes a scalar to its canonical in-memory form. Datetimes are
    /// truncated to microsecond precision regardless of origin.
    pub fn normalize(self) -> Self {
        match self {
            ScalarValue::Datetime(dt) => ScalarValue::Datetime(dt.trunc_subsecs(6)),
            other => other,
        }
    }

    /// Total order for comparable types. Returns `None` for BOOLEAN/STRING
    /// pairs or mismatched types — ordering across types is undefined.
    pub fn compare_ordered(&self, other: &Self) -> Option<Ordering> {
        use ScalarValue::*;
        match (self, other) {
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Decimal(a), Decimal(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Datetime(a), Datetime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Boolean(v) => write!(f, "{v}"),
            ScalarValue::Integer(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::String(v) => write!(f, "{v}"),
            ScalarValue::Decimal(v) => write!(f, "{v}"),
            ScalarValue::Date(v) => write!(f, "{v}"),
            ScalarValue::Datetime(v) => write!(f, "{v}"),
        }
    }
}

/// A scalar value, or an ordered array of scalars of a single element type.
///
/// BOOLEAN arrays are rejected at construction (spec.md §3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    element_type: BasicType,
    data: ValueData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum ValueData {
    Scalar(ScalarValue),
    Array(Vec<ScalarValue>),
}

impl Value {
    pub fn scalar(value: ScalarValue) -> Self {
        let element_type = value.basic_type();
        Value { element_type, data: ValueData::Scalar(value.normalize()) }
    }

    pub fn array(element_type: BasicType, values: Vec<ScalarValue>) -> Result<Self, StoreError> {
        if element_type == BasicType::Boolean {
            return Err(StoreError::InvalidRequest(
                "BOOLEAN arrays are not permitted".to_string(),
            ));
        }
        for v in &values {
            if v.basic_type() != element_type {
                return Err(StoreError::InvalidRequest(format!(
                    "array element of type {} does not match declared element type {}",
                    v.basic_type(),
                    element_type
                )));
            }
        }
        let normalized = values.into_iter().map(ScalarValue::normalize).collect();
        Ok(Value { element_type, data: ValueData::Array(normalized) })
    }

    pub fn element_type(&self) -> BasicType {
        self.element_type
    }

    pub fn is_array(&self) -> bool {
        matches!(self.data, ValueData::Array(_))
    }

    /// Elements of this value, scalar values yielding a single-element slice.
    pub fn elements(&self) -> &[ScalarValue] {
        match &self.data {
            ValueData::Scalar(v) => std::slice::from_ref(v),
            ValueData::Array(vs) => vs,
        }
    }

    pub fn into_elements(self) -> Vec<ScalarValue> {
        match self.data {
            ValueData::Scalar(v) => vec![v],
            ValueData::Array(vs) => vs,
        }
    }

    /// Appends elements to this value. A scalar becomes an array as a
    /// result (spec.md §4.2 APPEND_ATTR).
    pub fn appended(&self, extra: &[ScalarValue]) -> Result<Self, StoreError> {
        for v in extra {
            if v.basic_type() != self.element_type {
                return Err(StoreError::InvalidRequest(format!(
                    "cannot append element of type {} to attribute of element type {}",
                    v.basic_type(),
                    self.element_type
                )));
            }
        }
        let mut elements = self.elements().to_vec();
        elements.extend(extra.iter().cloned());
        Value::array(self.element_type, elements)
    }

    /// Elementwise equality used by EQ/NE/IN term semantics (spec.md §4.5):
    /// true if any stored element equals `needle`.
    pub fn contains_equal(&self, needle: &ScalarValue) -> bool {
        self.elements().iter().any(|e| e == needle)
    }

    /// Canonical byte encoding. Logically equal values round-trip to
    /// identical bytes regardless of how they were constructed.
    pub fn encode_canonical(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(basic_type_tag(self.element_type));
        out.push(if self.is_array() { 1 } else { 0 });
        let elements = self.elements();
        out.extend((elements.len() as u32).to_be_bytes());
        for e in elements {
            encode_scalar(e, &mut out);
        }
        out
    }

    pub fn decode_canonical(element_type: BasicType, bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() < 6 {
            return Err(StoreError::Unexpected("truncated value encoding".to_string()));
        }
        let is_array = bytes[1] == 1;
        let count = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
        let mut cursor = &bytes[6..];
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            let (value, rest) = decode_scalar(element_type, cursor)?;
            elements.push(value);
            cursor = rest;
        }
        if is_array {
            Value::array(element_type, elements)
        } else {
            Ok(Value::scalar(elements.into_iter().next().ok_or_else(|| {
                StoreError::Unexpected("scalar encoding missing its element".to_string())
            })?))
        }
    }
}

fn basic_type_tag(t: BasicType) -> u8 {
    match t {
        BasicType::Boolean => 0,
        BasicType::Integer => 1,
        BasicType::Float => 2,
        BasicType::String => 3,
        BasicType::Decimal => 4,
        BasicType::Date => 5,
        BasicType::Datetime => 6,
    }
}

fn encode_scalar(value: &ScalarValue, out: &mut Vec<u8>) {
    match value {
        ScalarValue::Boolean(b) => out.push(*b as u8),
        ScalarValue::Integer(i) => out.extend(i.to_be_bytes()),
        ScalarValue::Float(f) => out.extend(f.to_be_bytes()),
        ScalarValue::String(s) => {
            out.extend((s.len() as u32).to_be_bytes());
            out.extend(s.as_bytes());
        }
        ScalarValue::Decimal(d) => {
            let s = d.to_string();
            out.extend((s.len() as u32).to_be_bytes());
            out.extend(s.as_bytes());
        }
        ScalarValue::Date(d) => out.extend(d.num_days_from_ce().to_be_bytes()),
        ScalarValue::Datetime(dt) => {
            out.extend(dt.trunc_subsecs(6).timestamp_micros().to_be_bytes())
        }
    }
}

fn decode_scalar(
    element_type: BasicType,
    bytes: &[u8],
) -> Result<(ScalarValue, &[u8]), StoreError> {
    let err = || StoreError::Unexpected("truncated value encoding".to_string());
    match element_type {
        BasicType::Boolean => {
            let b = *bytes.first().ok_or_else(err)? != 0;
            Ok((ScalarValue::Boolean(b), &bytes[1..]))
        }
        BasicType::Integer => {
            let (head, rest) = bytes.split_at(8.min(bytes.len()));
            let arr: [u8; 8] = head.try_into().map_err(|_| err())?;
            Ok((ScalarValue::Integer(i64::from_be_bytes(arr)), rest))
        }
        BasicType::Float => {
            let (head, rest) = bytes.split_at(8.min(bytes.len()));
            let arr: [u8; 8] = head.try_into().map_err(|_| err())?;
            Ok((ScalarValue::Float(f64::from_be_bytes(arr)), rest))
        }
        BasicType::String => {
            let (len_bytes, rest) = bytes.split_at(4.min(bytes.len()));
            let len = u32::from_be_bytes(len_bytes.try_into().map_err(|_| err())?) as usize;
            let (s_bytes, rest) = rest.split_at(len.min(rest.len()));
            let s = String::from_utf8(s_bytes.to_vec())
                .map_err(|_| StoreError::Unexpected("invalid utf8 in string value".to_string()))?;
            Ok((ScalarValue::String(s), rest))
        }
        BasicType::Decimal => {
            let (len_bytes, rest) = bytes.split_at(4.min(bytes.len()));
            let len = u32::from_be_bytes(len_bytes.try_into().map_err(|_| err())?) as usize;
            let (s_bytes, rest) = rest.split_at(len.min(rest.len()));
            let s = std::str::from_utf8(s_bytes)
                .map_err(|_| StoreError::Unexpected("invalid utf8 in decimal value".to_string()))?;
            let d: Decimal = s
                .parse()
                .map_err(|_| StoreError::Unexpected("invalid decimal value".to_string()))?;
            Ok((ScalarValue::Decimal(d), rest))
        }
        BasicType::Date => {
            let (head, rest) = bytes.split_at(4.min(bytes.len()));
            let arr: [u8; 4] = head.try_into().map_err(|_| err())?;
            let days = i32::from_be_bytes(arr);
            let date = NaiveDate::from_num_days_from_ce_opt(days)
                .ok_or_else(|| StoreError::Unexpected("invalid date value".to_string()))?;
            Ok((ScalarValue::Date(date), rest))
        }
        BasicType::Datetime => {
            let (head, rest) = bytes.split_at(8.min(bytes.len()));
            let arr: [u8; 8] = head.try_into().map_err(|_| err())?;
            let micros = i64::from_be_bytes(arr);
            let dt = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| StoreError::Unexpected("invalid datetime value".to_string()))?;
            Ok((ScalarValue::Datetime(dt), rest))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_roundtrips_through_canonical_encoding() {
        let v = Value::scalar(ScalarValue::Integer(42));
        let bytes = v.encode_canonical();
        let decoded = Value::decode_canonical(BasicType::Integer, &bytes).unwrap();
        assert_eq!(v, decoded);
    }

    #[test]
    fn array_roundtrips_through_canonical_encoding() {
        let v = Value::array(
            BasicType::String,
            vec![ScalarValue::String("a".into()), ScalarValue::String("b".into())],
        )
        .unwrap();
        let bytes = v.encode_canonical();
        let decoded = Value::decode_canonical(BasicType::String, &bytes).unwrap();
        assert_eq!(v, decoded);
    }

    #[test]
    fn boolean_arrays_are_rejected() {
        let err = Value::array(BasicType::Boolean, vec![ScalarValue::Boolean(true)]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }

    #[test]
    fn datetime_is_truncated_to_microseconds() {
        let dt = DateTime::from_timestamp_nanos(1_700_000_000_123_456_789);
        let v = Value::scalar(ScalarValue::Datetime(dt));
        match v.elements()[0] {
            ScalarValue::Datetime(stored) => {
                assert_eq!(stored.timestamp_subsec_nanos() % 1000, 0);
            }
            _ => panic!("expected datetime"),
        }
    }

    #[test]
    fn ordering_is_only_defined_within_a_comparable_type() {
        let a = ScalarValue::Integer(1);
        let b = ScalarValue::String("x".into());
        assert_eq!(a.compare_ordered(&b), None);
        assert_eq!(ScalarValue::Integer(1).compare_ordered(&ScalarValue::Integer(2)), Some(Ordering::Less));
    }

    #[test]
    fn append_turns_a_scalar_into_an_array() {
        let v = Value::scalar(ScalarValue::Integer(1));
        let appended = v.appended(&[ScalarValue::Integer(2)]).unwrap();
        assert!(appended.is_array());
        assert_eq!(appended.elements().len(), 2);
    }
}
