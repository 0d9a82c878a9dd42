//! Search expression tree (spec.md §4.5).
//!
//! This module defines the pure, storage-agnostic shape of a search
//! request. `store-storage`'s search planner/executor walks this tree and
//! translates it into relational operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ObjectType;
use crate::value::{BasicType, ScalarValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
}

impl Operator {
    /// GT/GE/LT/LE require an ordered basic type and a single-valued
    /// candidate attribute (spec.md §4.5).
    pub fn is_ordered(self) -> bool {
        matches!(self, Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// A leaf predicate against a single named, typed attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub attr_name: String,
    pub attr_type: BasicType,
    pub operator: Operator,
    /// Scalar for EQ/NE/ordered operators; array for IN.
    pub value: TermValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TermValue {
    Scalar(ScalarValue),
    Array(Vec<ScalarValue>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SearchExpression {
    Term(Term),
    /// `op == Not` carries exactly one child.
    Logical(LogicalOp, Vec<SearchExpression>),
}

impl SearchExpression {
    pub fn term(attr_name: impl Into<String>, attr_type: BasicType, operator: Operator, value: TermValue) -> Self {
        SearchExpression::Term(Term { attr_name: attr_name.into(), attr_type, operator, value })
    }

    pub fn and(children: Vec<SearchExpression>) -> Self {
        SearchExpression::Logical(LogicalOp::And, children)
    }

    pub fn or(children: Vec<SearchExpression>) -> Self {
        SearchExpression::Logical(LogicalOp::Or, children)
    }

    pub fn not(child: SearchExpression) -> Self {
        SearchExpression::Logical(LogicalOp::Not, vec![child])
    }
}

/// Search request parameters (spec.md §4.5). Paging is intentionally
/// absent — §9's open question leaves it unspecified, and result ordering
/// (§4.5's stable tie-break) is designed so paging can be layered on later
/// without changing semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParameters {
    pub object_type: ObjectType,
    pub expression: SearchExpression,
    pub search_as_of: Option<DateTime<Utc>>,
    pub prior_versions: bool,
    pub prior_tags: bool,
}

impl SearchParameters {
    pub fn new(object_type: ObjectType, expression: SearchExpression) -> Self {
        SearchParameters { object_type, expression, search_as_of: None, prior_versions: false, prior_tags: false }
    }
}
