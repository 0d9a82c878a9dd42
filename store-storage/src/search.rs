//! Search Planner & Executor (spec.md §4.5): walks a [`SearchExpression`]
//! tree and evaluates it in-memory against each candidate tag's attribute
//! map, after the version/temporal filters (`searchAsOf`, `priorVersions`,
//! `priorTags`) have narrowed the universe of rows under consideration.
//!
//! Candidate gathering is a nested per-object/per-version walk rather than
//! a single relational query, the same row-at-a-time style `resolver.rs`
//! uses for selector resolution — spec.md §4.5 "Planner" explicitly allows
//! "relational joins, subqueries, or in-memory filtering" as long as the
//! set-theoretic semantics hold exactly.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use store_core::{
    AttributeMap, BasicType, Header, LogicalOp, Operator, ScalarValue, SearchExpression, SearchParameters, StoreError,
    StoreResult, Tag, Term, TermValue,
};

use crate::attrs::rows_to_attr_map;
use crate::error::PostgresError;
use crate::orm::{DbObjectType, TagAttr};
use crate::schema::{object, object_version, tag, tag_attr};

struct Candidate {
    header: Header,
    tag_row_id: i64,
}

/// `search(tenant, SearchParameters)` (spec.md §4.4, §4.5).
pub(crate) async fn execute_search(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    params: &SearchParameters,
) -> StoreResult<Vec<Tag>> {
    run(conn, tenant_row_id, params).await.map_err(StoreError::from)
}

async fn run(conn: &mut AsyncPgConnection, tenant_row_id: i64, params: &SearchParameters) -> Result<Vec<Tag>, PostgresError> {
    let candidates = gather_candidates(conn, tenant_row_id, params).await?;

    let mut matches = Vec::new();
    for candidate in candidates {
        let attrs = load_tag_attrs(conn, candidate.tag_row_id).await?;
        if eval_expr(&params.expression, &attrs).map_err(PostgresError)? {
            matches.push(Tag { header: candidate.header, definition: None, attrs });
        }
    }

    let mut matches = reduce_to_latest_per_object(matches);

    matches.sort_by(|a, b| {
        b.header
            .tag_timestamp
            .cmp(&a.header.tag_timestamp)
            .then_with(|| b.header.object_timestamp.cmp(&a.header.object_timestamp))
            .then_with(|| a.header.object_id.cmp(&b.header.object_id))
    });
    Ok(matches)
}

/// Reduces the set of matching tags down to at most one per object (spec.md
/// §4.5: `priorVersions = true` "returns the latest matching version per
/// object", `priorTags = true` "returns the latest matching tag for that
/// version"). Matching is expression-dependent, so this can only run after
/// `eval_expr` has filtered `matches`, not while the candidate rows are
/// still being gathered.
///
/// When both flags are `false` each object already contributes at most one
/// candidate tag (`gather_candidates` only fetched the single latest
/// version/tag in that case), so this is a no-op for that case.
fn reduce_to_latest_per_object(matches: Vec<Tag>) -> Vec<Tag> {
    use std::collections::BTreeMap;

    let mut by_object: BTreeMap<Uuid, BTreeMap<i32, Tag>> = BTreeMap::new();
    for tag in matches {
        let versions = by_object.entry(tag.header.object_id).or_default();
        match versions.get(&tag.header.object_version) {
            Some(existing) if existing.header.tag_version >= tag.header.tag_version => {}
            _ => {
                versions.insert(tag.header.object_version, tag);
            }
        }
    }

    by_object
        .into_values()
        .filter_map(|versions| versions.into_iter().max_by_key(|(object_version, _)| *object_version))
        .map(|(_, tag)| tag)
        .collect()
}

/// Walks every object of the requested type, then every version considered
/// under `priorVersions`/`searchAsOf`, then every tag considered under
/// `priorTags`/`searchAsOf`, producing one [`Candidate`] per surviving tag.
async fn gather_candidates(
    conn: &mut AsyncPgConnection,
    tenant_row_id: i64,
    params: &SearchParameters,
) -> Result<Vec<Candidate>, PostgresError> {
    let db_type: DbObjectType = params.object_type.into();
    let objects: Vec<(i64, Uuid)> = object::table
        .filter(object::tenant_id.eq(tenant_row_id))
        .filter(object::object_type.eq(db_type))
        .select((object::id, object::object_id))
        .load(conn)
        .await?;

    let mut out = Vec::new();
    for (object_row_id, object_id) in objects {
        let versions = candidate_versions(conn, object_row_id, params).await?;
        for (version_row_id, object_version_no, object_timestamp, is_latest_object) in versions {
            let tags = candidate_tags(conn, version_row_id, params).await?;
            for (tag_row_id, tag_version_no, tag_timestamp, is_latest_tag) in tags {
                out.push(Candidate {
                    header: Header {
                        object_type: params.object_type,
                        object_id,
                        object_version: object_version_no,
                        object_timestamp,
                        tag_version: tag_version_no,
                        tag_timestamp,
                        is_latest_object,
                        is_latest_tag,
                    },
                    tag_row_id,
                });
            }
        }
    }
    Ok(out)
}

#[allow(clippy::type_complexity)]
async fn candidate_versions(
    conn: &mut AsyncPgConnection,
    object_row_id: i64,
    params: &SearchParameters,
) -> Result<Vec<(i64, i32, DateTime<Utc>, bool)>, PostgresError> {
    use object_version::dsl;

    let mut query = dsl::object_version.filter(dsl::object_row_id.eq(object_row_id)).into_boxed();
    if let Some(as_of) = params.search_as_of {
        query = query.filter(dsl::object_timestamp.le(as_of));
    } else if !params.prior_versions {
        query = query.filter(dsl::is_latest_object.eq(true));
    }

    let mut rows: Vec<(i64, i32, DateTime<Utc>, bool)> = query
        .select((dsl::id, dsl::object_version, dsl::object_timestamp, dsl::is_latest_object))
        .order(dsl::object_version.asc())
        .load(conn)
        .await?;

    if params.search_as_of.is_some() && !params.prior_versions {
        // "the latest row per object/version is then the greatest timestamp <= T"
        if let Some(last) = rows.pop() {
            rows = vec![last];
        }
    }
    Ok(rows)
}

#[allow(clippy::type_complexity)]
async fn candidate_tags(
    conn: &mut AsyncPgConnection,
    version_row_id: i64,
    params: &SearchParameters,
) -> Result<Vec<(i64, i32, DateTime<Utc>, bool)>, PostgresError> {
    use tag::dsl;

    let mut query = dsl::tag.filter(dsl::object_version_row_id.eq(version_row_id)).into_boxed();
    if let Some(as_of) = params.search_as_of {
        query = query.filter(dsl::tag_timestamp.le(as_of));
    } else if !params.prior_tags {
        query = query.filter(dsl::is_latest_tag.eq(true));
    }

    let mut rows: Vec<(i64, i32, DateTime<Utc>, bool)> = query
        .select((dsl::id, dsl::tag_version, dsl::tag_timestamp, dsl::is_latest_tag))
        .order(dsl::tag_version.asc())
        .load(conn)
        .await?;

    if params.search_as_of.is_some() && !params.prior_tags {
        if let Some(last) = rows.pop() {
            rows = vec![last];
        }
    }
    Ok(rows)
}

async fn load_tag_attrs(conn: &mut AsyncPgConnection, tag_row_id: i64) -> Result<AttributeMap, PostgresError> {
    let rows: Vec<TagAttr> = tag_attr::table.filter(tag_attr::tag_row_id.eq(tag_row_id)).select(TagAttr::as_select()).load(conn).await?;
    Ok(rows_to_attr_map(rows)?)
}

fn eval_expr(expr: &SearchExpression, attrs: &AttributeMap) -> StoreResult<bool> {
    match expr {
        SearchExpression::Term(term) => eval_term(term, attrs),
        SearchExpression::Logical(LogicalOp::And, children) => {
            for child in children {
                if !eval_expr(child, attrs)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        SearchExpression::Logical(LogicalOp::Or, children) => {
            for child in children {
                if eval_expr(child, attrs)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        SearchExpression::Logical(LogicalOp::Not, children) => {
            let child = children
                .first()
                .ok_or_else(|| StoreError::InvalidRequest("NOT expression requires exactly one child".to_string()))?;
            Ok(!eval_expr(child, attrs)?)
        }
    }
}

/// Evaluates one leaf predicate (spec.md §4.5 "Term semantics").
fn eval_term(term: &Term, attrs: &AttributeMap) -> StoreResult<bool> {
    if term.operator.is_ordered() && !term.attr_type.is_ordered() {
        return Err(StoreError::InvalidRequest(format!(
            "operator {:?} is not valid against non-ordered type {}",
            term.operator, term.attr_type
        )));
    }
    if term.operator == Operator::In && term.attr_type == BasicType::Boolean {
        return Err(StoreError::InvalidRequest("IN is not valid against BOOLEAN attributes".to_string()));
    }

    let stored = attrs.get(&term.attr_name).filter(|v| v.element_type() == term.attr_type);

    Ok(match term.operator {
        Operator::Eq => matches_equal(stored, &term.value),
        Operator::Ne => !matches_equal(stored, &term.value),
        Operator::In => matches_in(stored, &term.value),
        Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le => matches_ordered(term.operator, stored, &term.value),
    })
}

fn matches_equal(stored: Option<&store_core::Value>, needle: &TermValue) -> bool {
    match (stored, needle) {
        (Some(value), TermValue::Scalar(needle)) => value.contains_equal(needle),
        _ => false,
    }
}

fn matches_in(stored: Option<&store_core::Value>, needle: &TermValue) -> bool {
    match (stored, needle) {
        (Some(value), TermValue::Array(candidates)) => candidates.iter().any(|c| value.contains_equal(c)),
        _ => false,
    }
}

/// Ordered operators never match a multi-valued attribute (spec.md §4.5:
/// "ordering a set against a point is undefined").
fn matches_ordered(operator: Operator, stored: Option<&store_core::Value>, needle: &TermValue) -> bool {
    let (Some(value), TermValue::Scalar(needle)) = (stored, needle) else {
        return false;
    };
    if value.is_array() {
        return false;
    }
    let element = &value.elements()[0];
    let Some(ordering) = compare(element, needle) else {
        return false;
    };
    match operator {
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        _ => unreachable!("non-ordered operator reached matches_ordered"),
    }
}

fn compare(a: &ScalarValue, b: &ScalarValue) -> Option<Ordering> {
    a.compare_ordered(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use store_core::{ObjectType, Value};

    fn attrs_with(name: &str, value: Value) -> AttributeMap {
        let mut attrs = AttributeMap::new();
        attrs.insert(name.to_string(), value);
        attrs
    }

    fn make_tag(object_id: Uuid, object_version: i32, tag_version: i32) -> Tag {
        Tag {
            header: Header {
                object_type: ObjectType::Data,
                object_id,
                object_version,
                object_timestamp: Utc::now(),
                tag_version,
                tag_timestamp: Utc::now(),
                is_latest_object: false,
                is_latest_tag: false,
            },
            definition: None,
            attrs: AttributeMap::new(),
        }
    }

    #[test]
    fn prior_versions_keeps_only_the_latest_matching_version_per_object() {
        let object_id = Uuid::new_v4();
        let matches = vec![make_tag(object_id, 1, 1), make_tag(object_id, 2, 1), make_tag(object_id, 3, 1)];
        let reduced = reduce_to_latest_per_object(matches);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].header.object_version, 3);
    }

    #[test]
    fn prior_tags_keeps_only_the_latest_matching_tag_within_a_version() {
        let object_id = Uuid::new_v4();
        let matches = vec![make_tag(object_id, 1, 1), make_tag(object_id, 1, 2), make_tag(object_id, 1, 3)];
        let reduced = reduce_to_latest_per_object(matches);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].header.object_version, 1);
        assert_eq!(reduced[0].header.tag_version, 3);
    }

    #[test]
    fn reduction_is_independent_per_object() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let matches = vec![make_tag(a, 1, 1), make_tag(a, 2, 1), make_tag(b, 5, 1)];
        let mut reduced = reduce_to_latest_per_object(matches);
        reduced.sort_by_key(|t| t.header.object_id);
        let mut expected_ids = vec![a, b];
        expected_ids.sort();
        assert_eq!(reduced.iter().map(|t| t.header.object_id).collect::<Vec<_>>(), expected_ids);
    }

    #[test]
    fn eq_matches_any_element_of_a_multi_valued_attribute() {
        let attrs = attrs_with(
            "tags",
            Value::array(BasicType::String, vec![ScalarValue::String("a".into()), ScalarValue::String("b".into())]).unwrap(),
        );
        let term = Term {
            attr_name: "tags".to_string(),
            attr_type: BasicType::String,
            operator: Operator::Eq,
            value: TermValue::Scalar(ScalarValue::String("b".into())),
        };
        assert!(eval_term(&term, &attrs).unwrap());
    }

    #[test]
    fn ne_matches_a_missing_attribute() {
        let attrs = AttributeMap::new();
        let term = Term {
            attr_name: "missing".to_string(),
            attr_type: BasicType::Integer,
            operator: Operator::Ne,
            value: TermValue::Scalar(ScalarValue::Integer(1)),
        };
        assert!(eval_term(&term, &attrs).unwrap());
    }

    #[test]
    fn ordered_operator_against_multi_valued_attribute_never_matches() {
        let attrs = attrs_with(
            "count",
            Value::array(BasicType::Integer, vec![ScalarValue::Integer(1), ScalarValue::Integer(5)]).unwrap(),
        );
        let term = Term {
            attr_name: "count".to_string(),
            attr_type: BasicType::Integer,
            operator: Operator::Gt,
            value: TermValue::Scalar(ScalarValue::Integer(0)),
        };
        assert!(!eval_term(&term, &attrs).unwrap());
    }

    #[test]
    fn ordered_operator_against_non_ordered_type_is_rejected() {
        let attrs = attrs_with("flag", Value::scalar(ScalarValue::Boolean(true)));
        let term = Term {
            attr_name: "flag".to_string(),
            attr_type: BasicType::Boolean,
            operator: Operator::Gt,
            value: TermValue::Scalar(ScalarValue::Boolean(false)),
        };
        assert!(eval_term(&term, &attrs).is_err());
    }

    #[test]
    fn and_or_not_compose_as_set_operations() {
        let attrs = attrs_with("status", Value::scalar(ScalarValue::String("ACTIVE".into())));
        let is_active = SearchExpression::term(
            "status",
            BasicType::String,
            Operator::Eq,
            TermValue::Scalar(ScalarValue::String("ACTIVE".into())),
        );
        let is_archived = SearchExpression::term(
            "status",
            BasicType::String,
            Operator::Eq,
            TermValue::Scalar(ScalarValue::String("ARCHIVED".into())),
        );
        assert!(eval_expr(&SearchExpression::and(vec![is_active.clone()]), &attrs).unwrap());
        assert!(!eval_expr(&SearchExpression::and(vec![is_active.clone(), is_archived.clone()]), &attrs).unwrap());
        assert!(eval_expr(&SearchExpression::or(vec![is_active.clone(), is_archived.clone()]), &attrs).unwrap());
        assert!(eval_expr(&SearchExpression::not(is_archived), &attrs).unwrap());
        assert!(!eval_expr(&SearchExpression::not(is_active), &attrs).unwrap());
    }

    #[test]
    fn object_type_is_part_of_the_gathered_header() {
        assert_eq!(ObjectType::Data.to_string(), "DATA");
    }
}
