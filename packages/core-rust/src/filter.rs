//! Structured filters: the declarative, serializable query description a
//! client (or the authorization layer) sends along with a request.
//!
//! A filter carries an equality map, an optional predicate tree, sort keys,
//! a page window, an attribute projection and an optional distinct field.
//! Filters are translated into predicate fragments and AND-combined by the
//! server's query composer. [`PredicateNode::matches`] evaluates a tree
//! against an in-memory [`Entity`] so that stores without a query language
//! can execute it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Entity;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Predicate operators for query filtering.
///
/// Lowercase on the wire (`"eq"`, `"ilike"`, `"nin"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    #[serde(rename = "ilike")]
    ILike,
    In,
    #[serde(rename = "nin")]
    NotIn,
    IsNull,
    NotNull,
    And,
    Or,
    Not,
}

impl PredicateOp {
    /// `true` for operators that combine child nodes instead of testing a field.
    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Not)
    }
}

/// Sort direction for query ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

// ---------------------------------------------------------------------------
// PredicateNode
// ---------------------------------------------------------------------------

/// A recursive predicate node.
///
/// Leaf nodes carry `attribute` and, except for null tests, `value`.
/// Logical nodes (`and`, `or`, `not`) carry `children`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredicateNode {
    pub op: PredicateOp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub children: Option<Vec<PredicateNode>>,
}

impl PredicateNode {
    /// Builds a field comparison.
    #[must_use]
    pub fn leaf(op: PredicateOp, attribute: impl Into<String>, value: Value) -> Self {
        Self {
            op,
            attribute: Some(attribute.into()),
            value: Some(value),
            children: None,
        }
    }

    #[must_use]
    pub fn equals(attribute: impl Into<String>, value: Value) -> Self {
        Self::leaf(PredicateOp::Eq, attribute, value)
    }

    #[must_use]
    pub fn is_null(attribute: impl Into<String>) -> Self {
        Self {
            op: PredicateOp::IsNull,
            attribute: Some(attribute.into()),
            value: None,
            children: None,
        }
    }

    /// Builds a logical node over `children`.
    #[must_use]
    pub fn logical(op: PredicateOp, children: Vec<PredicateNode>) -> Self {
        Self {
            op,
            attribute: None,
            value: None,
            children: Some(children),
        }
    }

    #[must_use]
    pub fn and(children: Vec<PredicateNode>) -> Self {
        Self::logical(PredicateOp::And, children)
    }

    #[must_use]
    pub fn or(children: Vec<PredicateNode>) -> Self {
        Self::logical(PredicateOp::Or, children)
    }

    fn children(&self) -> &[PredicateNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Nesting depth of the tree. A single comparison has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(Self::depth).max().unwrap_or(0)
    }

    /// Whether the tree holds at least one field comparison.
    ///
    /// A tree of empty `and`/`or` nodes constrains nothing, so a multi-row
    /// mutation built on it would touch every row.
    #[must_use]
    pub fn has_comparison(&self) -> bool {
        if self.op.is_logical() {
            self.children().iter().any(Self::has_comparison)
        } else {
            self.attribute.is_some()
        }
    }

    /// Evaluates the predicate against an in-memory entity.
    ///
    /// Missing fields read as `null`. Comparisons against `null` are false,
    /// matching SQL semantics, except for the explicit null tests.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        match self.op {
            PredicateOp::And => self.children().iter().all(|child| child.matches(entity)),
            PredicateOp::Or => self.children().iter().any(|child| child.matches(entity)),
            PredicateOp::Not => !self.children().iter().all(|child| child.matches(entity)),
            op => {
                let field = self
                    .attribute
                    .as_deref()
                    .and_then(|attribute| entity.get(attribute))
                    .unwrap_or(&Value::Null);
                let operand = self.value.as_ref().unwrap_or(&Value::Null);
                compare_leaf(op, field, operand)
            }
        }
    }
}

fn compare_leaf(op: PredicateOp, field: &Value, operand: &Value) -> bool {
    match op {
        PredicateOp::IsNull => field.is_null(),
        PredicateOp::NotNull => !field.is_null(),
        _ if field.is_null() => false,
        PredicateOp::Eq => values_equal(field, operand),
        PredicateOp::Neq => !operand.is_null() && !values_equal(field, operand),
        PredicateOp::Gt => compare_values(field, operand) == Some(Ordering::Greater),
        PredicateOp::Gte => matches!(
            compare_values(field, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        PredicateOp::Lt => compare_values(field, operand) == Some(Ordering::Less),
        PredicateOp::Lte => matches!(
            compare_values(field, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        PredicateOp::Like => like(field, operand, false),
        PredicateOp::ILike => like(field, operand, true),
        PredicateOp::In => in_list(field, operand),
        PredicateOp::NotIn => operand.is_array() && !in_list(field, operand),
        PredicateOp::And | PredicateOp::Or | PredicateOp::Not => false,
    }
}

/// Equality with numeric coercion, so `1` equals `1.0`.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Orders two scalar values of the same kind. Mixed kinds are unordered.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some(x.as_f64()?.total_cmp(&y.as_f64()?)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn in_list(field: &Value, operand: &Value) -> bool {
    operand
        .as_array()
        .is_some_and(|items| items.iter().any(|item| values_equal(field, item)))
}

fn like(field: &Value, operand: &Value, case_insensitive: bool) -> bool {
    match (field.as_str(), operand.as_str()) {
        (Some(text), Some(pattern)) => like_matches(text, pattern, case_insensitive),
        _ => false,
    }
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` any single one.
#[must_use]
pub fn like_matches(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    match like_regex(pattern, case_insensitive) {
        Ok(re) => re.is_match(text),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "unusable LIKE pattern");
            false
        }
    }
}

/// Translates a SQL `LIKE` pattern into an anchored regex.
fn like_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut source = String::from(if case_insensitive { "(?is)^" } else { "(?s)^" });
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source)
}

/// AND-combines two optional fragments. Either alone is returned unchanged.
#[must_use]
pub fn conjoin(left: Option<PredicateNode>, right: Option<PredicateNode>) -> Option<PredicateNode> {
    match (left, right) {
        (Some(l), Some(r)) => Some(PredicateNode::and(vec![l, r])),
        (l, r) => l.or(r),
    }
}

// ---------------------------------------------------------------------------
// StructuredFilter
// ---------------------------------------------------------------------------

/// A single ordering instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Client-facing query description: conditions, sort, window, projection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredFilter {
    /// Equality conditions. A `null` value tests for null.
    #[serde(rename = "where")]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub r#where: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub predicate: Option<PredicateNode>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sort: Vec<SortKey>,
    /// 1-based page number.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub page_size: Option<u64>,
    /// Field projection. `None` selects every field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attributes: Option<Vec<String>>,
    /// Field for `count` to count distinct values of.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub distinct: Option<String>,
}

impl StructuredFilter {
    /// Filter holding only an equality map.
    #[must_use]
    pub fn where_eq<I, K>(conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            r#where: Some(conditions.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            ..Self::default()
        }
    }

    /// Translates the equality map and predicate into one fragment.
    ///
    /// Returns `None` when the filter carries no condition at all.
    #[must_use]
    pub fn to_predicate(&self) -> Option<PredicateNode> {
        let equalities = self.r#where.as_ref().and_then(|conditions| {
            let mut leaves: Vec<PredicateNode> = conditions
                .iter()
                .map(|(field, value)| {
                    if value.is_null() {
                        PredicateNode::is_null(field.clone())
                    } else {
                        PredicateNode::equals(field.clone(), value.clone())
                    }
                })
                .collect();
            match leaves.len() {
                0 => None,
                1 => leaves.pop(),
                _ => Some(PredicateNode::and(leaves)),
            }
        });
        conjoin(equalities, self.predicate.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
