//! Canonical SQL-like rendering of a selection.
//!
//! The rendering is deterministic: the same selection always produces the
//! same text and parameter list. Cache keys hash it, and stores that speak
//! SQL can use it as a starting point.

use std::fmt::Write as _;

use crudkit_core::{PredicateNode, PredicateOp, SortDirection};
use serde_json::Value;

use super::selection::{DeletedScope, Selection};

/// Rendered query split into the parts cache keys choose between.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    /// WHERE body without the keyword. Empty when unconstrained.
    pub condition: String,
    /// ORDER BY / LIMIT / OFFSET, each prefixed with a space.
    pub tail: String,
    /// Projected column list. Empty when every field is selected.
    pub projection: String,
    /// Values bound to `:p0`, `:p1`, ... in order of appearance.
    pub params: Vec<Value>,
}

struct Renderer<'a> {
    alias: &'a str,
    params: Vec<Value>,
}

impl Renderer<'_> {
    fn column(&self, field: &str) -> String {
        format!("{}.{}", quote(self.alias), quote(field))
    }

    fn bind(&mut self, value: Value) -> String {
        let placeholder = format!(":p{}", self.params.len());
        self.params.push(value);
        placeholder
    }

    fn node(&mut self, node: &PredicateNode) -> String {
        let children = node.children.as_deref().unwrap_or(&[]);
        match node.op {
            PredicateOp::And | PredicateOp::Or => {
                if children.is_empty() {
                    return if node.op == PredicateOp::And { "1=1" } else { "1=0" }.to_string();
                }
                let joiner = if node.op == PredicateOp::And { " AND " } else { " OR " };
                let parts: Vec<String> = children.iter().map(|c| self.node(c)).collect();
                format!("({})", parts.join(joiner))
            }
            PredicateOp::Not => {
                let parts: Vec<String> = children.iter().map(|c| self.node(c)).collect();
                format!("NOT ({})", parts.join(" AND "))
            }
            PredicateOp::IsNull => format!("{} IS NULL", self.leaf_column(node)),
            PredicateOp::NotNull => format!("{} IS NOT NULL", self.leaf_column(node)),
            PredicateOp::In | PredicateOp::NotIn => {
                let column = self.leaf_column(node);
                let keyword = if node.op == PredicateOp::In { "IN" } else { "NOT IN" };
                let placeholder = self.bind(node.value.clone().unwrap_or(Value::Null));
                format!("{column} {keyword} ({placeholder})")
            }
            op => {
                let sql = match op {
                    PredicateOp::Eq => "=",
                    PredicateOp::Neq => "<>",
                    PredicateOp::Gt => ">",
                    PredicateOp::Gte => ">=",
                    PredicateOp::Lt => "<",
                    PredicateOp::Lte => "<=",
                    PredicateOp::Like => "LIKE",
                    _ => "ILIKE",
                };
                let column = self.leaf_column(node);
                let placeholder = self.bind(node.value.clone().unwrap_or(Value::Null));
                format!("{column} {sql} {placeholder}")
            }
        }
    }

    fn leaf_column(&self, node: &PredicateNode) -> String {
        self.column(node.attribute.as_deref().unwrap_or_default())
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Renders `selection` against the table `alias`.
#[must_use]
pub fn render(alias: &str, soft_delete_column: Option<&str>, selection: &Selection) -> RenderedQuery {
    let mut renderer = Renderer {
        alias,
        params: Vec::new(),
    };

    let mut clauses = Vec::new();
    if let Some(condition) = &selection.condition {
        clauses.push(renderer.node(condition));
    }
    if let Some(column) = soft_delete_column {
        match selection.deleted {
            DeletedScope::Exclude => clauses.push(format!("{} IS NULL", renderer.column(column))),
            DeletedScope::Only => clauses.push(format!("{} IS NOT NULL", renderer.column(column))),
            DeletedScope::Include => {}
        }
    }

    let mut tail = String::new();
    if !selection.order.is_empty() {
        let keys: Vec<String> = selection
            .order
            .iter()
            .map(|key| {
                let direction = match key.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{} {direction}", renderer.column(&key.field))
            })
            .collect();
        let _ = write!(tail, " ORDER BY {}", keys.join(", "));
    }
    if let Some(take) = selection.take {
        let _ = write!(tail, " LIMIT {take}");
    }
    if let Some(skip) = selection.skip {
        let _ = write!(tail, " OFFSET {skip}");
    }

    let projection = selection
        .attributes
        .as_ref()
        .map(|fields| {
            fields
                .iter()
                .map(|f| renderer.column(f))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    RenderedQuery {
        condition: clauses.join(" AND "),
        tail,
        projection,
        params: renderer.params,
    }
}

#[cfg(test)]
mod tests {
    use crudkit_core::SortKey;
    use serde_json::json;

    use super::*;

    #[test]
    fn renders_condition_with_placeholders() {
        let selection = Selection {
            condition: Some(PredicateNode::and(vec![
                PredicateNode::equals("name", json!("ann")),
                PredicateNode::leaf(PredicateOp::In, "role", json!(["a", "b"])),
            ])),
            ..Selection::default()
        };

        let rendered = render("user", Some("deletedAt"), &selection);
        assert_eq!(
            rendered.condition,
            r#"("user"."name" = :p0 AND "user"."role" IN (:p1)) AND "user"."deletedAt" IS NULL"#
        );
        assert_eq!(rendered.params, vec![json!("ann"), json!(["a", "b"])]);
        assert!(rendered.tail.is_empty());
    }

    #[test]
    fn renders_tail_and_projection() {
        let selection = Selection {
            order: vec![SortKey {
                field: "id".to_string(),
                direction: SortDirection::Desc,
            }],
            skip: Some(50),
            take: Some(25),
            attributes: Some(vec!["id".to_string()]),
            deleted: DeletedScope::Include,
            ..Selection::default()
        };

        let rendered = render("user", Some("deletedAt"), &selection);
        assert_eq!(rendered.condition, "");
        assert_eq!(rendered.tail, r#" ORDER BY "user"."id" DESC LIMIT 25 OFFSET 50"#);
        assert_eq!(rendered.projection, r#""user"."id""#);
    }

    #[test]
    fn quotes_embedded_quotes() {
        assert_eq!(quote(r#"a"b"#), r#""a""b""#);
    }
}
