//! Declarative entity validation.
//!
//! An [`EntitySchema`] lists the fields an entity may carry and the rules
//! each field must satisfy. Rules are tagged with validation groups
//! (`"create"`, `"update"`, `"custom"`, the entity name, ...). A rule with
//! no groups always applies. Fields the schema does not declare are rejected.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::values_equal;
use crate::types::Entity;

/// Validation group applied by `create`.
pub const GROUP_CREATE: &str = "create";
/// Validation group applied by `update`.
pub const GROUP_UPDATE: &str = "update";
/// Validation group applied to the params of plain custom endpoints.
pub const GROUP_CUSTOM: &str = "custom";
/// Validation group applied to the params of query-backed custom endpoints.
pub const GROUP_CUSTOM_WITH_QUERY: &str = "custom-with-query";

/// A single field-level violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub property: String,
    /// Machine-readable rule name, e.g. `"maxLength"`.
    pub constraint: String,
    pub message: String,
}

/// Validates a target object under a set of named groups.
pub trait Validator: Send + Sync {
    /// Returns every violation found. An empty vector means valid.
    fn validate(&self, target: &Entity, groups: &[&str]) -> Vec<FieldViolation>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    fn constraint(self) -> &'static str {
        match self {
            Self::String => "isString",
            Self::Number => "isNumber",
            Self::Integer => "isInt",
            Self::Boolean => "isBoolean",
            Self::Object => "isObject",
            Self::Array => "isArray",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    Type(FieldType),
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Pattern(Regex),
    OneOf(Vec<Value>),
}

impl Rule {
    /// Checks a present, non-null value. Returns `(constraint, message)` on failure.
    fn check(&self, property: &str, value: &Value) -> Option<(&'static str, String)> {
        let length = || {
            value
                .as_str()
                .map(|s| s.chars().count())
                .or_else(|| value.as_array().map(Vec::len))
        };
        match self {
            Self::Required => None,
            Self::Type(kind) => (!kind.accepts(value)).then(|| {
                (
                    kind.constraint(),
                    format!("{property} failed the {} check", kind.constraint()),
                )
            }),
            Self::MinLength(min) => length().filter(|len| len < min).map(|_| {
                (
                    "minLength",
                    format!("{property} must be longer than or equal to {min} characters"),
                )
            }),
            Self::MaxLength(max) => length().filter(|len| len > max).map(|_| {
                (
                    "maxLength",
                    format!("{property} must be shorter than or equal to {max} characters"),
                )
            }),
            Self::Min(min) => value.as_f64().filter(|n| n < min).map(|_| {
                ("min", format!("{property} must not be less than {min}"))
            }),
            Self::Max(max) => value.as_f64().filter(|n| n > max).map(|_| {
                ("max", format!("{property} must not be greater than {max}"))
            }),
            Self::Pattern(re) => {
                let ok = value.as_str().is_some_and(|s| re.is_match(s));
                (!ok).then(|| {
                    (
                        "matches",
                        format!("{property} must match {} regular expression", re.as_str()),
                    )
                })
            }
            Self::OneOf(allowed) => {
                let ok = allowed.iter().any(|candidate| values_equal(candidate, value));
                (!ok).then(|| {
                    (
                        "isIn",
                        format!("{property} must be one of the following values: {}", join(allowed)),
                    )
                })
            }
        }
    }
}

fn join(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
struct GroupedRule {
    rule: Rule,
    groups: Vec<String>,
}

impl GroupedRule {
    fn applies(&self, groups: &[&str]) -> bool {
        self.groups.is_empty() || self.groups.iter().any(|g| groups.contains(&g.as_str()))
    }
}

// ---------------------------------------------------------------------------
// FieldDef
// ---------------------------------------------------------------------------

/// Single field definition within a schema.
///
/// Rules added after [`FieldDef::only`] are restricted to those groups.
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    rules: Vec<GroupedRule>,
    active_groups: Vec<String>,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            active_groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Restricts the rules added next to the given groups.
    #[must_use]
    pub fn only<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a rule under the currently active groups.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(GroupedRule {
            rule,
            groups: self.active_groups.clone(),
        });
        self
    }

    #[must_use]
    pub fn required(self) -> Self {
        self.rule(Rule::Required)
    }

    #[must_use]
    pub fn kind(self, kind: FieldType) -> Self {
        self.rule(Rule::Type(kind))
    }

    #[must_use]
    pub fn min_length(self, min: usize) -> Self {
        self.rule(Rule::MinLength(min))
    }

    #[must_use]
    pub fn max_length(self, max: usize) -> Self {
        self.rule(Rule::MaxLength(max))
    }

    #[must_use]
    pub fn min(self, min: f64) -> Self {
        self.rule(Rule::Min(min))
    }

    #[must_use]
    pub fn max(self, max: f64) -> Self {
        self.rule(Rule::Max(max))
    }

    #[must_use]
    pub fn pattern(self, re: Regex) -> Self {
        self.rule(Rule::Pattern(re))
    }

    #[must_use]
    pub fn one_of(self, allowed: Vec<Value>) -> Self {
        self.rule(Rule::OneOf(allowed))
    }

    fn check(&self, value: Option<&Value>, groups: &[&str], out: &mut Vec<FieldViolation>) {
        let mut active = self.rules.iter().filter(|r| r.applies(groups)).peekable();
        if active.peek().is_none() {
            return;
        }
        match value {
            None | Some(Value::Null) => {
                if self
                    .rules
                    .iter()
                    .any(|r| matches!(r.rule, Rule::Required) && r.applies(groups))
                {
                    out.push(FieldViolation {
                        property: self.name.clone(),
                        constraint: "isDefined".to_string(),
                        message: format!("{} should not be null or undefined", self.name),
                    });
                }
            }
            Some(value) => {
                for grouped in active {
                    if let Some((constraint, message)) = grouped.rule.check(&self.name, value) {
                        out.push(FieldViolation {
                            property: self.name.clone(),
                            constraint: constraint.to_string(),
                            message,
                        });
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EntitySchema
// ---------------------------------------------------------------------------

/// Schema definition for an entity or a custom request shape.
#[derive(Debug, Clone, Default)]
pub struct EntitySchema {
    fields: Vec<FieldDef>,
    allow_unknown: bool,
}

impl EntitySchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Accept properties the schema does not declare.
    #[must_use]
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldDef::name)
    }
}

impl Validator for EntitySchema {
    fn validate(&self, target: &Entity, groups: &[&str]) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        if !self.allow_unknown {
            for property in target.keys() {
                if !self.fields.iter().any(|f| f.name == *property) {
                    violations.push(FieldViolation {
                        property: property.clone(),
                        constraint: "whitelistValidation".to_string(),
                        message: format!("property {property} should not exist"),
                    });
                }
            }
        }

        for field in &self.fields {
            field.check(target.get(&field.name), groups, &mut violations);
        }

        violations
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entity(value: Value) -> Entity {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn user_schema() -> EntitySchema {
        EntitySchema::new()
            .field(FieldDef::new("id").kind(FieldType::Integer))
            .field(
                FieldDef::new("name")
                    .kind(FieldType::String)
                    .max_length(5)
                    .only([GROUP_CREATE])
                    .required(),
            )
            .field(FieldDef::new("role").one_of(vec![json!("admin"), json!("user")]))
            .field(FieldDef::new("email").pattern(Regex::new(r"^\S+@\S+$").unwrap()))
    }

    #[test]
    fn valid_entity_has_no_violations() {
        let errors = user_schema().validate(
            &entity(json!({"name": "ann", "role": "user", "email": "a@b.c"})),
            &[GROUP_CREATE],
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn required_rule_respects_groups() {
        let schema = user_schema();
        let target = entity(json!({"role": "user"}));

        let on_create = schema.validate(&target, &[GROUP_CREATE]);
        assert_eq!(on_create.len(), 1);
        assert_eq!(on_create[0].constraint, "isDefined");

        assert!(schema.validate(&target, &[GROUP_UPDATE]).is_empty());
    }

    #[test]
    fn unknown_property_is_forbidden() {
        let errors = user_schema().validate(&entity(json!({"name": "ann", "x": 1})), &[]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].property, "x");
        assert_eq!(errors[0].constraint, "whitelistValidation");

        let open = EntitySchema::new().allow_unknown();
        assert!(open.validate(&entity(json!({"x": 1})), &[]).is_empty());
    }

    #[test]
    fn reports_each_failing_rule() {
        let errors = user_schema().validate(
            &entity(json!({"id": "nope", "name": "toolong", "role": "root", "email": "x"})),
            &[GROUP_CREATE],
        );
        let constraints: Vec<&str> = errors.iter().map(|e| e.constraint.as_str()).collect();

        assert_eq!(constraints, vec!["isInt", "maxLength", "isIn", "matches"]);
    }

    #[test]
    fn numeric_bounds() {
        let schema = EntitySchema::new().field(FieldDef::new("age").min(0.0).max(150.0));

        assert!(schema.validate(&entity(json!({"age": 30})), &[]).is_empty());
        assert_eq!(schema.validate(&entity(json!({"age": -1})), &[])[0].constraint, "min");
        assert_eq!(schema.validate(&entity(json!({"age": 200})), &[])[0].constraint, "max");
    }
}
