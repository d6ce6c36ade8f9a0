//! The clonable description of what a concrete query selects.

use std::cmp::Ordering;

use crudkit_core::filter::compare_values;
use crudkit_core::{Entity, PredicateNode, SortDirection, SortKey};
use serde_json::Value;

/// Which rows a soft-delete column lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletedScope {
    /// Live rows only.
    #[default]
    Exclude,
    /// Live and soft-deleted rows.
    Include,
    /// Soft-deleted rows only.
    Only,
}

/// Condition, ordering, window, projection and deleted scope of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub condition: Option<PredicateNode>,
    pub order: Vec<SortKey>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    /// Projected fields. `None` selects every field.
    pub attributes: Option<Vec<String>>,
    pub deleted: DeletedScope,
}

impl Selection {
    /// Whether an in-memory row passes the condition and the deleted scope.
    #[must_use]
    pub fn admits(&self, entity: &Entity, soft_delete_column: Option<&str>) -> bool {
        let scope_ok = match (self.deleted, soft_delete_column) {
            (_, None) | (DeletedScope::Include, _) => true,
            (DeletedScope::Exclude, Some(column)) => entity.get(column).is_none_or(Value::is_null),
            (DeletedScope::Only, Some(column)) => entity.get(column).is_some_and(|v| !v.is_null()),
        };
        scope_ok
            && self
                .condition
                .as_ref()
                .is_none_or(|condition| condition.matches(entity))
    }

    /// Stable sort by the order keys. Nulls sort before other values.
    pub fn sort(&self, rows: &mut [Entity]) {
        if self.order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for key in &self.order {
                let left = a.get(&key.field).unwrap_or(&Value::Null);
                let right = b.get(&key.field).unwrap_or(&Value::Null);
                let ordering = match (left.is_null(), right.is_null()) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => compare_values(left, right).unwrap_or(Ordering::Equal),
                };
                let ordering = match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Applies `skip` and `take`.
    #[must_use]
    pub fn window<T>(&self, rows: Vec<T>) -> Vec<T> {
        let skip = self.skip.map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let take = self.take.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        rows.into_iter().skip(skip).take(take).collect()
    }

    /// Keeps only the projected fields.
    #[must_use]
    pub fn project(&self, entity: Entity) -> Entity {
        match &self.attributes {
            None => entity,
            Some(fields) => entity
                .into_iter()
                .filter(|(field, _)| fields.contains(field))
                .collect(),
        }
    }
}
