//! Request parameter and response shapes for the seven standard operations.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so the JSON form
//! matches what RPC callers send (`hasRemoved`, `pageSize`, ...).

use serde::{Deserialize, Serialize};

use crate::filter::StructuredFilter;
use crate::types::Entity;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Params of the read operations: `count`, `list` and `view`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadParams {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<StructuredFilter>,
    /// Include soft-deleted rows.
    #[serde(default)]
    pub has_removed: bool,
}

pub type CountParams = ReadParams;
pub type ListParams = ReadParams;
pub type ViewParams = ReadParams;

/// A single entity or a batch, as sent to (and echoed back by) `create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreateFields {
    Many(Vec<Entity>),
    One(Entity),
}

impl CreateFields {
    #[must_use]
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Many(items) => items.len(),
            Self::One(_) => 1,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Entity> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }

    /// Rebuilds the same shape from saved entities: a batch stays a batch.
    #[must_use]
    pub fn reshape(&self, mut saved: Vec<Entity>) -> Self {
        match self {
            Self::Many(_) => Self::Many(saved),
            Self::One(_) => Self::One(saved.pop().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    pub fields: CreateFields,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParams {
    /// Partial entity. Primary-key fields are ignored.
    #[serde(default)]
    pub fields: Entity,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<StructuredFilter>,
}

/// Params of `remove` and `restore`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetParams {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<StructuredFilter>,
}

pub type RemoveParams = TargetParams;
pub type RestoreParams = TargetParams;

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountOutput {
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListOutput {
    pub list: Vec<Entity>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewOutput {
    pub entity: Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOutput {
    pub entity: CreateFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutput {
    pub entity: Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveOutput {
    /// Primary-key maps of the removed rows.
    pub deleted: Vec<Entity>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entities: Option<Vec<Entity>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreOutput {
    pub restored: Vec<Entity>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn create_fields_accepts_object_or_array() {
        let one: CreateParams = serde_json::from_value(json!({"fields": {"name": "a"}})).unwrap();
        let many: CreateParams =
            serde_json::from_value(json!({"fields": [{"name": "a"}, {"name": "b"}]})).unwrap();

        assert!(!one.fields.is_many());
        assert_eq!(one.fields.len(), 1);
        assert!(many.fields.is_many());
        assert_eq!(many.fields.len(), 2);
    }

    #[test]
    fn reshape_preserves_batch_shape() {
        let saved = vec![serde_json::Map::new()];
        let one = CreateFields::One(serde_json::Map::new());
        let many = CreateFields::Many(vec![]);

        assert!(matches!(one.reshape(saved.clone()), CreateFields::One(_)));
        assert!(matches!(many.reshape(saved), CreateFields::Many(items) if items.len() == 1));
    }

    #[test]
    fn read_params_default_has_removed_false() {
        let params: ReadParams = serde_json::from_value(json!({})).unwrap();
        assert!(!params.has_removed);
        assert!(params.query.is_none());
    }

    #[test]
    fn list_output_omits_absent_count() {
        let out = ListOutput {
            list: vec![],
            count: None,
        };
        assert_eq!(serde_json::to_value(out).unwrap(), json!({"list": []}));
    }
}
