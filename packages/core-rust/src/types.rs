use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored record as seen by the engine: a JSON object keyed by field name.
///
/// The store owns the record's lifecycle. The engine only reads fields,
/// merges patches and hands entities back to the repository.
pub type Entity = Map<String, Value>;

/// Authentication principal attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Unique identifier for the authenticated caller.
    pub id: String,
    /// Roles assigned to this principal for authorization checks.
    pub roles: Vec<String>,
}

/// Projects `entity` onto the given primary-key fields.
///
/// Fields missing from the entity are omitted rather than reported as null.
#[must_use]
pub fn primary_key_map(entity: &Entity, primary_keys: &[String]) -> Entity {
    primary_keys
        .iter()
        .filter_map(|key| entity.get(key).map(|value| (key.clone(), value.clone())))
        .collect()
}

/// Returns `fields` without any primary-key entry.
#[must_use]
pub fn strip_primary_keys(fields: &Entity, primary_keys: &[String]) -> Entity {
    fields
        .iter()
        .filter(|(field, _)| !primary_keys.iter().any(|pk| pk == *field))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}
