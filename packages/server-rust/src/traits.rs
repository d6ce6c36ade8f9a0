use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crudkit_core::{Entity, Validator};
use serde_json::Value;

use crate::query::{ConcreteQuery, Selection};

// ---------------------------------------------------------------------------
// EntityMetadata
// ---------------------------------------------------------------------------

/// Declarative facts about an entity that the engine needs at runtime.
#[derive(Clone)]
pub struct EntityMetadata {
    /// Display name, e.g. `"User"`. Also used as a validation group.
    pub name: String,
    /// Query alias (table name). Scopes cache keys and invalidation.
    pub alias: String,
    /// Primary-key field names. Composite keys list every field.
    pub primary_keys: Vec<String>,
    /// Column set on soft delete. `None` disables soft delete.
    pub soft_delete_column: Option<String>,
    pub validator: Option<Arc<dyn Validator>>,
}

impl EntityMetadata {
    /// Metadata with a single `id` primary key and no validator.
    #[must_use]
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            primary_keys: vec!["id".to_string()],
            soft_delete_column: None,
            validator: None,
        }
    }

    #[must_use]
    pub fn primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete_column = Some(column.into());
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn has_composite_key(&self) -> bool {
        self.primary_keys.len() > 1
    }
}

impl fmt::Debug for EntityMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMetadata")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("primary_keys", &self.primary_keys)
            .field("soft_delete_column", &self.soft_delete_column)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Store capabilities
// ---------------------------------------------------------------------------

/// Batch options for [`Repository::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Maximum number of entities written per round trip.
    pub chunk: usize,
}

/// Entity store for one entity type.
/// Implementations: relational stores (external), memory (tests and demos).
#[async_trait]
pub trait Repository: Send + Sync {
    fn metadata(&self) -> &EntityMetadata;

    /// Build an empty query bound to this repository's executor.
    fn new_query(&self) -> ConcreteQuery;

    /// Insert or update entities, returning them as stored.
    async fn save(&self, entities: Vec<Entity>, options: SaveOptions)
        -> anyhow::Result<Vec<Entity>>;

    /// Hard-delete entities, returning them as they were.
    async fn remove(&self, entities: Vec<Entity>) -> anyhow::Result<Vec<Entity>>;

    /// Mark entities deleted via the soft-delete column.
    async fn soft_remove(&self, entities: Vec<Entity>) -> anyhow::Result<Vec<Entity>>;

    /// Clear the soft-delete column of previously soft-removed entities.
    async fn recover(&self, entities: Vec<Entity>) -> anyhow::Result<Vec<Entity>>;

    /// Result cache backing store, if the repository's connection has one.
    fn cache_store(&self) -> Option<Arc<dyn CacheStore>> {
        None
    }
}

/// Executes a [`Selection`] against the backing store.
///
/// `count` and `count_distinct` ignore ordering, the window and the
/// projection: they count every row the condition and deleted scope admit.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch(&self, selection: &Selection) -> anyhow::Result<Vec<Entity>>;

    async fn count(&self, selection: &Selection) -> anyhow::Result<u64>;

    async fn count_distinct(&self, selection: &Selection, field: &str) -> anyhow::Result<u64>;

    /// Rows of the window plus the total count. Stores that can do both in
    /// one round trip should override this.
    async fn fetch_and_count(&self, selection: &Selection) -> anyhow::Result<(Vec<Entity>, u64)> {
        let rows = self.fetch(selection).await?;
        let total = self.count(selection).await?;
        Ok((rows, total))
    }
}

/// Key-value store for cached query results.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> anyhow::Result<()>;

    /// Delete every key matching a SQL `LIKE` pattern. Returns the number removed.
    async fn delete_matching(&self, pattern: &str) -> anyhow::Result<u64>;
}

/// Store failure caused by a unique-constraint violation.
///
/// Repositories return it inside `anyhow::Error` so callers can downcast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate key value violates unique constraint \"{constraint}\"")]
pub struct DuplicateKeyError {
    pub constraint: String,
    /// Store-provided detail, e.g. `Key (email)=(a@b.c) already exists.`
    pub detail: String,
}
