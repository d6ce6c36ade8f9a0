//! Concrete queries: a [`Selection`] bound to one repository's executor.
//!
//! A [`ConcreteQuery`] is built by the composer, may be reshaped by a custom
//! handler, and is finally run through one of its terminal methods. It is
//! cheap to clone; a clone is an independent query sharing the executor.

pub mod compose;
pub mod render;
pub mod selection;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crudkit_core::{conjoin, Entity, PredicateNode, SortDirection, SortKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

pub use compose::{compose, QueryOptions};
pub use render::{render, RenderedQuery};
pub use selection::{DeletedScope, Selection};

use crate::traits::{CacheStore, EntityMetadata, QueryExecutor};

/// Result-cache instruction attached to a query.
#[derive(Clone)]
pub struct CacheAnnotation {
    pub store: Arc<dyn CacheStore>,
    pub key: String,
    pub ttl: Duration,
}

impl fmt::Debug for CacheAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheAnnotation")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// An executable query against one repository.
#[derive(Clone)]
pub struct ConcreteQuery {
    alias: String,
    soft_delete_column: Option<String>,
    executor: Arc<dyn QueryExecutor>,
    selection: Selection,
    cache: Option<CacheAnnotation>,
}

impl fmt::Debug for ConcreteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcreteQuery")
            .field("alias", &self.alias)
            .field("selection", &self.selection)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ConcreteQuery {
    /// Empty query selecting every live row of the entity.
    #[must_use]
    pub fn new(metadata: &EntityMetadata, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            alias: metadata.alias.clone(),
            soft_delete_column: metadata.soft_delete_column.clone(),
            executor,
            selection: Selection::default(),
            cache: None,
        }
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    #[must_use]
    pub fn cache_key(&self) -> Option<&str> {
        self.cache.as_ref().map(|c| c.key.as_str())
    }

    // -- builders ----------------------------------------------------------

    /// AND-combines `node` with the current condition.
    #[must_use]
    pub fn and_where(mut self, node: PredicateNode) -> Self {
        self.selection.condition = conjoin(self.selection.condition.take(), Some(node));
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.selection.order.push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.selection.skip = Some(n);
        self
    }

    #[must_use]
    pub fn take(mut self, n: u64) -> Self {
        self.selection.take = Some(n);
        self
    }

    #[must_use]
    pub fn select(mut self, attributes: Vec<String>) -> Self {
        self.selection.attributes = Some(attributes);
        self
    }

    #[must_use]
    pub fn deleted(mut self, scope: DeletedScope) -> Self {
        self.selection.deleted = scope;
        self
    }

    #[must_use]
    pub fn with_deleted(self) -> Self {
        self.deleted(DeletedScope::Include)
    }

    #[must_use]
    pub fn cache(mut self, store: Arc<dyn CacheStore>, key: String, ttl: Duration) -> Self {
        self.cache = Some(CacheAnnotation { store, key, ttl });
        self
    }

    /// Copy of this query that counts the same rows: no ordering, window,
    /// projection or cache annotation.
    #[must_use]
    pub fn for_count(&self) -> Self {
        let mut query = self.clone();
        query.selection.order.clear();
        query.selection.skip = None;
        query.selection.take = None;
        query.selection.attributes = None;
        query.cache = None;
        query
    }

    // -- inspection --------------------------------------------------------

    #[must_use]
    pub fn render(&self) -> RenderedQuery {
        render(&self.alias, self.soft_delete_column.as_deref(), &self.selection)
    }

    /// `true` when the condition holds no field comparison at all.
    #[must_use]
    pub fn has_empty_condition(&self) -> bool {
        !self
            .selection
            .condition
            .as_ref()
            .is_some_and(PredicateNode::has_comparison)
    }

    // -- terminals ---------------------------------------------------------

    /// Rows of the window.
    ///
    /// # Errors
    ///
    /// Returns the executor's error. Cache failures never surface.
    pub async fn get_many(&self) -> anyhow::Result<Vec<Entity>> {
        self.cached(|| self.executor.fetch(&self.selection)).await
    }

    /// Number of rows the condition admits, ignoring the window.
    ///
    /// # Errors
    ///
    /// Returns the executor's error. Cache failures never surface.
    pub async fn get_count(&self) -> anyhow::Result<u64> {
        self.cached(|| self.executor.count(&self.selection)).await
    }

    /// Number of distinct non-null values of `field` among admitted rows.
    ///
    /// # Errors
    ///
    /// Returns the executor's error. Cache failures never surface.
    pub async fn get_distinct_count(&self, field: &str) -> anyhow::Result<u64> {
        self.cached(|| self.executor.count_distinct(&self.selection, field))
            .await
    }

    /// Rows of the window together with the total count.
    ///
    /// # Errors
    ///
    /// Returns the executor's error. Cache failures never surface.
    pub async fn get_many_and_count(&self) -> anyhow::Result<(Vec<Entity>, u64)> {
        self.cached(|| self.executor.fetch_and_count(&self.selection))
            .await
    }

    async fn cached<T, F, Fut>(&self, produce: F) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let Some(cache) = &self.cache else {
            return produce().await;
        };

        match cache.store.get(&cache.key).await {
            Ok(Some(hit)) => match serde_json::from_value(hit) {
                Ok(value) => {
                    debug!(key = %cache.key, "query cache hit");
                    return Ok(value);
                }
                Err(err) => warn!(key = %cache.key, error = %err, "discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key = %cache.key, "query cache miss"),
            Err(err) => warn!(key = %cache.key, error = %err, "cache read failed, treating as miss"),
        }

        let value = produce().await?;
        match serde_json::to_value(&value) {
            Ok(encoded) => {
                if let Err(err) = cache.store.set(&cache.key, encoded, cache.ttl).await {
                    warn!(key = %cache.key, error = %err, "cache write failed");
                }
            }
            Err(err) => warn!(key = %cache.key, error = %err, "cache encode failed"),
        }
        Ok(value)
    }
}
