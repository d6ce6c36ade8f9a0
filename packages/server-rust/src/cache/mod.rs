//! Result-cache keys and namespace invalidation.
//!
//! Keys have the form `{prefix}:{namespace}:{alias}:{digest}`, where the
//! digest is the first 128 bits of SHA-256 over `{fragment}.{params}`.
//! Invalidation never targets a single key: it drops every key of a
//! namespace for one alias with a `LIKE` scan.

pub mod memory;

use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::query::{ConcreteQuery, RenderedQuery};
use crate::traits::Repository;

/// Logical grouping of cached results, one per read operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    List,
    Count,
    View,
}

impl CacheNamespace {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Count => "count",
            Self::View => "view",
        }
    }

    /// Namespace with the engine prefix, e.g. `CRUD:list`.
    #[must_use]
    pub fn qualified(self, prefix: &str) -> String {
        format!("{prefix}:{}", self.as_str())
    }
}

/// Which part of the rendered query feeds the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// WHERE condition only. Counts use it: order and window never change a count.
    WhereOnly,
    /// WHERE condition, ordering, window and projection.
    Full,
    /// As `Full`, for entries that also carry the total count.
    FullWithCount,
}

fn fragment(rendered: &RenderedQuery, scope: KeyScope) -> String {
    match scope {
        KeyScope::WhereOnly => rendered.condition.clone(),
        KeyScope::Full => {
            let mut text = format!("{}{}", rendered.condition, rendered.tail);
            if !rendered.projection.is_empty() {
                let _ = write!(text, " SELECT {}", rendered.projection);
            }
            text
        }
        KeyScope::FullWithCount => format!("{} COUNT(*)", fragment(rendered, KeyScope::Full)),
    }
}

fn digest(fragment: &str, rendered: &RenderedQuery) -> String {
    let params = serde_json::to_string(&rendered.params).unwrap_or_default();
    let hash = Sha256::digest(format!("{fragment}.{params}").as_bytes());
    hex::encode(&hash[..16])
}

/// Deterministic cache key for `query` under `namespace` (e.g. `CRUD:list`).
#[must_use]
pub fn derive_key(query: &ConcreteQuery, namespace: &str, scope: KeyScope) -> String {
    let rendered = query.render();
    let fragment = fragment(&rendered, scope);
    format!("{namespace}:{}:{}", query.alias(), digest(&fragment, &rendered))
}

/// Key for a distinct count: WHERE-only, with the counted field mixed in so
/// it never collides with the plain count of the same condition.
#[must_use]
pub fn derive_distinct_key(query: &ConcreteQuery, namespace: &str, field: &str) -> String {
    let rendered = query.render();
    let fragment = format!("{} DISTINCT(\"{field}\")", fragment(&rendered, KeyScope::WhereOnly));
    format!("{namespace}:{}:{}", query.alias(), digest(&fragment, &rendered))
}

/// Drops every cached result of `namespaces` for the repository's alias.
///
/// Failures are logged and swallowed. Repositories without a cache store
/// are skipped.
pub async fn invalidate(repository: &dyn Repository, prefix: &str, namespaces: &[CacheNamespace]) {
    let Some(store) = repository.cache_store() else {
        return;
    };
    let alias = &repository.metadata().alias;

    for namespace in namespaces {
        let pattern = format!("{}:{alias}:%", namespace.qualified(prefix));
        match store.delete_matching(&pattern).await {
            Ok(removed) => debug!(%pattern, removed, "cache namespace invalidated"),
            Err(err) => warn!(%pattern, error = %err, "cache invalidation failed"),
        }
    }
}
