//! `count`: number of rows matching the composed query.

use std::sync::Arc;
use std::time::Duration;

use crudkit_core::{CountOutput, CountParams, QueryOptionsPatch};
use serde_json::Value;
use tracing::debug;

use super::handler::{Handler, Request};
use super::state::OperationState;
use crate::cache::{derive_distinct_key, derive_key, CacheNamespace, KeyScope};
use crate::query::ConcreteQuery;
use crate::service::operation::OperationError;

pub(crate) fn constraints() -> QueryOptionsPatch {
    QueryOptionsPatch {
        is_disable_order_by: Some(true),
        is_disable_attributes: Some(true),
        ..QueryOptionsPatch::default()
    }
}

/// Options of the default count executor.
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    pub has_removed: bool,
    /// Count distinct non-null values of this field instead of rows.
    pub distinct: Option<String>,
    pub ttl: Option<Duration>,
}

pub(crate) async fn run(
    state: &OperationState,
    handler: &dyn Handler<ConcreteQuery, CountParams>,
    request: Request<CountParams>,
) -> Result<Value, OperationError> {
    let query = state.compose(&constraints(), request.params.query.as_ref(), &request.payload)?;
    let options = CountOptions {
        has_removed: request.params.has_removed,
        distinct: request.params.query.as_ref().and_then(|q| q.distinct.clone()),
        ttl: state.descriptor.cache.read,
    };

    let lazy = handler.handle(query, Arc::new(request)).await?;
    lazy.resolve(|query| execute(state, query, &options)).await
}

/// Default count executor.
pub(crate) async fn execute(
    state: &OperationState,
    query: ConcreteQuery,
    options: &CountOptions,
) -> Result<CountOutput, OperationError> {
    let mut query = query;
    if options.has_removed {
        query = query.with_deleted();
    }

    if let Some((store, ttl)) = state.cache_for(options.ttl) {
        let namespace = state.namespace(CacheNamespace::Count);
        let key = match &options.distinct {
            Some(field) => derive_distinct_key(&query, &namespace, field),
            None => derive_key(&query, &namespace, KeyScope::WhereOnly),
        };
        query = query.cache(store, key, ttl);
    }

    let count = match &options.distinct {
        Some(field) => {
            debug!(alias = query.alias(), field = %field, "counting distinct values");
            query.get_distinct_count(field).await?
        }
        None => query.get_count().await?,
    };
    Ok(CountOutput { count })
}

#[cfg(test)]
mod tests {
    use crudkit_core::{AuthorizationFilter, PredicateNode, StructuredFilter};
    use serde_json::json;

    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::engine::fixtures::{call, call_as, engine, users, users_with_cache};
    use crate::engine::{Endpoint, LazyResult, OperationDescriptor};

    #[tokio::test]
    async fn counts_matching_rows() {
        let repo = users();
        let endpoint = engine().count(OperationDescriptor::new(repo.clone()));

        let all = endpoint.call(call("count", json!({}))).await.unwrap();
        assert_eq!(all, json!({"count": 5}));

        let adults = endpoint
            .call(call("count", json!({"query": {"where": {"tenant": "a"}}})))
            .await
            .unwrap();
        assert_eq!(adults, json!({"count": 3}));
    }

    #[tokio::test]
    async fn pagination_never_shrinks_the_count() {
        let endpoint = engine().count(OperationDescriptor::new(users()));

        let value = endpoint
            .call(call("count", json!({"query": {"page": 2, "pageSize": 2}})))
            .await
            .unwrap();
        assert_eq!(value, json!({"count": 5}));
    }

    #[tokio::test]
    async fn authorization_narrows_the_count() {
        let endpoint = engine().count(OperationDescriptor::new(users()));
        let auth = AuthorizationFilter {
            query: Some(StructuredFilter::where_eq([("tenant", json!("b"))])),
            ..AuthorizationFilter::default()
        };

        let value = endpoint.call(call_as("count", json!({}), auth)).await.unwrap();
        assert_eq!(value, json!({"count": 2}));
    }

    #[tokio::test]
    async fn distinct_and_removed_rows() {
        let repo = users();
        repo.insert_rows(vec![json!({"id": 6, "tenant": "c", "deletedAt": 1})]);
        let endpoint = engine().count(OperationDescriptor::new(repo));

        let distinct = endpoint
            .call(call("count", json!({"query": {"distinct": "tenant"}})))
            .await
            .unwrap();
        assert_eq!(distinct, json!({"count": 2}));

        let with_removed = endpoint
            .call(call("count", json!({"query": {"distinct": "tenant"}, "hasRemoved": true})))
            .await
            .unwrap();
        assert_eq!(with_removed, json!({"count": 3}));
    }

    #[tokio::test]
    async fn cached_count_is_keyed_on_the_condition() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = users_with_cache(store.clone());
        let endpoint = engine().count(OperationDescriptor::new(repo.clone()).cache_ttl(Duration::from_secs(60)));

        endpoint.call(call("count", json!({}))).await.unwrap();
        endpoint.call(call("count", json!({}))).await.unwrap();

        assert_eq!(repo.stats().counts, 1);
        assert_eq!(store.keys().len(), 1);
        assert!(store.keys()[0].starts_with("CRUD:count:user:"));
    }

    #[tokio::test]
    async fn handler_can_reshape_the_query() {
        let only_first = |query: ConcreteQuery, _req: Arc<Request<CountParams>>| async move {
            Ok::<_, OperationError>(LazyResult::Query(
                query.and_where(PredicateNode::equals("id", json!(1))),
            ))
        };
        let endpoint = engine()
            .count(OperationDescriptor::new(users()))
            .with_handler(only_first);

        let value = endpoint.call(call("count", json!({}))).await.unwrap();
        assert_eq!(value, json!({"count": 1}));
    }
}
