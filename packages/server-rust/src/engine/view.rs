//! `view`: exactly one row.

use std::sync::Arc;
use std::time::Duration;

use crudkit_core::{QueryOptionsPatch, ViewOutput, ViewParams};
use serde_json::{json, Value};

use super::handler::{Handler, Request};
use super::state::OperationState;
use crate::cache::{derive_key, CacheNamespace, KeyScope};
use crate::query::ConcreteQuery;
use crate::service::operation::{CrudError, CrudErrorKind, OperationError};

pub(crate) fn constraints() -> QueryOptionsPatch {
    QueryOptionsPatch {
        is_disable_order_by: Some(true),
        is_disable_pagination: Some(true),
        ..QueryOptionsPatch::default()
    }
}

/// Options of the default view executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewOptions {
    pub has_removed: bool,
    pub ttl: Option<Duration>,
}

pub(crate) async fn run(
    state: &OperationState,
    handler: &dyn Handler<ConcreteQuery, ViewParams>,
    request: Request<ViewParams>,
) -> Result<Value, OperationError> {
    let query = state.compose(&constraints(), request.params.query.as_ref(), &request.payload)?;
    let options = ViewOptions {
        has_removed: request.params.has_removed,
        ttl: state.descriptor.cache.read,
    };

    let lazy = handler.handle(query, Arc::new(request)).await?;
    lazy.resolve(|query| execute(state, query, options)).await
}

/// Default view executor. Fetches at most two rows to tell "one" from "many".
pub(crate) async fn execute(
    state: &OperationState,
    query: ConcreteQuery,
    options: ViewOptions,
) -> Result<ViewOutput, OperationError> {
    if query.has_empty_condition() {
        return Err(CrudError::validation("Entity view condition is empty.").into());
    }

    let mut query = query.take(2);
    if options.has_removed {
        query = query.with_deleted();
    }
    if let Some((store, ttl)) = state.cache_for(options.ttl) {
        let key = derive_key(&query, &state.namespace(CacheNamespace::View), KeyScope::Full);
        query = query.cache(store, key, ttl);
    }

    let mut targets = query.get_many().await?;
    if targets.len() > 1 {
        return Err(CrudError::validation("Entity condition invalid.")
            .with_payload(json!({ "count": targets.len() }))
            .into());
    }
    match targets.pop() {
        Some(entity) => Ok(ViewOutput { entity }),
        None => Err(CrudError::new(CrudErrorKind::EntityNotFound, "Entity not found.").into()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::engine::fixtures::{call, crud_error, engine, users, users_with_cache};
    use crate::engine::{Endpoint, OperationDescriptor};

    #[tokio::test]
    async fn returns_the_single_match() {
        let endpoint = engine().view(OperationDescriptor::new(users()));

        let value = endpoint
            .call(call("view", json!({"query": {"where": {"id": 2}}})))
            .await
            .unwrap();
        assert_eq!(value["entity"]["name"], json!("u2"));
    }

    #[tokio::test]
    async fn empty_condition_fails_before_any_store_call() {
        let repo = users();
        let endpoint = engine().view(OperationDescriptor::new(repo.clone()));

        let err = crud_error(endpoint.call(call("view", json!({}))).await);
        assert_eq!(err.kind, CrudErrorKind::ValidationFailed);
        assert_eq!(err.message, "Entity view condition is empty.");
        assert_eq!(repo.stats().total(), 0);
    }

    #[tokio::test]
    async fn many_matches_are_a_validation_failure() {
        let endpoint = engine().view(OperationDescriptor::new(users()));

        let err = crud_error(
            endpoint
                .call(call("view", json!({"query": {"where": {"tenant": "a"}}})))
                .await,
        );
        assert_eq!(err.kind, CrudErrorKind::ValidationFailed);
        assert_eq!(err.payload, Some(json!({"count": 2})));
    }

    #[tokio::test]
    async fn no_match_is_not_found() {
        let endpoint = engine().view(OperationDescriptor::new(users()));

        let err = crud_error(
            endpoint
                .call(call("view", json!({"query": {"where": {"id": 99}}})))
                .await,
        );
        assert_eq!(err.kind, CrudErrorKind::EntityNotFound);
        assert_eq!(err.message, "Entity not found.");
    }

    #[tokio::test]
    async fn soft_deleted_rows_need_has_removed() {
        let repo = users();
        repo.insert_rows(vec![json!({"id": 6, "name": "gone", "deletedAt": 1})]);
        let endpoint = engine().view(OperationDescriptor::new(repo));
        let params = json!({"query": {"where": {"id": 6}}});

        let err = crud_error(endpoint.call(call("view", params.clone())).await);
        assert_eq!(err.kind, CrudErrorKind::EntityNotFound);

        let mut with_removed = params;
        with_removed["hasRemoved"] = json!(true);
        let value = endpoint.call(call("view", with_removed)).await.unwrap();
        assert_eq!(value["entity"]["name"], json!("gone"));
    }

    #[tokio::test]
    async fn cached_view_uses_the_view_namespace() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = users_with_cache(store.clone());
        let endpoint = engine().view(OperationDescriptor::new(repo.clone()).cache_ttl(Duration::from_secs(30)));
        let params = json!({"query": {"where": {"id": 1}}});

        endpoint.call(call("view", params.clone())).await.unwrap();
        endpoint.call(call("view", params)).await.unwrap();

        assert_eq!(repo.stats().fetches, 1);
        assert!(store.keys()[0].starts_with("CRUD:view:user:"));
    }
}
