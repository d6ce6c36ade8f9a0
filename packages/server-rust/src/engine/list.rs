//! `list`: a page of rows, optionally with the total count.

use std::sync::Arc;
use std::time::Duration;

use crudkit_core::{ListOutput, ListParams, QueryOptionsPatch};
use serde_json::Value;
use tracing::debug;

use super::handler::{Handler, Request};
use super::state::OperationState;
use crate::cache::{derive_key, CacheNamespace, KeyScope};
use crate::query::ConcreteQuery;
use crate::service::operation::OperationError;

/// Options of the default list executor.
#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub with_count: bool,
    /// Fetch rows and count as two concurrent queries.
    pub parallel: bool,
    pub has_removed: bool,
    pub list_ttl: Option<Duration>,
    /// Lifetime of the separate count of a parallel list.
    pub count_ttl: Option<Duration>,
}

pub(crate) async fn run(
    state: &OperationState,
    handler: &dyn Handler<ConcreteQuery, ListParams>,
    request: Request<ListParams>,
) -> Result<Value, OperationError> {
    let flags = state.flags(&request.payload);
    let query = state.compose(
        &QueryOptionsPatch::default(),
        request.params.query.as_ref(),
        &request.payload,
    )?;
    let options = ListOptions {
        with_count: flags.list_with_count,
        parallel: flags.parallel,
        has_removed: request.params.has_removed,
        list_ttl: state.descriptor.cache.read,
        count_ttl: state.descriptor.cache.count,
    };

    let lazy = handler.handle(query, Arc::new(request)).await?;
    lazy.resolve(|query| execute(state, query, options)).await
}

/// Default list executor.
pub(crate) async fn execute(
    state: &OperationState,
    query: ConcreteQuery,
    options: ListOptions,
) -> Result<ListOutput, OperationError> {
    let mut query = query;
    if options.has_removed {
        query = query.with_deleted();
    }
    // Taken before the list cache annotation: the count query must not share it.
    let mut count_query = query.for_count();

    if let Some((store, ttl)) = state.cache_for(options.list_ttl) {
        // Rows alone and rows with their count are cached as different shapes.
        let scope = if options.with_count && !options.parallel {
            KeyScope::FullWithCount
        } else {
            KeyScope::Full
        };
        let key = derive_key(&query, &state.namespace(CacheNamespace::List), scope);
        query = query.cache(store, key, ttl);
    }

    if !options.with_count {
        return Ok(ListOutput {
            list: query.get_many().await?,
            count: None,
        });
    }

    if !options.parallel {
        let (list, count) = query.get_many_and_count().await?;
        return Ok(ListOutput {
            list,
            count: Some(count),
        });
    }

    if let Some((store, ttl)) = state.cache_for(options.count_ttl) {
        let key = derive_key(&count_query, &state.namespace(CacheNamespace::Count), KeyScope::WhereOnly);
        count_query = count_query.cache(store, key, ttl);
    }
    debug!(alias = query.alias(), "fetching rows and count concurrently");
    let (list, count) = tokio::try_join!(query.get_many(), count_query.get_count())?;
    Ok(ListOutput {
        list,
        count: Some(count),
    })
}
