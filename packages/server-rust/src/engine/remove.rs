//! `remove`: hard or soft delete of the matched rows.

use std::sync::Arc;

use crudkit_core::{primary_key_map, QueryOptionsPatch, RemoveOutput, RemoveParams};
use serde_json::Value;
use tracing::debug;

use super::descriptor::OperationFlags;
use super::handler::{Handler, Request};
use super::state::OperationState;
use crate::cache::CacheNamespace;
use crate::query::ConcreteQuery;
use crate::service::operation::{CrudError, CrudErrorKind, OperationError};

/// Query constraints shared by `remove` and `restore`.
pub(crate) fn constraints() -> QueryOptionsPatch {
    QueryOptionsPatch {
        is_disable_order_by: Some(true),
        is_disable_pagination: Some(true),
        is_disable_attributes: Some(true),
        ..QueryOptionsPatch::default()
    }
}

pub(crate) async fn run(
    state: &OperationState,
    handler: &dyn Handler<ConcreteQuery, RemoveParams>,
    request: Request<RemoveParams>,
) -> Result<Value, OperationError> {
    let flags = state.flags(&request.payload);
    let query = state.compose(&constraints(), request.params.query.as_ref(), &request.payload)?;

    let lazy = handler.handle(query, Arc::new(request)).await?;
    lazy.resolve(|query| execute(state, query, flags)).await
}

fn failed(err: &anyhow::Error) -> CrudError {
    CrudError::store_failure(CrudErrorKind::FailedDelete, "Failed to remove entity.", err)
}

/// Default remove executor.
pub(crate) async fn execute(
    state: &OperationState,
    query: ConcreteQuery,
    flags: OperationFlags,
) -> Result<RemoveOutput, OperationError> {
    if query.has_empty_condition() {
        return Err(CrudError::validation("Entity remove condition is empty.").into());
    }

    let entities = query.get_many().await.map_err(|err| failed(&err))?;
    if entities.is_empty() {
        return Err(CrudError::new(CrudErrorKind::EntityNotFound, "Entity not found.").into());
    }
    if !flags.allow_multiple && entities.len() > 1 {
        return Err(CrudError::validation("You can remove only one entity at a time.").into());
    }

    let repository = state.repository();
    let primary_keys = &repository.metadata().primary_keys;
    let deleted = entities
        .iter()
        .map(|entity| primary_key_map(entity, primary_keys))
        .collect();

    let removal = if flags.soft_delete {
        repository.soft_remove(entities.clone()).await
    } else {
        repository.remove(entities.clone()).await
    };
    removal.map_err(|err| failed(&err))?;

    debug!(
        alias = %repository.metadata().alias,
        count = entities.len(),
        soft = flags.soft_delete,
        "entities removed"
    );
    state
        .reset_cache(
            &flags,
            &[CacheNamespace::List, CacheNamespace::Count, CacheNamespace::View],
        )
        .await;

    Ok(RemoveOutput {
        deleted,
        entities: flags.return_entity.then_some(entities),
    })
}
