//! `restore`: recover soft-deleted rows.

use std::sync::Arc;

use crudkit_core::{RestoreOutput, RestoreParams};
use serde_json::Value;
use tracing::debug;

use super::descriptor::OperationFlags;
use super::handler::{Handler, Request};
use super::remove;
use super::state::OperationState;
use crate::cache::CacheNamespace;
use crate::query::{ConcreteQuery, DeletedScope};
use crate::service::operation::{CrudError, CrudErrorKind, OperationError};

pub(crate) async fn run(
    state: &OperationState,
    handler: &dyn Handler<ConcreteQuery, RestoreParams>,
    request: Request<RestoreParams>,
) -> Result<Value, OperationError> {
    let flags = state.flags(&request.payload);
    let query = state.compose(
        &remove::constraints(),
        request.params.query.as_ref(),
        &request.payload,
    )?;

    let lazy = handler.handle(query, Arc::new(request)).await?;
    lazy.resolve(|query| execute(state, query, flags)).await
}

fn failed(err: &anyhow::Error) -> CrudError {
    CrudError::store_failure(CrudErrorKind::FailedRestore, "Failed to restore entity.", err)
}

/// Default restore executor. Only soft-deleted rows are candidates.
pub(crate) async fn execute(
    state: &OperationState,
    query: ConcreteQuery,
    flags: OperationFlags,
) -> Result<RestoreOutput, OperationError> {
    if query.has_empty_condition() {
        return Err(CrudError::validation("Entity restore condition is empty.").into());
    }

    let entities = query
        .deleted(DeletedScope::Only)
        .get_many()
        .await
        .map_err(|err| failed(&err))?;
    if entities.is_empty() {
        return Err(CrudError::new(CrudErrorKind::EntityNotFound, "Entity not found for restore.").into());
    }
    if !flags.allow_multiple && entities.len() > 1 {
        return Err(CrudError::validation("You can restore only one entity at a time.").into());
    }

    let repository = state.repository();
    let restored = repository.recover(entities).await.map_err(|err| failed(&err))?;

    debug!(alias = %repository.metadata().alias, count = restored.len(), "entities restored");
    state
        .reset_cache(
            &flags,
            &[CacheNamespace::List, CacheNamespace::Count, CacheNamespace::View],
        )
        .await;

    Ok(RestoreOutput { restored })
}
