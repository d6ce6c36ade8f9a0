//! `update`: merge fields into exactly one row.

use std::sync::Arc;

use crudkit_core::schema::GROUP_UPDATE;
use crudkit_core::{strip_primary_keys, Entity, QueryOptionsPatch, UpdateOutput, UpdateParams};
use serde_json::{json, Value};
use tracing::debug;

use super::descriptor::OperationFlags;
use super::handler::{Handler, Request};
use super::state::OperationState;
use super::view::{self, ViewOptions};
use crate::cache::CacheNamespace;
use crate::query::ConcreteQuery;
use crate::service::operation::{CrudError, CrudErrorKind, OperationError};
use crate::traits::SaveOptions;

pub(crate) fn constraints() -> QueryOptionsPatch {
    QueryOptionsPatch {
        is_disable_order_by: Some(true),
        is_disable_pagination: Some(true),
        is_disable_attributes: Some(true),
        ..QueryOptionsPatch::default()
    }
}

/// What the default update executor consumes. A handler may replace either part.
#[derive(Debug, Clone)]
pub struct UpdateTarget {
    pub query: ConcreteQuery,
    /// Patch to merge, primary-key fields already removed.
    pub fields: Entity,
}

pub(crate) async fn run(
    state: &OperationState,
    handler: &dyn Handler<UpdateTarget, UpdateParams>,
    request: Request<UpdateParams>,
) -> Result<Value, OperationError> {
    let flags = state.flags(&request.payload);
    let query = state.compose(&constraints(), request.params.query.as_ref(), &request.payload)?;
    let fields = strip_primary_keys(
        &request.params.fields,
        &state.repository().metadata().primary_keys,
    );

    let lazy = handler
        .handle(UpdateTarget { query, fields }, Arc::new(request))
        .await?;
    lazy.resolve(|target| execute(state, target, flags)).await
}

fn failed(err: &anyhow::Error) -> CrudError {
    CrudError::store_failure(CrudErrorKind::FailedUpdate, "Failed to update entity.", err)
}

/// Default update executor: view, merge, validate, save.
pub(crate) async fn execute(
    state: &OperationState,
    target: UpdateTarget,
    flags: OperationFlags,
) -> Result<UpdateOutput, OperationError> {
    let UpdateTarget { query, fields } = target;
    if fields.is_empty() {
        return Err(CrudError::validation("Validation failed for entity, empty fields.").into());
    }

    let current = view::execute(state, query, ViewOptions::default())
        .await
        .map_err(|err| match err {
            OperationError::Internal(err) => OperationError::from(failed(&err)),
            other => other,
        })?
        .entity;
    let mut merged = current;
    merged.extend(fields);

    let repository = state.repository();
    let metadata = repository.metadata();
    if let Some(validator) = &metadata.validator {
        let violations = validator.validate(&merged, &[GROUP_UPDATE, metadata.name.as_str()]);
        if !violations.is_empty() {
            return Err(CrudError::validation("Validation failed for entity, invalid fields.")
                .with_payload(json!(violations))
                .into());
        }
    }

    let options = SaveOptions {
        chunk: state.config.save_chunk_size,
    };
    let entity = repository
        .save(vec![merged], options)
        .await
        .map_err(|err| failed(&err))?
        .into_iter()
        .next()
        .ok_or_else(|| CrudError::new(CrudErrorKind::FailedUpdate, "Failed to update entity."))?;

    debug!(alias = %metadata.alias, "entity updated");
    state
        .reset_cache(&flags, &[CacheNamespace::List, CacheNamespace::View])
        .await;

    Ok(UpdateOutput { entity })
}
