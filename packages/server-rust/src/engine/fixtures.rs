//! Shared test fixtures for the operation modules.

use std::sync::Arc;

use crudkit_core::{AuthorizationFilter, EntitySchema, FieldDef, FieldType, RequestPayload};
use serde_json::{json, Value};

use super::meta::OperationTable;
use super::CrudEngine;
use crate::cache::memory::MemoryCacheStore;
use crate::service::config::EngineConfig;
use crate::service::operation::{CrudError, EndpointCall, OperationError};
use crate::storage::MemoryRepository;
use crate::traits::EntityMetadata;

fn user_metadata() -> EntityMetadata {
    EntityMetadata::new("User", "user").soft_delete("deletedAt")
}

fn seed(repo: &MemoryRepository) {
    repo.insert_rows(
        (1..=5)
            .map(|id| {
                let tenant = if id <= 3 { "a" } else { "b" };
                json!({"id": id, "name": format!("u{id}"), "tenant": tenant, "age": 20 + id})
            })
            .collect(),
    );
}

/// Users 1..=5: ids 1-3 in tenant `a`, 4-5 in tenant `b`.
pub(crate) fn users() -> Arc<MemoryRepository> {
    let repo = MemoryRepository::new(user_metadata());
    seed(&repo);
    Arc::new(repo)
}

/// [`users`] backed by a result cache.
pub(crate) fn users_with_cache(store: Arc<MemoryCacheStore>) -> Arc<MemoryRepository> {
    let repo = MemoryRepository::new(user_metadata()).with_cache(store);
    seed(&repo);
    Arc::new(repo)
}

pub(crate) fn schema() -> EntitySchema {
    EntitySchema::new()
        .field(FieldDef::new("id").kind(FieldType::Number))
        .field(
            FieldDef::new("name")
                .required()
                .kind(FieldType::String)
                .min_length(2),
        )
        .field(FieldDef::new("tenant").kind(FieldType::String))
        .field(FieldDef::new("email").kind(FieldType::String))
        .field(FieldDef::new("age").kind(FieldType::Number))
}

/// Empty user table with a schema and a unique `email`.
pub(crate) fn validated_users() -> Arc<MemoryRepository> {
    let metadata = user_metadata().validator(Arc::new(schema()));
    Arc::new(MemoryRepository::new(metadata).with_unique(["email"]))
}

pub(crate) fn engine() -> CrudEngine {
    CrudEngine::new(EngineConfig::default(), OperationTable::standard())
}

pub(crate) fn call(path: &str, params: Value) -> EndpointCall {
    EndpointCall::new(path, params)
}

pub(crate) fn call_as(path: &str, params: Value, filter: AuthorizationFilter) -> EndpointCall {
    EndpointCall::new(path, params).with_payload(RequestPayload::with_filter(filter))
}

/// Unwraps a taxonomized failure.
pub(crate) fn crud_error(result: Result<Value, OperationError>) -> CrudError {
    match result {
        Err(OperationError::Crud(err)) => err,
        other => panic!("expected a crud error, got {other:?}"),
    }
}

/// The `id` of every entity in a JSON array.
pub(crate) fn ids(list: &Value) -> Vec<i64> {
    list.as_array()
        .map(|items| items.iter().filter_map(|item| item["id"].as_i64()).collect())
        .unwrap_or_default()
}
