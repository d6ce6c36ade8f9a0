//! `create`: validate and insert one entity, or a batch when allowed.

use std::sync::Arc;

use crudkit_core::schema::GROUP_CREATE;
use crudkit_core::{primary_key_map, CreateFields, CreateOutput, CreateParams, Entity, PredicateNode};
use serde_json::{json, Value};
use tracing::debug;

use super::descriptor::OperationFlags;
use super::handler::{Handler, Request};
use super::state::OperationState;
use crate::cache::CacheNamespace;
use crate::service::operation::{CrudError, CrudErrorKind, OperationError};
use crate::traits::{DuplicateKeyError, SaveOptions};

pub(crate) async fn run(
    state: &OperationState,
    handler: &dyn Handler<CreateFields, CreateParams>,
    request: Request<CreateParams>,
) -> Result<Value, OperationError> {
    let flags = state.flags(&request.payload);
    let fields = request.params.fields.clone();

    let lazy = handler.handle(fields, Arc::new(request)).await?;
    lazy.resolve(|fields| execute(state, fields, flags)).await
}

/// Default create executor.
pub(crate) async fn execute(
    state: &OperationState,
    fields: CreateFields,
    flags: OperationFlags,
) -> Result<CreateOutput, OperationError> {
    if !flags.allow_multiple && fields.len() > 1 {
        return Err(CrudError::new(
            CrudErrorKind::MultipleInsertForbidden,
            "You can create only one entity at a time.",
        )
        .into());
    }

    let repository = state.repository();
    let metadata = repository.metadata();
    let entities = fields.clone().into_vec();

    if let Some(validator) = &metadata.validator {
        let groups = [GROUP_CREATE, metadata.name.as_str()];
        let mut errors: Vec<_> = entities
            .iter()
            .map(|entity| validator.validate(entity, &groups))
            .collect();
        if errors.iter().any(|violations| !violations.is_empty()) {
            let payload = if fields.is_many() {
                json!(errors)
            } else {
                json!(errors.swap_remove(0))
            };
            return Err(CrudError::validation("Validation failed for one or more entities.")
                .with_payload(payload)
                .into());
        }
    }

    if metadata.has_composite_key() && !entities.is_empty() {
        reject_existing(state, &entities).await?;
    }

    let options = SaveOptions {
        chunk: state.config.save_chunk_size,
    };
    let saved = repository
        .save(entities, options)
        .await
        .map_err(|err| insert_failure(&err))?;

    debug!(alias = %metadata.alias, count = saved.len(), "entities created");
    state
        .reset_cache(
            &flags,
            &[CacheNamespace::List, CacheNamespace::Count, CacheNamespace::View],
        )
        .await;

    Ok(CreateOutput {
        entity: fields.reshape(saved),
    })
}

/// Composite keys are not generated by the store, so a clash is checked up front.
/// Entities missing part of the key are left for the save to reject.
async fn reject_existing(state: &OperationState, entities: &[Entity]) -> Result<(), CrudError> {
    let repository = state.repository();
    let primary_keys = &repository.metadata().primary_keys;
    let keys: Vec<PredicateNode> = entities
        .iter()
        .filter_map(|entity| {
            let key = primary_key_map(entity, primary_keys);
            let complete = primary_keys
                .iter()
                .all(|field| key.get(field).is_some_and(|value| !value.is_null()));
            complete.then(|| {
                PredicateNode::and(
                    key.into_iter()
                        .map(|(field, value)| PredicateNode::equals(field, value))
                        .collect(),
                )
            })
        })
        .collect();
    if keys.is_empty() {
        return Ok(());
    }

    let existing = repository
        .new_query()
        .with_deleted()
        .and_where(PredicateNode::or(keys))
        .get_count()
        .await
        .map_err(|err| insert_failure(&err))?;
    if existing > 0 {
        return Err(CrudError::new(
            CrudErrorKind::EntityAlreadyExists,
            "One or more entities already exist.",
        ));
    }
    Ok(())
}

fn insert_failure(err: &anyhow::Error) -> CrudError {
    match err.downcast_ref::<DuplicateKeyError>() {
        Some(duplicate) => CrudError::new(CrudErrorKind::FailedInsert, "This entity already exists.")
            .with_payload(json!({
                "original": duplicate.to_string(),
                "detail": duplicate.detail,
            })),
        None => CrudError::store_failure(CrudErrorKind::FailedInsert, "Failed to create entity.", err),
    }
}

#[cfg(test)]
mod tests {
    use crudkit_core::{AuthorizationFilter, MethodOptions};
    use serde_json::json;

    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::engine::fixtures::{
        call, call_as, crud_error, engine, users, users_with_cache, validated_users,
    };
    use crate::engine::{Endpoint, LazyResult, OperationDescriptor};
    use crate::storage::MemoryRepository;
    use crate::traits::{CacheStore, EntityMetadata};

    #[tokio::test]
    async fn creates_a_single_entity() {
        let repo = validated_users();
        let endpoint = engine().create(OperationDescriptor::new(repo.clone()));

        let value = endpoint
            .call(call("create", json!({"fields": {"name": "ann", "tenant": "a"}})))
            .await
            .unwrap();
        assert_eq!(value["entity"]["name"], json!("ann"));
        assert!(value["entity"]["id"].is_string());
        assert_eq!(repo.rows().len(), 1);
    }

    #[tokio::test]
    async fn batch_requires_allow_multiple() {
        let repo = validated_users();
        let endpoint = engine().create(OperationDescriptor::new(repo.clone()));
        let params = json!({"fields": [{"name": "ann"}, {"name": "bob"}]});

        let err = crud_error(endpoint.call(call("create", params.clone())).await);
        assert_eq!(err.kind, CrudErrorKind::MultipleInsertForbidden);
        assert_eq!(repo.stats().saves, 0);

        let auth = AuthorizationFilter {
            method_options: MethodOptions {
                is_allow_multiple: Some(true),
                ..MethodOptions::default()
            },
            ..AuthorizationFilter::default()
        };
        let value = endpoint.call(call_as("create", params, auth)).await.unwrap();
        assert_eq!(value["entity"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn batches_are_saved_in_chunks() {
        let repo = validated_users();
        let endpoint = engine().create(OperationDescriptor::new(repo.clone()).allow_multiple());
        let batch: Vec<Value> = (0..45).map(|i| json!({"name": format!("user-{i}")})).collect();

        endpoint.call(call("create", json!({"fields": batch}))).await.unwrap();
        assert_eq!(repo.stats().save_chunks, 3);
        assert_eq!(repo.rows().len(), 45);
    }

    #[tokio::test]
    async fn schema_violations_block_the_save() {
        let repo = validated_users();
        let endpoint = engine().create(OperationDescriptor::new(repo.clone()));

        let err = crud_error(
            endpoint
                .call(call("create", json!({"fields": {"name": "a", "role": "admin"}})))
                .await,
        );
        assert_eq!(err.kind, CrudErrorKind::ValidationFailed);
        assert_eq!(err.message, "Validation failed for one or more entities.");
        let violations = err.payload.unwrap();
        let properties: Vec<&str> = violations
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v["property"].as_str())
            .collect();
        assert!(properties.contains(&"name"));
        assert!(properties.contains(&"role"));
        assert_eq!(repo.stats().saves, 0);
    }

    #[tokio::test]
    async fn batch_violations_are_reported_per_entity() {
        let endpoint = engine().create(OperationDescriptor::new(validated_users()).allow_multiple());

        let err = crud_error(
            endpoint
                .call(call("create", json!({"fields": [{"name": "ann"}, {"name": 5}]})))
                .await,
        );
        let payload = err.payload.unwrap();
        assert_eq!(payload.as_array().map(Vec::len), Some(2));
        assert_eq!(payload[0], json!([]));
    }

    #[tokio::test]
    async fn duplicate_key_is_normalized() {
        let repo = validated_users();
        repo.insert_rows(vec![json!({"id": 1, "name": "ann", "email": "a@x"})]);
        let endpoint = engine().create(OperationDescriptor::new(repo));

        let err = crud_error(
            endpoint
                .call(call("create", json!({"fields": {"name": "bob", "email": "a@x"}})))
                .await,
        );
        assert_eq!(err.kind, CrudErrorKind::FailedInsert);
        assert_eq!(err.message, "This entity already exists.");
        let payload = err.payload.unwrap();
        assert!(payload["original"].as_str().unwrap().contains("duplicate key"));
        assert!(payload["detail"].as_str().unwrap().contains("(email)"));
    }

    #[tokio::test]
    async fn store_failure_is_failed_insert() {
        let repo = users();
        repo.set_fail_writes(true);
        let endpoint = engine().create(OperationDescriptor::new(repo));

        let err = crud_error(endpoint.call(call("create", json!({"fields": {"id": 9}}))).await);
        assert_eq!(err.kind, CrudErrorKind::FailedInsert);
        assert_eq!(err.message, "Failed to create entity.");
    }

    #[tokio::test]
    async fn composite_key_clash_is_rejected_before_saving() {
        let repo = Arc::new(MemoryRepository::new(
            EntityMetadata::new("Member", "member").primary_keys(["groupId", "userId"]),
        ));
        repo.insert_rows(vec![json!({"groupId": 1, "userId": 1})]);
        let endpoint = engine().create(OperationDescriptor::new(repo.clone()).allow_multiple());

        let err = crud_error(
            endpoint
                .call(call(
                    "create",
                    json!({"fields": [{"groupId": 1, "userId": 2}, {"groupId": 1, "userId": 1}]}),
                ))
                .await,
        );
        assert_eq!(err.kind, CrudErrorKind::EntityAlreadyExists);
        assert_eq!(repo.stats().saves, 0);

        endpoint
            .call(call("create", json!({"fields": {"groupId": 2, "userId": 1}})))
            .await
            .unwrap();
        assert_eq!(repo.rows().len(), 2);
    }

    #[tokio::test]
    async fn incomplete_composite_key_skips_the_existence_check() {
        let repo = Arc::new(MemoryRepository::new(
            EntityMetadata::new("Member", "member").primary_keys(["groupId", "userId"]),
        ));
        repo.insert_rows(vec![json!({"groupId": 1, "userId": 1})]);
        let endpoint = engine().create(OperationDescriptor::new(repo.clone()));

        for fields in [json!({"name": "no keys"}), json!({"groupId": 1}), json!({"groupId": 2})] {
            let err = crud_error(endpoint.call(call("create", json!({ "fields": fields }))).await);
            assert_eq!(err.kind, CrudErrorKind::FailedInsert);
            assert_eq!(err.message, "Failed to create entity.");
        }
        assert_eq!(repo.stats().counts, 0);
        assert_eq!(repo.rows().len(), 1);
    }

    #[tokio::test]
    async fn reset_cache_drops_every_read_namespace() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = users_with_cache(store.clone());
        let ttl = std::time::Duration::from_secs(60);
        for key in ["CRUD:list:user:a", "CRUD:count:user:b", "CRUD:view:user:c"] {
            store.set(key, json!(1), ttl).await.unwrap();
        }
        let endpoint = engine().create(OperationDescriptor::new(repo).reset_cache());

        endpoint.call(call("create", json!({"fields": {"id": 10}}))).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn handler_can_replace_fields_or_result() {
        let stamp = |fields: CreateFields, _req: Arc<Request<CreateParams>>| async move {
            let fields = match fields {
                CreateFields::One(mut entity) => {
                    entity.insert("tenant".to_string(), json!("stamped"));
                    CreateFields::One(entity)
                }
                many @ CreateFields::Many(_) => many,
            };
            Ok::<_, OperationError>(LazyResult::Query(fields))
        };
        let repo = users();
        let endpoint = engine().create(OperationDescriptor::new(repo.clone())).with_handler(stamp);

        let value = endpoint.call(call("create", json!({"fields": {"id": 7}}))).await.unwrap();
        assert_eq!(value["entity"]["tenant"], json!("stamped"));

        let custom = |_fields: CreateFields, _req: Arc<Request<CreateParams>>| async move {
            Ok::<_, OperationError>(LazyResult::Custom(json!({"queued": true})))
        };
        let endpoint = engine().create(OperationDescriptor::new(repo.clone())).with_handler(custom);
        let value = endpoint.call(call("create", json!({"fields": {"id": 8}}))).await.unwrap();
        assert_eq!(value, json!({"queued": true}));
        assert_eq!(repo.stats().saves, 1);
    }
}
