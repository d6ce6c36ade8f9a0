//! Property tests over the public engine surface: cache keys are a pure
//! function of the query, the authorization filter never widens a result,
//! and a parallel list counts exactly what the unpaginated query matches.

use std::sync::Arc;

use crudkit_core::{AuthorizationFilter, RequestPayload, StructuredFilter};
use crudkit_server::cache::{derive_key, CacheNamespace, KeyScope};
use crudkit_server::engine::OperationTable;
use crudkit_server::query::{compose, QueryOptions};
use crudkit_server::storage::MemoryRepository;
use crudkit_server::{CrudEngine, Endpoint, EndpointCall, EngineConfig, EntityMetadata, OperationDescriptor};
use proptest::prelude::*;
use serde_json::{json, Value};

const TENANTS: [&str; 3] = ["a", "b", "c"];

fn repository(rows: &[(u8, u8)]) -> Arc<MemoryRepository> {
    let repo = MemoryRepository::new(EntityMetadata::new("Item", "item"));
    repo.insert_rows(
        rows.iter()
            .enumerate()
            .map(|(id, (tenant, score))| {
                json!({"id": id, "tenant": TENANTS[usize::from(*tenant)], "score": score})
            })
            .collect(),
    );
    Arc::new(repo)
}

fn rows() -> impl Strategy<Value = Vec<(u8, u8)>> {
    prop::collection::vec((0u8..3, 0u8..4), 0..40)
}

fn filter(tenant: Option<u8>, score: Option<u8>) -> StructuredFilter {
    let mut conditions = Vec::new();
    if let Some(tenant) = tenant {
        conditions.push(("tenant", json!(TENANTS[usize::from(tenant)])));
    }
    if let Some(score) = score {
        conditions.push(("score", json!(score)));
    }
    StructuredFilter::where_eq(conditions)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn engine() -> CrudEngine {
    CrudEngine::new(EngineConfig::default(), OperationTable::standard())
}

proptest! {
    #[test]
    fn cache_keys_are_deterministic(
        tenant in prop::option::of(0u8..3),
        score in prop::option::of(0u8..4),
        page_size in 1u64..50,
    ) {
        let repo = repository(&[]);
        let options = QueryOptions::from_config(&EngineConfig::default());
        let mut client = filter(tenant, score);
        client.page_size = Some(page_size);

        let first = compose(repo.as_ref(), Some(&client), None, &options).unwrap();
        let second = compose(repo.as_ref(), Some(&client.clone()), None, &options).unwrap();

        prop_assert_eq!(
            derive_key(&first, "CRUD:list", KeyScope::Full),
            derive_key(&second, "CRUD:list", KeyScope::Full)
        );
        prop_assert!(derive_key(&first, "CRUD:count", KeyScope::WhereOnly).starts_with("CRUD:count:item:"));

        let mut narrower = client;
        narrower.page_size = Some(page_size + 1);
        let third = compose(repo.as_ref(), Some(&narrower), None, &options).unwrap();
        prop_assert_eq!(
            derive_key(&first, "CRUD:count", KeyScope::WhereOnly),
            derive_key(&third, "CRUD:count", KeyScope::WhereOnly)
        );
        prop_assert_ne!(
            derive_key(&first, "CRUD:list", KeyScope::Full),
            derive_key(&third, "CRUD:list", KeyScope::Full)
        );
        prop_assert_eq!(CacheNamespace::List.qualified("CRUD"), "CRUD:list");
    }

    #[test]
    fn authorization_filter_never_widens(
        data in rows(),
        client_tenant in prop::option::of(0u8..3),
        client_score in prop::option::of(0u8..4),
        auth_tenant in 0u8..3,
    ) {
        let repo = repository(&data);
        let endpoint = engine().list(OperationDescriptor::new(repo).with_count(true));
        let scope = TENANTS[usize::from(auth_tenant)];
        let auth = AuthorizationFilter {
            query: Some(StructuredFilter::where_eq([("tenant", json!(scope))])),
            ..AuthorizationFilter::default()
        };
        let mut client = filter(client_tenant, client_score);
        client.page_size = Some(100);
        let call = EndpointCall::new("list", json!({ "query": client }))
            .with_payload(RequestPayload::with_filter(auth));

        let value = runtime().block_on(endpoint.call(call)).unwrap();
        let list = value["list"].as_array().cloned().unwrap_or_default();

        prop_assert!(list.iter().all(|row| row["tenant"] == json!(scope)));
        let in_scope = data.iter().filter(|(tenant, _)| *tenant == auth_tenant).count();
        prop_assert!(list.len() <= in_scope);
        prop_assert_eq!(value["count"].as_u64(), Some(list.len() as u64));
    }

    #[test]
    fn parallel_count_matches_the_unpaginated_query(
        data in rows(),
        tenant in prop::option::of(0u8..3),
        page in 1u64..5,
        page_size in 1u64..10,
    ) {
        let repo = repository(&data);
        let parallel = engine().list(OperationDescriptor::new(repo.clone()).parallel());
        let counter = engine().count(OperationDescriptor::new(repo));
        let mut client = filter(tenant, None);
        let where_only: Value = json!({ "query": client.clone() });
        client.page = Some(page);
        client.page_size = Some(page_size);

        let rt = runtime();
        let listed = rt
            .block_on(parallel.call(EndpointCall::new("list", json!({ "query": client }))))
            .unwrap();
        let counted = rt
            .block_on(counter.call(EndpointCall::new("count", where_only)))
            .unwrap();

        prop_assert_eq!(&listed["count"], &counted["count"]);
        let total = counted["count"].as_u64().unwrap_or_default();
        let expected = total.saturating_sub((page - 1) * page_size).min(page_size);
        prop_assert_eq!(listed["list"].as_array().map(Vec::len), Some(usize::try_from(expected).unwrap()));
    }
}
