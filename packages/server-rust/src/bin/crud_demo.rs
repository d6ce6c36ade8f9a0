//! Runs every standard operation of one in-memory entity through the endpoint
//! pipeline and prints the responses.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crudkit_core::{
    AuthorizationFilter, EntitySchema, FieldDef, FieldType, RequestContext, RequestPayload,
    StructuredFilter,
};
use crudkit_server::cache::memory::MemoryCacheStore;
use crudkit_server::engine::{OperationKind, OperationTable};
use crudkit_server::storage::MemoryRepository;
use crudkit_server::service::{OperationError, META_PATH};
use crudkit_server::telemetry::{init_tracing, LogFormat};
use crudkit_server::{
    build_endpoint_pipeline, CrudEngine, EndpointCall, EndpointRouter, EngineConfig, EntityMetadata,
};
use serde_json::{json, Value};
use tower::{Service, ServiceExt};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "crud-demo", about = "Exercise the CRUD engine against an in-memory store")]
struct Args {
    /// Rows seeded before the run.
    #[arg(long, default_value_t = 50, env = "CRUD_DEMO_ROWS")]
    rows: u32,

    /// Fetch list rows and their count concurrently.
    #[arg(long)]
    parallel: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,
}

fn product_schema() -> EntitySchema {
    EntitySchema::new()
        .field(FieldDef::new("id"))
        .field(FieldDef::new("name").required().kind(FieldType::String).min_length(2))
        .field(FieldDef::new("category").kind(FieldType::String))
        .field(FieldDef::new("price").kind(FieldType::Number).min(0.0))
        .field(FieldDef::new("deletedAt"))
}

fn seed(rows: u32) -> Vec<Value> {
    (1..=rows)
        .map(|id| {
            let category = match id % 3 {
                0 => "tools",
                1 => "garden",
                _ => "kitchen",
            };
            json!({
                "id": id,
                "name": format!("product-{id}"),
                "category": category,
                "price": f64::from(id) * 1.5,
            })
        })
        .collect()
}

async fn send<S>(pipeline: &mut S, path: &str, params: Value, payload: RequestPayload) -> Value
where
    S: Service<EndpointCall, Response = Value, Error = OperationError>,
{
    let call = EndpointCall::new(path, params)
        .with_payload(payload)
        .with_context(RequestContext::new(uuid::Uuid::new_v4().to_string()));
    let result = match pipeline.ready().await {
        Ok(service) => service.call(call).await,
        Err(err) => Err(err),
    };
    let value = match result {
        Ok(value) => value,
        Err(OperationError::Crud(err)) => json!({ "error": err.to_json() }),
        Err(err) => json!({ "error": err.to_string() }),
    };
    println!("{path:<16} {value}");
    value
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let metadata = EntityMetadata::new("Product", "product")
        .soft_delete("deletedAt")
        .validator(Arc::new(product_schema()));
    let repository = Arc::new(MemoryRepository::new(metadata).with_cache(Arc::new(MemoryCacheStore::new())));
    repository.insert_rows(seed(args.rows));

    let engine = CrudEngine::new(EngineConfig::default(), OperationTable::standard());
    let parallel = args.parallel;
    let controller = engine
        .controller(repository.clone())
        .configure(OperationKind::List, move |descriptor| {
            let descriptor = descriptor
                .cache_ttl(Duration::from_secs(30))
                .count_cache_ttl(Duration::from_secs(30));
            if parallel {
                descriptor.parallel()
            } else {
                descriptor
            }
        })
        .configure(OperationKind::Count, |descriptor| descriptor.cache_ttl(Duration::from_secs(30)))
        .configure(OperationKind::Create, |descriptor| descriptor.allow_multiple().reset_cache())
        .configure(OperationKind::Update, |descriptor| descriptor.reset_cache())
        .configure(OperationKind::Remove, |descriptor| descriptor.soft_delete().reset_cache())
        .configure(OperationKind::Restore, |descriptor| descriptor.reset_cache());

    let mut router = EndpointRouter::new();
    router.mount(&controller);
    router.register_meta();
    info!(endpoints = router.len(), rows = args.rows, parallel, "demo ready");
    for (path, meta) in router.meta() {
        println!("{path:<16} {}", serde_json::to_string(&meta)?);
    }

    let mut pipeline = build_endpoint_pipeline(router);
    let anonymous = RequestPayload::default();
    let kitchen_only = RequestPayload::with_filter(AuthorizationFilter {
        query: Some(StructuredFilter::where_eq([("category", json!("kitchen"))])),
        ..AuthorizationFilter::default()
    });

    send(&mut pipeline, META_PATH, json!({}), anonymous.clone()).await;
    send(&mut pipeline, "product.count", json!({}), anonymous.clone()).await;
    send(&mut pipeline, "product.count", json!({"query": {"distinct": "category"}}), anonymous.clone()).await;
    send(
        &mut pipeline,
        "product.list",
        json!({"query": {"page": 1, "pageSize": 3, "sort": [{"field": "price", "direction": "desc"}]}}),
        kitchen_only.clone(),
    )
    .await;
    send(
        &mut pipeline,
        "product.create",
        json!({"fields": [{"name": "kettle", "category": "kitchen", "price": 20}, {"name": "x"}]}),
        anonymous.clone(),
    )
    .await;
    let created = send(
        &mut pipeline,
        "product.create",
        json!({"fields": {"name": "kettle", "category": "kitchen", "price": 20}}),
        anonymous.clone(),
    )
    .await;
    let id = created["entity"]["id"].clone();
    send(
        &mut pipeline,
        "product.update",
        json!({"fields": {"price": 18.5}, "query": {"where": {"id": id}}}),
        anonymous.clone(),
    )
    .await;
    send(&mut pipeline, "product.view", json!({"query": {"where": {"id": id}}}), kitchen_only).await;
    send(&mut pipeline, "product.remove", json!({"query": {"where": {"id": id}}}), anonymous.clone()).await;
    send(&mut pipeline, "product.view", json!({"query": {"where": {"id": id}}}), anonymous.clone()).await;
    send(&mut pipeline, "product.restore", json!({"query": {"where": {"id": id}}}), anonymous.clone()).await;
    send(&mut pipeline, "product.remove", json!({}), anonymous.clone()).await;
    send(&mut pipeline, "product.archive", json!({}), anonymous).await;

    info!(stats = ?repository.stats(), "demo finished");
    Ok(())
}
