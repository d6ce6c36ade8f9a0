//! crudkit server: generic CRUD operation engines over an abstract
//! repository, with query composition, result caching and tower routing.

pub mod cache;
pub mod engine;
pub mod query;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod traits;

pub use engine::{Controller, CrudEngine, Endpoint, LazyResult, OperationDescriptor};
pub use service::{build_endpoint_pipeline, EndpointCall, EndpointRouter, EngineConfig};
pub use traits::{CacheStore, EntityMetadata, QueryExecutor, Repository};
