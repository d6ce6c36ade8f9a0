//! Endpoint dispatch.
//!
//! 1. **Call envelope and errors** (`operation`): `EndpointCall`, `CrudError`, `OperationError`
//! 2. **Configuration** (`config`): `EngineConfig`
//! 3. **Routing** (`router`): Dispatch to endpoints by path
//! 4. **Middleware** (`middleware`): Tower layers around the router

pub mod config;
pub mod middleware;
pub mod operation;
pub mod router;

pub use config::EngineConfig;
pub use middleware::build_endpoint_pipeline;
pub use operation::{CrudError, CrudErrorKind, EndpointCall, OperationError};
pub use router::{EndpointRouter, META_PATH};
