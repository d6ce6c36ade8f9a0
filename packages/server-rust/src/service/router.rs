//! Endpoint routing: dispatches an [`EndpointCall`] to the endpoint registered
//! under its path.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::{json, Value};
use tower::Service;
use tracing::warn;

use super::operation::{EndpointCall, OperationError};
use crate::engine::meta::{describe, ShapeDescriptor};
use crate::engine::{Controller, CustomDescriptor, CustomEndpoint, Endpoint, EndpointMeta, Request};

/// Path of the built-in metadata endpoint.
pub const META_PATH: &str = "meta";

type BoxedFuture = Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send>>;

// ---------------------------------------------------------------------------
// EndpointRouter
// ---------------------------------------------------------------------------

/// Routes calls to endpoints by path.
///
/// Calls to an unregistered path return `OperationError::UnknownEndpoint`.
/// Cloning is cheap: endpoints are shared.
#[derive(Clone, Default)]
pub struct EndpointRouter {
    endpoints: HashMap<String, Arc<dyn Endpoint>>,
    entities: BTreeSet<String>,
}

impl EndpointRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `endpoint` under `path`, replacing any previous one.
    pub fn register(&mut self, path: impl Into<String>, endpoint: Arc<dyn Endpoint>) {
        let path = path.into();
        if self.endpoints.insert(path.clone(), endpoint).is_some() {
            warn!(path = %path, "endpoint replaced");
        }
    }

    /// Registers every endpoint a controller builds.
    pub fn mount(&mut self, controller: &Controller) {
        for (path, endpoint) in controller.build() {
            self.register(path, endpoint);
        }
        self.entities.insert(controller.entity().to_string());
    }

    /// Registers the metadata endpoint under [`META_PATH`].
    ///
    /// It answers `{endpoints, entities, version}` as of this call, so
    /// register it after every other endpoint.
    pub fn register_meta(&mut self) {
        let descriptor = CustomDescriptor::new()
            .output(ShapeDescriptor::named("MetaOutput"))
            .description("Get microservice metadata");
        let mut endpoints = self.meta();
        endpoints.insert(META_PATH.to_string(), describe(&descriptor.docs, None, None));

        let snapshot = json!({
            "endpoints": endpoints,
            "entities": self.entities,
            "version": env!("CARGO_PKG_VERSION"),
        });
        let handler = move |(): (), _request: Arc<Request<Value>>| {
            let snapshot = snapshot.clone();
            async move { Ok::<_, OperationError>(snapshot) }
        };
        self.register(META_PATH, Arc::new(CustomEndpoint::new(descriptor, Arc::new(handler))));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Metadata of every endpoint, keyed and sorted by path.
    #[must_use]
    pub fn meta(&self) -> BTreeMap<String, EndpointMeta> {
        self.endpoints
            .iter()
            .map(|(path, endpoint)| (path.clone(), endpoint.meta()))
            .collect()
    }
}

impl fmt::Debug for EndpointRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<&String> = self.endpoints.keys().collect();
        paths.sort();
        f.debug_struct("EndpointRouter").field("paths", &paths).finish()
    }
}

impl Service<EndpointCall> for EndpointRouter {
    type Response = Value;
    type Error = OperationError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: EndpointCall) -> Self::Future {
        match self.endpoints.get(&call.path) {
            Some(endpoint) => {
                let endpoint = Arc::clone(endpoint);
                Box::pin(async move { endpoint.call(call).await })
            }
            None => Box::pin(async move { Err(OperationError::UnknownEndpoint { name: call.path }) }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
