//! Pipeline composition: wraps the endpoint router in the middleware stack.

use serde_json::Value;
use tower::ServiceBuilder;

use super::metrics::MetricsLayer;
use crate::service::operation::{EndpointCall, OperationError};
use crate::service::router::EndpointRouter;

/// Build the endpoint pipeline around `router`.
///
/// `MetricsLayer` is the only layer: timeouts and cancellation are inherited
/// from the host's request context.
///
/// The returned service implements `tower::Service<EndpointCall>`.
#[must_use]
pub fn build_endpoint_pipeline(
    router: EndpointRouter,
) -> impl tower::Service<EndpointCall, Response = Value, Error = OperationError> + Clone {
    ServiceBuilder::new().layer(MetricsLayer).service(router)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
