//! Metrics middleware for endpoint calls.
//!
//! Records call duration and outcome using `tracing` spans.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use serde_json::Value;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::{EndpointCall, OperationError};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps every endpoint call in a `tracing` span.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records call duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

fn outcome(result: &Result<Value, OperationError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(OperationError::Crud(_)) => "rejected",
        Err(OperationError::UnknownEndpoint { .. }) => "unknown",
        Err(OperationError::Internal(_)) => "error",
    }
}

impl<S> Service<EndpointCall> for MetricsService<S>
where
    S: Service<EndpointCall, Response = Value, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = Value;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: EndpointCall) -> Self::Future {
        let span = info_span!(
            "endpoint",
            endpoint = %call.path,
            request_id = %call.context.request_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let endpoint = call.path.clone();

        let fut = self.inner.call(call);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                let outcome = outcome(&result);
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                match &result {
                    Err(OperationError::Internal(err)) => {
                        tracing::error!(endpoint = %endpoint, duration_ms, error = %err, "endpoint failed");
                    }
                    _ => tracing::info!(endpoint = %endpoint, duration_ms, outcome, "endpoint complete"),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
