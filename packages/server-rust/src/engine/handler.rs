//! Custom handler seams.
//!
//! Any `Fn(input, Arc<Request<P>>) -> impl Future` closure is a handler; the
//! blanket impls box its future.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crudkit_core::{RequestContext, RequestPayload};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use super::lazy::LazyResult;
use crate::service::operation::{CrudError, EndpointCall, OperationError};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, OperationError>> + Send>>;

/// Typed view of an [`EndpointCall`].
#[derive(Debug, Clone)]
pub struct Request<P> {
    pub params: P,
    pub payload: RequestPayload,
    pub context: RequestContext,
}

impl<P: DeserializeOwned> Request<P> {
    /// Parses the raw params. Absent (`null`) params parse as `{}`.
    ///
    /// # Errors
    ///
    /// `ValidationFailed` "Invalid request params." when the params do not
    /// fit `P`.
    pub fn from_call(call: EndpointCall) -> Result<Self, CrudError> {
        let raw = match call.params {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let params = serde_json::from_value(raw).map_err(|err| {
            CrudError::validation("Invalid request params.").with_payload(json!({ "detail": err.to_string() }))
        })?;
        Ok(Self {
            params,
            payload: call.payload,
            context: call.context,
        })
    }
}

/// Intercepts an operation before default execution.
pub trait Handler<Q, P>: Send + Sync {
    fn handle(&self, input: Q, request: Arc<Request<P>>) -> BoxFuture<LazyResult<Q>>;
}

impl<Q, P, F, Fut> Handler<Q, P> for F
where
    F: Fn(Q, Arc<Request<P>>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<LazyResult<Q>, OperationError>> + Send + 'static,
{
    fn handle(&self, input: Q, request: Arc<Request<P>>) -> BoxFuture<LazyResult<Q>> {
        Box::pin(self(input, request))
    }
}

/// The default handler: hands the input straight to default execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl<Q: Send + 'static, P> Handler<Q, P> for PassThrough {
    fn handle(&self, input: Q, _request: Arc<Request<P>>) -> BoxFuture<LazyResult<Q>> {
        Box::pin(async move { Ok(LazyResult::Query(input)) })
    }
}

/// Handler of a custom endpoint; its value is the response.
pub trait CustomHandler<I>: Send + Sync {
    fn handle(&self, input: I, request: Arc<Request<Value>>) -> BoxFuture<Value>;
}

impl<I, F, Fut> CustomHandler<I> for F
where
    F: Fn(I, Arc<Request<Value>>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, OperationError>> + Send + 'static,
{
    fn handle(&self, input: I, request: Arc<Request<Value>>) -> BoxFuture<Value> {
        Box::pin(self(input, request))
    }
}
