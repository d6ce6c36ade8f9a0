//! Endpoints whose handler owns the response.
//!
//! `custom_with_query` still composes the caller's filter with the
//! authorization filter, so the handler starts from a query it may trust.
//! `custom` has no repository at all.

use std::sync::Arc;

use async_trait::async_trait;
use crudkit_core::schema::{GROUP_CUSTOM, GROUP_CUSTOM_WITH_QUERY};
use crudkit_core::{Entity, QueryOptionsPatch, StructuredFilter, Validator};
use serde_json::{json, Value};

use super::descriptor::CustomDescriptor;
use super::handler::{CustomHandler, Request};
use super::meta::{describe, EndpointMeta};
use super::state::OperationState;
use super::Endpoint;
use crate::query::ConcreteQuery;
use crate::service::operation::{CrudError, EndpointCall, OperationError};

fn invalid_params(payload: Value) -> CrudError {
    CrudError::validation("Invalid request params.").with_payload(payload)
}

/// Checks raw params against `schema` under `group`.
fn check_params(schema: Option<&dyn Validator>, params: &Value, group: &str) -> Result<(), CrudError> {
    let Some(schema) = schema else {
        return Ok(());
    };
    let empty = Entity::new();
    let target = params.as_object().unwrap_or(&empty);
    let violations = schema.validate(target, &[group]);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(invalid_params(json!(violations)))
    }
}

/// The `query` member of raw params, when present.
fn client_filter(params: &Value) -> Result<Option<StructuredFilter>, CrudError> {
    match params.get("query") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|err| invalid_params(json!({ "detail": err.to_string() }))),
    }
}

// ---------------------------------------------------------------------------
// custom_with_query
// ---------------------------------------------------------------------------

pub struct CustomWithQueryEndpoint {
    state: OperationState,
    handler: Arc<dyn CustomHandler<ConcreteQuery>>,
}

impl CustomWithQueryEndpoint {
    pub(crate) fn new(state: OperationState, handler: Arc<dyn CustomHandler<ConcreteQuery>>) -> Self {
        Self { state, handler }
    }
}

#[async_trait]
impl Endpoint for CustomWithQueryEndpoint {
    async fn call(&self, call: EndpointCall) -> Result<Value, OperationError> {
        let request = Request::<Value>::from_call(call)?;
        check_params(
            self.state.descriptor.input_schema.as_deref(),
            &request.params,
            GROUP_CUSTOM_WITH_QUERY,
        )?;
        let filter = client_filter(&request.params)?;
        let query = self
            .state
            .compose(&QueryOptionsPatch::default(), filter.as_ref(), &request.payload)?;

        self.handler.handle(query, Arc::new(request)).await
    }

    fn meta(&self) -> EndpointMeta {
        describe(
            &self.state.descriptor.docs,
            Some(self.state.repository().metadata()),
            None,
        )
    }
}

// ---------------------------------------------------------------------------
// custom
// ---------------------------------------------------------------------------

pub struct CustomEndpoint {
    descriptor: CustomDescriptor,
    handler: Arc<dyn CustomHandler<()>>,
}

impl CustomEndpoint {
    pub(crate) fn new(descriptor: CustomDescriptor, handler: Arc<dyn CustomHandler<()>>) -> Self {
        Self { descriptor, handler }
    }
}

#[async_trait]
impl Endpoint for CustomEndpoint {
    async fn call(&self, call: EndpointCall) -> Result<Value, OperationError> {
        let request = Request::<Value>::from_call(call)?;
        check_params(self.descriptor.input_schema.as_deref(), &request.params, GROUP_CUSTOM)?;
        self.handler.handle((), Arc::new(request)).await
    }

    fn meta(&self) -> EndpointMeta {
        describe(&self.descriptor.docs, None, None)
    }
}
