//! Endpoint types of the seven standard operations.
//!
//! Every operation endpoint has the same shape: static state, a handler that
//! defaults to [`PassThrough`], and an [`Endpoint`] impl that parses the raw
//! params and runs the operation module. The macro below generates them.

use std::sync::Arc;

use async_trait::async_trait;
use crudkit_core::{
    CountParams, CreateFields, CreateParams, ListParams, RemoveParams, RestoreParams, UpdateParams,
    ViewParams,
};
use serde_json::Value;

use super::descriptor::OperationDescriptor;
use super::handler::{Handler, PassThrough, Request};
use super::meta::{describe, EndpointMeta};
use super::state::OperationState;
use super::update::UpdateTarget;
use super::{count, create, list, remove, restore, update, view, Endpoint};
use crate::query::ConcreteQuery;
use crate::service::operation::{EndpointCall, OperationError};

macro_rules! operation_endpoint {
    (
        $(#[$meta:meta])*
        $name:ident, $module:ident, $input:ty, $params:ty
    ) => {
        $(#[$meta])*
        pub struct $name {
            state: OperationState,
            handler: Arc<dyn Handler<$input, $params>>,
        }

        impl $name {
            pub(crate) fn new(state: OperationState) -> Self {
                Self {
                    state,
                    handler: Arc::new(PassThrough),
                }
            }

            /// Replaces the default pass-through handler.
            #[must_use]
            pub fn with_handler(mut self, handler: impl Handler<$input, $params> + 'static) -> Self {
                self.handler = Arc::new(handler);
                self
            }

            #[must_use]
            pub fn descriptor(&self) -> &OperationDescriptor {
                &self.state.descriptor
            }
        }

        #[async_trait]
        impl Endpoint for $name {
            async fn call(&self, call: EndpointCall) -> Result<Value, OperationError> {
                let request = Request::<$params>::from_call(call)?;
                $module::run(&self.state, self.handler.as_ref(), request).await
            }

            fn meta(&self) -> EndpointMeta {
                describe(
                    &self.state.descriptor.docs,
                    Some(self.state.repository().metadata()),
                    self.state.defaults.as_ref(),
                )
            }
        }
    };
}

operation_endpoint!(
    /// `{count}`, optionally of distinct values of one field.
    CountEndpoint, count, ConcreteQuery, CountParams
);
operation_endpoint!(
    /// `{list, count?}`, one page of rows.
    ListEndpoint, list, ConcreteQuery, ListParams
);
operation_endpoint!(
    /// `{entity}`, exactly one row.
    ViewEndpoint, view, ConcreteQuery, ViewParams
);
operation_endpoint!(
    /// `{entity}`, one created entity or a batch.
    CreateEndpoint, create, CreateFields, CreateParams
);
operation_endpoint!(
    /// `{entity}`, the merged and saved row.
    UpdateEndpoint, update, UpdateTarget, UpdateParams
);
operation_endpoint!(
    /// `{deleted, entities?}`.
    RemoveEndpoint, remove, ConcreteQuery, RemoveParams
);
operation_endpoint!(
    /// `{restored}`.
    RestoreEndpoint, restore, ConcreteQuery, RestoreParams
);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::fixtures::{engine, users};
    use crate::engine::meta::ShapeDescriptor;

    #[test]
    fn meta_uses_the_operation_defaults() {
        let endpoint = engine().remove(OperationDescriptor::new(users()));
        let meta = endpoint.meta();

        assert_eq!(meta.input, (Some("RemoveRequestParams".to_string()), Some(json!({}))));
        assert_eq!(
            meta.output.1,
            Some(json!({"deleted": ["User"], "entities": ["User"]}))
        );
        assert_eq!(meta.description.as_deref(), Some("Remove User by given condition"));
    }

    #[test]
    fn descriptor_docs_override_the_defaults() {
        let descriptor = OperationDescriptor::new(users())
            .output(ShapeDescriptor::named("UserCount"))
            .description("Counts users");
        let endpoint = engine().count(descriptor);
        let meta = endpoint.meta();

        assert_eq!(meta.input.0.as_deref(), Some("CountRequestParams"));
        assert_eq!(meta.output, (Some("UserCount".to_string()), None));
        assert_eq!(meta.description.as_deref(), Some("Counts users"));
        assert!(!endpoint.descriptor().flags.allow_multiple);
    }

    #[test]
    fn count_output_without_sample_keeps_its_name() {
        let meta = engine().count(OperationDescriptor::new(users())).meta();
        assert_eq!(meta.output, (Some("CountOutputParams".to_string()), None));
    }
}
