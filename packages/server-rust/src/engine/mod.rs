//! Operation engines: the seven standard operations, custom endpoints and
//! the per-entity controller.
//!
//! Each operation composes its query, lets the endpoint's handler intercept
//! it, then resolves the handler's [`LazyResult`] through the operation's
//! default executor.

pub mod controller;
pub mod custom;
pub mod descriptor;
pub mod endpoints;
pub mod handler;
pub mod lazy;
pub mod meta;

mod count;
mod create;
mod list;
mod remove;
mod restore;
mod state;
mod update;
mod view;

#[cfg(test)]
pub(crate) mod fixtures;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::query::ConcreteQuery;
use crate::service::config::EngineConfig;
use crate::service::operation::{EndpointCall, OperationError};
use crate::traits::Repository;
use state::OperationState;

pub use controller::Controller;
pub use count::CountOptions;
pub use custom::{CustomEndpoint, CustomWithQueryEndpoint};
pub use descriptor::{CacheTtls, CustomDescriptor, OperationDescriptor, OperationFlags};
pub use endpoints::{
    CountEndpoint, CreateEndpoint, ListEndpoint, RemoveEndpoint, RestoreEndpoint, UpdateEndpoint,
    ViewEndpoint,
};
pub use handler::{BoxFuture, CustomHandler, Handler, PassThrough, Request};
pub use lazy::LazyResult;
pub use list::ListOptions;
pub use meta::{
    describe, Description, Documentation, EndpointMeta, OperationDefaults, OperationKind,
    OperationTable, ShapeDescriptor,
};
pub use update::UpdateTarget;
pub use view::ViewOptions;

/// A callable endpoint, as registered with the router.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Parses the call's raw params and runs the endpoint.
    async fn call(&self, call: EndpointCall) -> Result<Value, OperationError>;

    /// Input/output shapes and description, for documentation tooling.
    /// Not meant for the request path.
    fn meta(&self) -> EndpointMeta;
}

/// Builds endpoints from descriptors under one configuration and one
/// table of operation defaults.
#[derive(Debug, Clone)]
pub struct CrudEngine {
    config: Arc<EngineConfig>,
    table: Arc<OperationTable>,
}

impl CrudEngine {
    #[must_use]
    pub fn new(config: EngineConfig, table: OperationTable) -> Self {
        Self {
            config: Arc::new(config),
            table: Arc::new(table),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn state(&self, kind: Option<OperationKind>, descriptor: OperationDescriptor) -> OperationState {
        OperationState {
            descriptor,
            config: Arc::clone(&self.config),
            defaults: kind.and_then(|kind| self.table.get(kind).cloned()),
        }
    }

    #[must_use]
    pub fn count(&self, descriptor: OperationDescriptor) -> CountEndpoint {
        CountEndpoint::new(self.state(Some(OperationKind::Count), descriptor))
    }

    #[must_use]
    pub fn list(&self, descriptor: OperationDescriptor) -> ListEndpoint {
        ListEndpoint::new(self.state(Some(OperationKind::List), descriptor))
    }

    #[must_use]
    pub fn view(&self, descriptor: OperationDescriptor) -> ViewEndpoint {
        ViewEndpoint::new(self.state(Some(OperationKind::View), descriptor))
    }

    #[must_use]
    pub fn create(&self, descriptor: OperationDescriptor) -> CreateEndpoint {
        CreateEndpoint::new(self.state(Some(OperationKind::Create), descriptor))
    }

    #[must_use]
    pub fn update(&self, descriptor: OperationDescriptor) -> UpdateEndpoint {
        UpdateEndpoint::new(self.state(Some(OperationKind::Update), descriptor))
    }

    #[must_use]
    pub fn remove(&self, descriptor: OperationDescriptor) -> RemoveEndpoint {
        RemoveEndpoint::new(self.state(Some(OperationKind::Remove), descriptor))
    }

    #[must_use]
    pub fn restore(&self, descriptor: OperationDescriptor) -> RestoreEndpoint {
        RestoreEndpoint::new(self.state(Some(OperationKind::Restore), descriptor))
    }

    /// Endpoint whose handler receives the composed query and owns the response.
    #[must_use]
    pub fn custom_with_query(
        &self,
        descriptor: OperationDescriptor,
        handler: impl CustomHandler<ConcreteQuery> + 'static,
    ) -> CustomWithQueryEndpoint {
        CustomWithQueryEndpoint::new(self.state(None, descriptor), Arc::new(handler))
    }

    /// Endpoint without a repository.
    #[must_use]
    pub fn custom(
        &self,
        descriptor: CustomDescriptor,
        handler: impl CustomHandler<()> + 'static,
    ) -> CustomEndpoint {
        CustomEndpoint::new(descriptor, Arc::new(handler))
    }

    /// Controller assembling the standard endpoints of one entity.
    #[must_use]
    pub fn controller(&self, repository: Arc<dyn Repository>) -> Controller {
        Controller::new(self.clone(), repository)
    }
}
