use std::sync::Arc;
use std::time::Duration;

use crudkit_core::{QueryOptionsPatch, RequestPayload, StructuredFilter};

use super::descriptor::{OperationDescriptor, OperationFlags};
use super::meta::OperationDefaults;
use crate::cache::{self, CacheNamespace};
use crate::query::{compose, ConcreteQuery, QueryOptions};
use crate::service::config::EngineConfig;
use crate::service::operation::CrudError;
use crate::traits::{CacheStore, Repository};

/// Everything one endpoint needs at call time.
#[derive(Debug, Clone)]
pub(crate) struct OperationState {
    pub descriptor: OperationDescriptor,
    pub config: Arc<EngineConfig>,
    pub defaults: Option<OperationDefaults>,
}

impl OperationState {
    pub fn repository(&self) -> &dyn Repository {
        self.descriptor.repository.as_ref()
    }

    /// Descriptor flags with the caller's authorization overrides applied.
    pub fn flags(&self, payload: &RequestPayload) -> OperationFlags {
        self.descriptor.flags.apply(&payload.method_options())
    }

    /// Composes the call's query under `constraints`.
    pub fn compose(
        &self,
        constraints: &QueryOptionsPatch,
        client: Option<&StructuredFilter>,
        payload: &RequestPayload,
    ) -> Result<ConcreteQuery, CrudError> {
        let auth = payload.auth_filter();
        let options = QueryOptions::resolve(
            &self.config,
            constraints,
            &self.descriptor.query_options,
            auth.map(|filter| &filter.options),
        );
        compose(
            self.repository(),
            client,
            auth.and_then(|filter| filter.query.as_ref()),
            &options,
        )
    }

    /// Cache store and lifetime, when `ttl` enables caching and the
    /// repository has a store.
    pub fn cache_for(&self, ttl: Option<Duration>) -> Option<(Arc<dyn CacheStore>, Duration)> {
        let ttl = ttl.filter(|ttl| !ttl.is_zero())?;
        self.repository().cache_store().map(|store| (store, ttl))
    }

    /// Prefixed namespace, e.g. `CRUD:list`.
    pub fn namespace(&self, namespace: CacheNamespace) -> String {
        namespace.qualified(&self.config.cache_prefix)
    }

    /// Invalidates `namespaces` when the call's flags ask for it.
    pub async fn reset_cache(&self, flags: &OperationFlags, namespaces: &[CacheNamespace]) {
        if flags.reset_cache {
            cache::invalidate(self.repository(), &self.config.cache_prefix, namespaces).await;
        }
    }
}
