//! Per-entity assembly of the standard endpoints.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::descriptor::OperationDescriptor;
use super::meta::OperationKind;
use super::{CrudEngine, Endpoint};
use crate::traits::Repository;

type Configure = Box<dyn Fn(OperationDescriptor) -> OperationDescriptor + Send + Sync>;

/// Builds the seven standard endpoints of one entity.
///
/// Paths default to `{alias}.{operation}`, e.g. `user.list`. Each operation
/// may be disabled, given another path, or have its descriptor adjusted.
pub struct Controller {
    engine: CrudEngine,
    repository: Arc<dyn Repository>,
    prefix: String,
    disabled: HashSet<OperationKind>,
    paths: HashMap<OperationKind, String>,
    overrides: HashMap<OperationKind, Configure>,
}

impl Controller {
    #[must_use]
    pub fn new(engine: CrudEngine, repository: Arc<dyn Repository>) -> Self {
        let prefix = repository.metadata().alias.clone();
        Self {
            engine,
            repository,
            prefix,
            disabled: HashSet::new(),
            paths: HashMap::new(),
            overrides: HashMap::new(),
        }
    }

    /// Name of the entity whose endpoints this controller builds.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.repository.metadata().name
    }

    /// Replaces the path prefix. An empty prefix leaves bare operation paths.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn disable(mut self, kind: OperationKind) -> Self {
        self.disabled.insert(kind);
        self
    }

    /// Registers `kind` under `path` instead of its operation name.
    #[must_use]
    pub fn path(mut self, kind: OperationKind, path: impl Into<String>) -> Self {
        self.paths.insert(kind, path.into());
        self
    }

    /// Adjusts the descriptor of `kind` before its endpoint is built.
    #[must_use]
    pub fn configure<F>(mut self, kind: OperationKind, configure: F) -> Self
    where
        F: Fn(OperationDescriptor) -> OperationDescriptor + Send + Sync + 'static,
    {
        self.overrides.insert(kind, Box::new(configure));
        self
    }

    fn full_path(&self, kind: OperationKind) -> String {
        let path = self
            .paths
            .get(&kind)
            .map_or(kind.as_str(), String::as_str);
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}.{path}", self.prefix)
        }
    }

    fn endpoint(&self, kind: OperationKind) -> Arc<dyn Endpoint> {
        let mut descriptor = OperationDescriptor::new(Arc::clone(&self.repository));
        if let Some(configure) = self.overrides.get(&kind) {
            descriptor = configure(descriptor);
        }
        match kind {
            OperationKind::Count => Arc::new(self.engine.count(descriptor)),
            OperationKind::List => Arc::new(self.engine.list(descriptor)),
            OperationKind::View => Arc::new(self.engine.view(descriptor)),
            OperationKind::Create => Arc::new(self.engine.create(descriptor)),
            OperationKind::Update => Arc::new(self.engine.update(descriptor)),
            OperationKind::Remove => Arc::new(self.engine.remove(descriptor)),
            OperationKind::Restore => Arc::new(self.engine.restore(descriptor)),
        }
    }

    /// `(path, endpoint)` for every enabled operation, in operation order.
    #[must_use]
    pub fn build(&self) -> Vec<(String, Arc<dyn Endpoint>)> {
        OperationKind::ALL
            .into_iter()
            .filter(|kind| !self.disabled.contains(kind))
            .map(|kind| (self.full_path(kind), self.endpoint(kind)))
            .collect()
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("entity", &self.repository.metadata().name)
            .field("prefix", &self.prefix)
            .field("disabled", &self.disabled)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}
