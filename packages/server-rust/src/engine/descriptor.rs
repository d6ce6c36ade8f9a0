//! Static per-endpoint configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crudkit_core::{MethodOptions, QueryOptionsPatch, Validator};

use super::meta::{Description, Documentation, ShapeDescriptor};
use crate::traits::Repository;

/// Behavioural switches of an operation.
///
/// Authorization method options replace these per call; see [`OperationFlags::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct OperationFlags {
    /// create/remove/restore may touch more than one row.
    pub allow_multiple: bool,
    /// remove marks rows through the soft-delete column instead of deleting them.
    pub soft_delete: bool,
    /// list also returns the total count.
    pub list_with_count: bool,
    /// list fetches rows and count concurrently.
    pub parallel: bool,
    /// remove returns the removed entities next to their keys.
    pub return_entity: bool,
    /// Mutations invalidate the cached read namespaces of the entity.
    pub reset_cache: bool,
}

impl Default for OperationFlags {
    fn default() -> Self {
        Self {
            allow_multiple: false,
            soft_delete: false,
            list_with_count: true,
            parallel: false,
            return_entity: false,
            reset_cache: false,
        }
    }
}

impl OperationFlags {
    /// Replaces every flag the overrides set.
    #[must_use]
    pub fn apply(self, overrides: &MethodOptions) -> Self {
        Self {
            allow_multiple: overrides.is_allow_multiple.unwrap_or(self.allow_multiple),
            soft_delete: overrides.is_soft_delete.unwrap_or(self.soft_delete),
            list_with_count: overrides.is_list_with_count.unwrap_or(self.list_with_count),
            parallel: overrides.is_parallel.unwrap_or(self.parallel),
            return_entity: overrides.should_return_entity.unwrap_or(self.return_entity),
            reset_cache: overrides.should_reset_cache.unwrap_or(self.reset_cache),
        }
    }
}

/// Result-cache lifetimes. `None` or zero disables caching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheTtls {
    /// Rows of count/list/view.
    pub read: Option<Duration>,
    /// The separate count query of a parallel list.
    pub count: Option<Duration>,
}

/// Immutable configuration of one endpoint.
#[derive(Clone)]
pub struct OperationDescriptor {
    pub repository: Arc<dyn Repository>,
    /// Overrides the operation's query constraints; authorization options override these.
    pub query_options: QueryOptionsPatch,
    pub flags: OperationFlags,
    pub cache: CacheTtls,
    pub docs: Documentation,
    /// Schema for raw params of `custom_with_query` endpoints.
    pub input_schema: Option<Arc<dyn Validator>>,
}

impl OperationDescriptor {
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            query_options: QueryOptionsPatch::default(),
            flags: OperationFlags::default(),
            cache: CacheTtls::default(),
            docs: Documentation::default(),
            input_schema: None,
        }
    }

    #[must_use]
    pub fn query_options(mut self, options: QueryOptionsPatch) -> Self {
        self.query_options = options;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: OperationFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn allow_multiple(mut self) -> Self {
        self.flags.allow_multiple = true;
        self
    }

    #[must_use]
    pub fn soft_delete(mut self) -> Self {
        self.flags.soft_delete = true;
        self
    }

    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.flags.parallel = true;
        self
    }

    #[must_use]
    pub fn with_count(mut self, enabled: bool) -> Self {
        self.flags.list_with_count = enabled;
        self
    }

    #[must_use]
    pub fn return_entity(mut self) -> Self {
        self.flags.return_entity = true;
        self
    }

    #[must_use]
    pub fn reset_cache(mut self) -> Self {
        self.flags.reset_cache = true;
        self
    }

    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.read = Some(ttl);
        self
    }

    #[must_use]
    pub fn count_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.count = Some(ttl);
        self
    }

    #[must_use]
    pub fn input(mut self, shape: ShapeDescriptor) -> Self {
        self.docs.input = Some(shape);
        self
    }

    #[must_use]
    pub fn output(mut self, shape: ShapeDescriptor) -> Self {
        self.docs.output = Some(shape);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<Description>) -> Self {
        self.docs.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn input_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("entity", &self.repository.metadata().name)
            .field("query_options", &self.query_options)
            .field("flags", &self.flags)
            .field("cache", &self.cache)
            .field("docs", &self.docs)
            .finish_non_exhaustive()
    }
}

/// Configuration of a `custom` endpoint, which has no repository.
#[derive(Clone, Default)]
pub struct CustomDescriptor {
    pub docs: Documentation,
    /// Schema for raw params, checked with the `custom` group.
    pub input_schema: Option<Arc<dyn Validator>>,
}

impl CustomDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn input(mut self, shape: ShapeDescriptor) -> Self {
        self.docs.input = Some(shape);
        self
    }

    #[must_use]
    pub fn output(mut self, shape: ShapeDescriptor) -> Self {
        self.docs.output = Some(shape);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<Description>) -> Self {
        self.docs.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn input_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

impl fmt::Debug for CustomDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomDescriptor")
            .field("docs", &self.docs)
            .field("input_schema", &self.input_schema.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_with_count_is_on_by_default() {
        let flags = OperationFlags::default();
        assert!(flags.list_with_count);
        assert!(!flags.allow_multiple);
        assert!(!flags.reset_cache);
    }

    #[test]
    fn method_options_replace_only_present_flags() {
        let flags = OperationFlags {
            soft_delete: true,
            ..OperationFlags::default()
        };
        let overrides = MethodOptions {
            is_allow_multiple: Some(true),
            is_list_with_count: Some(false),
            ..MethodOptions::default()
        };

        let applied = flags.apply(&overrides);
        assert!(applied.allow_multiple);
        assert!(applied.soft_delete);
        assert!(!applied.list_with_count);
        assert!(!applied.parallel);
    }

    #[test]
    fn method_options_can_switch_flags_off() {
        let flags = OperationFlags {
            reset_cache: true,
            ..OperationFlags::default()
        };
        let overrides = MethodOptions {
            should_reset_cache: Some(false),
            ..MethodOptions::default()
        };

        assert!(!flags.apply(&overrides).reset_cache);
    }
}
