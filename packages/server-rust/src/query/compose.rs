//! Query composition: client filter + authorization filter -> concrete query.

use crudkit_core::{conjoin, QueryOptionsPatch, StructuredFilter};
use serde_json::json;

use super::ConcreteQuery;
use crate::service::config::EngineConfig;
use crate::service::operation::CrudError;
use crate::traits::Repository;

/// Fully resolved query-construction options for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub max_where_depth: usize,
    pub disable_order_by: bool,
    pub disable_pagination: bool,
    pub disable_attributes: bool,
}

impl QueryOptions {
    /// Engine defaults with every clause enabled.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            max_where_depth: config.max_where_depth,
            disable_order_by: false,
            disable_pagination: false,
            disable_attributes: false,
        }
    }

    /// Replaces every field present in `patch`.
    #[must_use]
    pub fn apply(self, patch: &QueryOptionsPatch) -> Self {
        Self {
            default_page_size: patch.default_page_size.unwrap_or(self.default_page_size),
            max_page_size: patch.max_page_size.unwrap_or(self.max_page_size),
            max_where_depth: patch.max_where_depth.unwrap_or(self.max_where_depth),
            disable_order_by: patch.is_disable_order_by.unwrap_or(self.disable_order_by),
            disable_pagination: patch.is_disable_pagination.unwrap_or(self.disable_pagination),
            disable_attributes: patch.is_disable_attributes.unwrap_or(self.disable_attributes),
        }
    }

    /// Layers engine defaults, operation constraints, endpoint options and
    /// authorization options, later layers winning.
    #[must_use]
    pub fn resolve(
        config: &EngineConfig,
        constraints: &QueryOptionsPatch,
        endpoint: &QueryOptionsPatch,
        authorization: Option<&QueryOptionsPatch>,
    ) -> Self {
        let options = Self::from_config(config).apply(constraints).apply(endpoint);
        match authorization {
            Some(patch) => options.apply(patch),
            None => options,
        }
    }
}

/// Builds the query for one call.
///
/// The WHERE clause is the conjunction of both filters. Ordering and the
/// projection come from the client filter, with the authorization filter's
/// ordering appended and its projection intersected. The page window is
/// clamped to `max_page_size`.
///
/// # Errors
///
/// `ValidationFailed` when the client predicate nests deeper than
/// `max_where_depth`. The authorization filter is trusted and not checked.
pub fn compose(
    repository: &dyn Repository,
    client: Option<&StructuredFilter>,
    authorization: Option<&StructuredFilter>,
    options: &QueryOptions,
) -> Result<ConcreteQuery, CrudError> {
    let mut query = repository.new_query();

    let client_fragment = client.and_then(StructuredFilter::to_predicate);
    if let Some(fragment) = &client_fragment {
        let depth = fragment.depth();
        if depth > options.max_where_depth {
            return Err(CrudError::validation("Query where condition is too deep.")
                .with_payload(json!({ "depth": depth, "maxDepth": options.max_where_depth })));
        }
    }
    let auth_fragment = authorization.and_then(StructuredFilter::to_predicate);
    if let Some(condition) = conjoin(client_fragment, auth_fragment) {
        query = query.and_where(condition);
    }

    if !options.disable_order_by {
        let keys = client
            .into_iter()
            .chain(authorization)
            .flat_map(|filter| filter.sort.iter().cloned());
        query.selection_mut().order.extend(keys);
    }

    if !options.disable_attributes {
        let requested = client.and_then(|f| f.attributes.clone());
        let allowed = authorization.and_then(|f| f.attributes.clone());
        let attributes = match (requested, allowed) {
            (Some(requested), Some(allowed)) => Some(
                requested
                    .into_iter()
                    .filter(|field| allowed.contains(field))
                    .collect(),
            ),
            (requested, allowed) => requested.or(allowed),
        };
        if let Some(attributes) = attributes {
            query = query.select(attributes);
        }
    }

    if !options.disable_pagination {
        let page = client.and_then(|f| f.page).unwrap_or(1).max(1);
        let take = client
            .and_then(|f| f.page_size)
            .unwrap_or(options.default_page_size)
            .min(options.max_page_size);
        query = query.take(take).skip((page - 1).saturating_mul(take));
    }

    Ok(query)
}
