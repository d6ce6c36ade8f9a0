//! Authorization filter: the trusted, server-injected part of a request.
//!
//! An upstream authorization layer places an [`AuthorizationFilter`] at
//! `payload.authorization.filter`. Its query conditions are always AND-ed
//! with the client filter, its method options replace the endpoint's static
//! flags, and its query options replace the endpoint's query options. The
//! engine never validates it.

use serde::{Deserialize, Serialize};

use crate::filter::StructuredFilter;

/// Per-call overrides for an endpoint's behavioural flags.
///
/// Every field is optional. A present field replaces the endpoint's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodOptions {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_allow_multiple: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_soft_delete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_list_with_count: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_parallel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub should_return_entity: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub should_reset_cache: Option<bool>,
}

/// Partial query-construction options. Layered replace-wins, field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptionsPatch {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_page_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_page_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_where_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_disable_order_by: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_disable_pagination: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_disable_attributes: Option<bool>,
}

impl QueryOptionsPatch {
    /// Returns `self` with every field present in `over` replaced.
    #[must_use]
    pub fn overlay(self, over: &Self) -> Self {
        Self {
            default_page_size: over.default_page_size.or(self.default_page_size),
            max_page_size: over.max_page_size.or(self.max_page_size),
            max_where_depth: over.max_where_depth.or(self.max_where_depth),
            is_disable_order_by: over.is_disable_order_by.or(self.is_disable_order_by),
            is_disable_pagination: over.is_disable_pagination.or(self.is_disable_pagination),
            is_disable_attributes: over.is_disable_attributes.or(self.is_disable_attributes),
        }
    }
}

/// Server-supplied filter plus method and query option overrides.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationFilter {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<StructuredFilter>,
    #[serde(default)]
    pub method_options: MethodOptions,
    #[serde(default)]
    pub options: QueryOptionsPatch,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filter: Option<AuthorizationFilter>,
}

/// Transport-level payload that travels alongside request params.
///
/// Only `authorization` is interpreted. Any other keys are kept in `extra`
/// for custom handlers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub authorization: Option<Authorization>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RequestPayload {
    /// Payload carrying the given authorization filter.
    #[must_use]
    pub fn with_filter(filter: AuthorizationFilter) -> Self {
        Self {
            authorization: Some(Authorization {
                filter: Some(filter),
            }),
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn auth_filter(&self) -> Option<&AuthorizationFilter> {
        self.authorization.as_ref()?.filter.as_ref()
    }

    #[must_use]
    pub fn method_options(&self) -> MethodOptions {
        self.auth_filter()
            .map(|filter| filter.method_options)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_nested_authorization_filter() {
        let payload: RequestPayload = serde_json::from_value(json!({
            "authorization": {
                "filter": {
                    "query": {"where": {"tenantId": "t1"}},
                    "methodOptions": {"isAllowMultiple": true},
                    "options": {"maxPageSize": 10},
                }
            },
            "sessionId": "abc",
        }))
        .unwrap();

        let filter = payload.auth_filter().unwrap();
        assert_eq!(filter.options.max_page_size, Some(10));
        assert_eq!(payload.method_options().is_allow_multiple, Some(true));
        assert_eq!(payload.method_options().is_soft_delete, None);
        assert_eq!(payload.extra["sessionId"], json!("abc"));
    }

    #[test]
    fn missing_authorization_yields_defaults() {
        let payload = RequestPayload::default();

        assert!(payload.auth_filter().is_none());
        assert_eq!(payload.method_options(), MethodOptions::default());
    }

    #[test]
    fn overlay_replaces_present_fields_only() {
        let base = QueryOptionsPatch {
            default_page_size: Some(25),
            max_page_size: Some(100),
            ..QueryOptionsPatch::default()
        };
        let over = QueryOptionsPatch {
            max_page_size: Some(5),
            is_disable_order_by: Some(false),
            ..QueryOptionsPatch::default()
        };

        let merged = base.overlay(&over);
        assert_eq!(merged.default_page_size, Some(25));
        assert_eq!(merged.max_page_size, Some(5));
        assert_eq!(merged.is_disable_order_by, Some(false));
    }
}
