use crate::types::Principal;

/// Per-request context carrying identity, tenancy, and tracing information.
/// Handed unchanged to custom handlers so they can make caller-aware decisions.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Identifier of this call, used to correlate log lines.
    pub request_id: String,
    /// Tenant scope for multi-tenant deployments. `None` for single-tenant.
    pub tenant_id: Option<String>,
    /// Authenticated principal, if the request is authenticated.
    pub principal: Option<Principal>,
    /// Distributed trace identifier propagated from the caller.
    pub trace_id: String,
}

impl RequestContext {
    /// Creates a context with the given request id and no identity.
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }
}
