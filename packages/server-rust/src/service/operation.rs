//! Call envelope and error taxonomy shared by every endpoint.

use crudkit_core::{RequestContext, RequestPayload};
use http::StatusCode;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// EndpointCall
// ---------------------------------------------------------------------------

/// A single inbound call, as handed over by the RPC dispatcher.
#[derive(Debug, Clone)]
pub struct EndpointCall {
    /// Registered endpoint path, e.g. `"user.list"`.
    pub path: String,
    /// Raw request params; parsed by the target endpoint.
    pub params: Value,
    pub payload: RequestPayload,
    pub context: RequestContext,
}

impl EndpointCall {
    #[must_use]
    pub fn new(path: impl Into<String>, params: Value) -> Self {
        Self {
            path: path.into(),
            params,
            payload: RequestPayload::default(),
            context: RequestContext::default(),
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: RequestPayload) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

// ---------------------------------------------------------------------------
// CrudError
// ---------------------------------------------------------------------------

/// Closed set of failure kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudErrorKind {
    ValidationFailed,
    MultipleInsertForbidden,
    FailedInsert,
    FailedUpdate,
    FailedDelete,
    FailedRestore,
    EntityNotFound,
    EntityAlreadyExists,
}

impl CrudErrorKind {
    /// Stable numeric code reported to RPC callers.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::ValidationFailed => -33481,
            Self::MultipleInsertForbidden => -33482,
            Self::FailedInsert => -33483,
            Self::FailedUpdate => -33484,
            Self::FailedDelete => -33485,
            Self::FailedRestore => -33486,
            Self::EntityNotFound => -33487,
            Self::EntityAlreadyExists => -33488,
        }
    }

    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed | Self::MultipleInsertForbidden => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::FailedInsert | Self::FailedUpdate | Self::FailedDelete | Self::FailedRestore => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::EntityNotFound => StatusCode::NOT_FOUND,
            Self::EntityAlreadyExists => StatusCode::CONFLICT,
        }
    }
}

/// A taxonomized failure with a caller-facing message and optional detail.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct CrudError {
    pub kind: CrudErrorKind,
    pub message: String,
    pub payload: Option<Value>,
}

impl CrudError {
    #[must_use]
    pub fn new(kind: CrudErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: None,
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(CrudErrorKind::ValidationFailed, message)
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Wraps a store failure under `kind`, keeping driver text out of the message.
    #[must_use]
    pub fn store_failure(kind: CrudErrorKind, message: &str, err: &anyhow::Error) -> Self {
        Self::new(kind, message).with_payload(json!({ "detail": format!("{err:#}") }))
    }

    /// Wire form: `{code, status, message, payload?}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "code": self.kind.code(),
            "status": self.kind.status().as_u16(),
            "message": self.message,
        });
        if let (Some(payload), Some(map)) = (&self.payload, body.as_object_mut()) {
            map.insert("payload".to_string(), payload.clone());
        }
        body
    }
}

// ---------------------------------------------------------------------------
// OperationError
// ---------------------------------------------------------------------------

/// Errors returned by endpoints and the router.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Crud(#[from] CrudError),
    #[error("unknown endpoint: {name}")]
    UnknownEndpoint { name: String },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Taxonomy kind, when the error is a taxonomized failure.
    #[must_use]
    pub fn kind(&self) -> Option<CrudErrorKind> {
        match self {
            Self::Crud(err) => Some(err.kind),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Crud(err) => err.kind.status(),
            Self::UnknownEndpoint { .. } => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
