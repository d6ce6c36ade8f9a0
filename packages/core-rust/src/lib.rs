//! crudkit core: structured filters, authorization filters, request and
//! response shapes, and declarative validation schemas.

pub mod auth;
pub mod context;
pub mod filter;
pub mod params;
pub mod schema;
pub mod types;

pub use auth::{Authorization, AuthorizationFilter, MethodOptions, QueryOptionsPatch, RequestPayload};
pub use context::RequestContext;
pub use filter::{conjoin, PredicateNode, PredicateOp, SortDirection, SortKey, StructuredFilter};
pub use params::{
    CountOutput, CountParams, CreateFields, CreateOutput, CreateParams, ListOutput, ListParams,
    ReadParams, RemoveOutput, RemoveParams, RestoreOutput, RestoreParams, TargetParams,
    UpdateOutput, UpdateParams, ViewOutput, ViewParams,
};
pub use schema::{EntitySchema, FieldDef, FieldType, FieldViolation, Rule, Validator};
pub use types::{primary_key_map, strip_primary_keys, Entity, Principal};
