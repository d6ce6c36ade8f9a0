//! Tower middleware layers for the endpoint pipeline.
//!
//! - [`metrics`]: Call timing and outcome via `tracing` spans
//! - [`pipeline`]: Composes the layers into a single service stack

pub mod metrics;
pub mod pipeline;

pub use metrics::MetricsLayer;
pub use pipeline::build_endpoint_pipeline;
