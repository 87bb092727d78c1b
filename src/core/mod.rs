//! The core of the serving pipeline.
//!
//! This module contains the fundamental components of the classification
//! server core:
//! - Error handling and the error-kind taxonomy
//! - Tensor element types and layout tags
//! - The negotiated model descriptor
//! - Model-configuration negotiation
//! - Batch planning for the dispatch loop
//! - The inference-engine interface and its backends
//!
//! It also re-exports the commonly used types for convenience.

pub mod batch_plan;
pub mod descriptor;
pub mod dtype;
pub mod engine;
pub mod errors;
pub mod negotiate;

pub use batch_plan::plan_batches;
pub use descriptor::{ModelDescriptor, TensorFormat};
pub use dtype::ElementType;
pub use engine::{
    InferenceEngine, InferenceRequest, InferenceResult, OnnxEngine, TritonClientConfig,
    TritonEngine,
};
pub use errors::{ErrorKind, ServeError, ServeResult};

/// Initializes the tracing subscriber for logging.
///
/// Sets up the tracing subscriber with an environment filter and a
/// formatting layer. Typically called once at application start.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
