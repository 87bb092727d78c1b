//! # Percept
//!
//! An image-classification serving core: accepts a base64-encoded image,
//! normalizes it into the tensor contract a model declares, dispatches it
//! to an interchangeable inference backend, and converts the raw score
//! tensor into a ranked classification.
//!
//! ## Features
//!
//! - One negotiation path validating a model's declared contract into an
//!   immutable descriptor, shared by every backend
//! - Interchangeable backends behind one object-safe engine trait:
//!   a remote inference server spoken to over HTTP, and a local ONNX
//!   Runtime session
//! - Sequential batched dispatch with per-batch request correlation ids
//! - Cubic-resize + per-channel-normalize preprocessing into channel-first
//!   or channel-last layouts
//! - Numerically stable softmax/arg-max postprocessing with optional label
//!   tables
//!
//! ## Modules
//!
//! * [`core`] - Errors, descriptors, negotiation, batching, and engines
//! * [`pipeline`] - The classifier composition the HTTP layer talks to
//! * [`processors`] - Image pre- and post-processing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use percept::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = OnnxEngine::new("models/imagenet_classifier.onnx", 1)?;
//! let classifier = ImageClassifier::new(
//!     Box::new(engine),
//!     ImagePreprocessor::with_defaults()?,
//!     ClassificationPostprocessor::without_labels(),
//! );
//!
//! let image_base64 = std::fs::read_to_string("payload.b64")?;
//! for result in classifier.classify(image_base64.trim())? {
//!     println!("{} ({}): {:.3}", result.label, result.class_index, result.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Pointing the same pipeline at a remote server is a one-line change:
//!
//! ```rust,no_run
//! use percept::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TritonEngine::new(
//!     TritonClientConfig {
//!         url: "http://localhost:8000".into(),
//!         model_name: "imagenet_classifier".into(),
//!         model_version: String::new(),
//!     },
//!     4,
//! )?;
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod pipeline;
pub mod processors;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        ErrorKind, InferenceEngine, ModelDescriptor, OnnxEngine, ServeError, ServeResult,
        TritonClientConfig, TritonEngine,
    };
    pub use crate::pipeline::ImageClassifier;
    pub use crate::processors::{
        ClassificationPostprocessor, ClassificationResult, ImagePreprocessor, PreprocessConfig,
    };
}
