//! The polymorphic inference-engine interface and its request/result types.
//!
//! An engine owns its backend resource (a remote client connection or an
//! in-process session) for its whole lifetime, exposes the descriptor it
//! negotiated at construction, and dispatches batches strictly
//! sequentially. Engines are object-safe so callers can hold a
//! `Box<dyn InferenceEngine>` and pick the backend at runtime.

mod onnx;
mod triton;

pub use onnx::OnnxEngine;
pub use triton::{TritonClientConfig, TritonEngine};

use crate::core::descriptor::ModelDescriptor;
use crate::core::dtype::ElementType;
use crate::core::errors::{ServeError, ServeResult};

/// One sample's typed input buffer, destined for the named input tensor.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Element buffer in the layout the descriptor declares.
    pub data: Vec<f32>,
    /// Element type of the buffer.
    pub dtype: ElementType,
    /// Per-sample logical shape, batch axis excluded.
    pub shape: Vec<i64>,
    /// Name of the input tensor this sample is destined for.
    pub input_name: String,
}

/// One batch's raw output tensor as returned by a backend.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    /// Raw output elements, row-major.
    pub data: Vec<f32>,
    /// Element type of the buffer.
    pub dtype: ElementType,
    /// Output shape as reported by the backend (batch axis leading when
    /// batching is enabled).
    pub shape: Vec<i64>,
    /// Name of the output tensor.
    pub output_name: String,
    /// Total size of the buffer in bytes.
    pub byte_size: usize,
    /// True when the backend reported the batch as successfully inferred.
    pub status: bool,
}

/// A backend capable of running inference against one negotiated model.
///
/// Implementations must be safe to share across concurrent callers; any
/// per-call scratch they reuse between batches is owned per instance and
/// synchronized internally.
pub trait InferenceEngine: Send + Sync {
    /// True when the backend is reachable and the model is loaded. Callers
    /// use this to fail fast instead of invoking [`infer`](Self::infer) on
    /// a broken engine.
    fn is_ready(&self) -> bool;

    /// The contract negotiated at construction.
    fn descriptor(&self) -> &ModelDescriptor;

    /// Runs the batched inference protocol over `requests` and returns one
    /// [`InferenceResult`] per dispatched batch, in dispatch order.
    ///
    /// The first failing batch aborts the whole operation; no partial
    /// results are returned and nothing is retried.
    fn infer(&self, requests: &[InferenceRequest]) -> ServeResult<Vec<InferenceResult>>;
}

/// Validates a request sequence against the negotiated contract before any
/// batch is assembled. Violations here would otherwise corrupt inference
/// results silently.
pub(crate) fn validate_requests(
    requests: &[InferenceRequest],
    descriptor: &ModelDescriptor,
    batch_size: usize,
) -> ServeResult<()> {
    if requests.is_empty() {
        return Err(ServeError::invalid_input(
            "at least one sample is required per inference call",
        ));
    }

    let sample_elements = descriptor.sample_input_elements();
    for (idx, request) in requests.iter().enumerate() {
        if request.dtype != descriptor.input_dtype {
            return Err(ServeError::invalid_input(format!(
                "sample {} has datatype {}, model expects {}",
                idx, request.dtype, descriptor.input_dtype
            )));
        }
        if request.data.len() != sample_elements {
            return Err(ServeError::invalid_input(format!(
                "sample {} has {} elements, model expects {} per sample",
                idx,
                request.data.len(),
                sample_elements
            )));
        }
        let batch_bytes = request.data.len() * request.dtype.byte_width() * batch_size;
        if batch_bytes > descriptor.input_byte_size {
            return Err(ServeError::invalid_input(format!(
                "assembled batch would be {} bytes, model input allows {}",
                batch_bytes, descriptor.input_byte_size
            )));
        }
    }
    Ok(())
}
