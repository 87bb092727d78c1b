//! Local session engine backed by ONNX Runtime.
//!
//! The model is loaded once at construction; the session's reported tensor
//! metadata is synthesized into the same negotiation documents the remote
//! backend fetches, so both variants share one validation path. The session
//! handle requires exclusive access to run, so it lives behind a mutex
//! owned by this instance.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::ArrayD;
use ort::logging::LogLevel;
use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{TensorRef, ValueType};
use rayon::prelude::*;
use tracing::{debug, info};

use super::{validate_requests, InferenceEngine, InferenceRequest, InferenceResult};
use crate::core::batch_plan::plan_batches;
use crate::core::descriptor::ModelDescriptor;
use crate::core::dtype::ElementType;
use crate::core::errors::{ServeError, ServeResult};
use crate::core::negotiate::{negotiate, ConfigTensor, ModelConfigDoc, ModelMetadata, TensorMetadata};

fn element_name(ty: TensorElementType) -> ServeResult<&'static str> {
    match ty {
        TensorElementType::Bool => Ok("BOOL"),
        TensorElementType::Uint8 => Ok("UINT8"),
        TensorElementType::Int8 => Ok("INT8"),
        TensorElementType::Uint16 => Ok("UINT16"),
        TensorElementType::Int16 => Ok("INT16"),
        TensorElementType::Uint32 => Ok("UINT32"),
        TensorElementType::Int32 => Ok("INT32"),
        TensorElementType::Uint64 => Ok("UINT64"),
        TensorElementType::Int64 => Ok("INT64"),
        TensorElementType::Float16 => Ok("FP16"),
        TensorElementType::Float32 => Ok("FP32"),
        TensorElementType::Float64 => Ok("FP64"),
        other => Err(ServeError::config_error(format!(
            "unsupported tensor element type {other:?}"
        ))),
    }
}

/// Splits a session-reported input shape into batching capacity and
/// per-sample dims. A rank-4 static shape carries its batch capacity in
/// the leading axis; rank-3 models do not batch.
fn batch_capacity_and_dims(shape: &[i64], model_name: &str) -> ServeResult<(i64, Vec<i64>)> {
    if shape.len() == 4 {
        if shape[0] < 1 {
            return Err(ServeError::config_error(format!(
                "variable-size batch dimension in model '{model_name}' input not supported"
            )));
        }
        Ok((shape[0], shape[1..].to_vec()))
    } else {
        Ok((0, shape.to_vec()))
    }
}

/// Infers the layout tag from the per-sample dims. The channel axis is the
/// one holding 3 channels; ambiguous shapes default to channel-first.
fn detect_format(sample_dims: &[i64]) -> &'static str {
    if sample_dims.first() == Some(&3) {
        "FORMAT_NCHW"
    } else if sample_dims.len() == 3 && sample_dims[2] == 3 {
        "FORMAT_NHWC"
    } else {
        "FORMAT_NCHW"
    }
}

fn tensor_metadata(
    name: &str,
    value_type: &ValueType,
    model_name: &str,
) -> ServeResult<TensorMetadata> {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        return Err(ServeError::config_error(format!(
            "model '{model_name}' tensor '{name}' is not a plain tensor"
        )));
    };
    Ok(TensorMetadata {
        name: name.to_string(),
        datatype: element_name(*ty)?.to_string(),
        shape: Some(shape.iter().copied().collect()),
    })
}

/// Builds the negotiation documents from a loaded session's I/O metadata.
fn session_contract(
    session: &Session,
    model_name: &str,
) -> ServeResult<(ModelMetadata, ModelConfigDoc)> {
    let inputs: Vec<TensorMetadata> = session
        .inputs
        .iter()
        .map(|input| tensor_metadata(&input.name, &input.input_type, model_name))
        .collect::<ServeResult<_>>()?;
    let outputs: Vec<TensorMetadata> = session
        .outputs
        .iter()
        .map(|output| tensor_metadata(&output.name, &output.output_type, model_name))
        .collect::<ServeResult<_>>()?;

    let first_input_shape = inputs
        .first()
        .and_then(|i| i.shape.clone())
        .unwrap_or_default();
    let (max_batch_size, sample_dims) = batch_capacity_and_dims(&first_input_shape, model_name)?;
    let format = detect_format(&sample_dims);

    let config = ModelConfigDoc {
        max_batch_size,
        input: inputs
            .iter()
            .map(|i| ConfigTensor {
                name: i.name.clone(),
                format: Some(format.to_string()),
                dims: sample_dims.clone(),
            })
            .collect(),
        output: outputs
            .iter()
            .map(|o| ConfigTensor {
                name: o.name.clone(),
                format: None,
                dims: o.shape.clone().unwrap_or_default(),
            })
            .collect(),
    };
    let metadata = ModelMetadata {
        name: model_name.to_string(),
        inputs,
        outputs,
    };
    Ok((metadata, config))
}

/// Local in-process engine running a loaded ONNX model.
pub struct OnnxEngine {
    session: Mutex<Session>,
    descriptor: ModelDescriptor,
    batch_size: usize,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OnnxEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEngine")
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl OnnxEngine {
    /// Loads the model file into a session and negotiates the descriptor
    /// for the requested batch size.
    pub fn new(model_path: impl AsRef<Path>, batch_size: usize) -> ServeResult<Self> {
        let path = model_path.as_ref();
        let session = Session::builder()?
            .with_log_level(LogLevel::Error)?
            .commit_from_file(path)
            .map_err(|e| {
                ServeError::internal_with(
                    format!("failed to create ONNX session for '{}'", path.display()),
                    e,
                )
            })?;
        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        let (metadata, config) = session_contract(&session, &model_name)?;
        let descriptor = negotiate(&metadata, &config, batch_size)?;
        info!(
            model = %model_name,
            path = %path.display(),
            batch_size,
            "loaded local model session"
        );

        Ok(Self {
            session: Mutex::new(session),
            descriptor,
            batch_size,
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// Path of the loaded model file.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl InferenceEngine for OnnxEngine {
    fn is_ready(&self) -> bool {
        !self.session.is_poisoned()
    }

    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn infer(&self, requests: &[InferenceRequest]) -> ServeResult<Vec<InferenceResult>> {
        validate_requests(requests, &self.descriptor, self.batch_size)?;
        let plan = plan_batches(requests.len(), self.batch_size)?;

        let sample_elements = self.descriptor.sample_input_elements();
        let input_dims: Vec<usize> = self
            .descriptor
            .input_shape
            .iter()
            .map(|&d| d as usize)
            .collect();
        let batch_elements: usize = input_dims.iter().product();
        let expected_output_elements: usize = self
            .descriptor
            .output_shape
            .iter()
            .map(|&d| d as usize)
            .product();

        let mut session = self
            .session
            .lock()
            .map_err(|_| ServeError::internal("failed to acquire session lock"))?;

        let mut results = Vec::with_capacity(plan.len());
        for (sent_count, batch) in plan.iter().enumerate() {
            let mut batch_buffer = vec![0.0f32; batch_elements];
            if self.batch_size <= 1 {
                batch_buffer.copy_from_slice(&requests[batch[0]].data);
            } else {
                batch_buffer
                    .par_chunks_mut(sample_elements)
                    .zip(batch.par_iter())
                    .for_each(|(chunk, &sample_idx)| {
                        chunk.copy_from_slice(&requests[sample_idx].data);
                    });
            }

            debug!(
                request_id = sent_count,
                batch_size = self.batch_size,
                model = %self.model_name,
                "dispatching inference batch"
            );

            let array = ArrayD::from_shape_vec(ndarray::IxDyn(&input_dims), batch_buffer)
                .map_err(ServeError::Tensor)?;
            let input_tensor = TensorRef::from_array_view(array.view()).map_err(|e| {
                ServeError::internal_with(
                    format!("failed to convert input tensor with shape {input_dims:?}"),
                    e,
                )
            })?;
            let inputs = ort::inputs![self.descriptor.input_name.as_str() => input_tensor];

            let outputs = session.run(inputs).map_err(|e| {
                ServeError::inference_with(
                    format!(
                        "ONNX Runtime inference failed for request {} of model '{}'",
                        sent_count, self.model_name
                    ),
                    e,
                )
            })?;

            let (output_shape, output_data) = outputs[self.descriptor.output_name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    ServeError::inference_with(
                        format!(
                            "failed to extract output tensor '{}' as f32",
                            self.descriptor.output_name
                        ),
                        e,
                    )
                })?;

            if output_data.len() != expected_output_elements {
                return Err(ServeError::inference(format!(
                    "output data size mismatch: expected {}, got {}",
                    expected_output_elements,
                    output_data.len()
                )));
            }

            results.push(InferenceResult {
                data: output_data.to_vec(),
                dtype: ElementType::Fp32,
                shape: output_shape.to_vec(),
                output_name: self.descriptor.output_name.clone(),
                byte_size: output_data.len() * ElementType::Fp32.byte_width(),
                status: true,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file_fails_construction() {
        assert!(OnnxEngine::new("definitely_missing.onnx", 1).is_err());
    }

    #[test]
    fn test_batch_capacity_from_rank_four_shape() {
        let (capacity, dims) = batch_capacity_and_dims(&[8, 3, 224, 224], "m").unwrap();
        assert_eq!(capacity, 8);
        assert_eq!(dims, vec![3, 224, 224]);
    }

    #[test]
    fn test_rank_three_shape_disables_batching() {
        let (capacity, dims) = batch_capacity_and_dims(&[3, 384, 384], "m").unwrap();
        assert_eq!(capacity, 0);
        assert_eq!(dims, vec![3, 384, 384]);
    }

    #[test]
    fn test_dynamic_batch_axis_rejected() {
        assert!(batch_capacity_and_dims(&[-1, 3, 224, 224], "m").is_err());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format(&[3, 384, 384]), "FORMAT_NCHW");
        assert_eq!(detect_format(&[224, 224, 3]), "FORMAT_NHWC");
        assert_eq!(detect_format(&[1, 28, 28]), "FORMAT_NCHW");
    }

    #[test]
    fn test_element_names_follow_protocol_strings() {
        assert_eq!(element_name(TensorElementType::Float32).unwrap(), "FP32");
        assert_eq!(element_name(TensorElementType::Uint8).unwrap(), "UINT8");
        assert_eq!(element_name(TensorElementType::Int64).unwrap(), "INT64");
        assert!(element_name(TensorElementType::String).is_err());
    }
}
