//! Model-configuration negotiation.
//!
//! An engine is only usable once the backend's declared model contract has
//! been fetched, validated, and condensed into a
//! [`ModelDescriptor`](crate::core::descriptor::ModelDescriptor). This
//! module defines the raw document types the remote server returns for its
//! metadata and configuration endpoints, and the [`negotiate`] function
//! that turns them into a descriptor or fails.
//!
//! The local session engine reuses the same path: it synthesizes the two
//! documents from the session's reported tensor metadata, so both backends
//! run the identical validation sequence exactly once, at construction.
//!
//! Validation encodes the single invariant the rest of the pipeline relies
//! on: one image tensor in, one flat vector of class scores out. Every
//! check is terminal; the first failure wins and there is no re-negotiation
//! without reconstructing the engine.

use serde::Deserialize;

use crate::core::descriptor::{ModelDescriptor, TensorFormat};
use crate::core::dtype::ElementType;
use crate::core::errors::{ServeError, ServeResult};

/// One tensor entry in a model-metadata document.
#[derive(Debug, Clone, Deserialize)]
pub struct TensorMetadata {
    /// Name the backend uses to address the tensor.
    pub name: String,
    /// Protocol datatype string (`"FP32"`, ...).
    pub datatype: String,
    /// Declared shape. Includes the batch axis (reported as `-1`) when the
    /// model supports batching.
    pub shape: Option<Vec<i64>>,
}

/// The metadata document for one model, as served by the inference server.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelMetadata {
    /// Model name.
    pub name: String,
    /// Declared inputs.
    #[serde(default)]
    pub inputs: Vec<TensorMetadata>,
    /// Declared outputs.
    #[serde(default)]
    pub outputs: Vec<TensorMetadata>,
}

/// One tensor entry in a model-configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigTensor {
    /// Tensor name.
    #[serde(default)]
    pub name: String,
    /// Input layout tag (`"FORMAT_NCHW"` / `"FORMAT_NHWC"`), inputs only.
    #[serde(default)]
    pub format: Option<String>,
    /// Configured dims, batch axis excluded.
    #[serde(default)]
    pub dims: Vec<i64>,
}

/// The configuration document for one model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfigDoc {
    /// Maximum batch size; 0 means the model does not support batching.
    #[serde(default)]
    pub max_batch_size: i64,
    /// Configured inputs.
    #[serde(default)]
    pub input: Vec<ConfigTensor>,
    /// Configured outputs.
    #[serde(default)]
    pub output: Vec<ConfigTensor>,
}

/// Validates a model's metadata and configuration against the caller's
/// desired batch size and produces the negotiated descriptor.
///
/// The checks run in a fixed order and the first failure is terminal:
///
/// 1. exactly one input and one output, in both documents;
/// 2. output datatype must be `FP32`;
/// 3. batch-size compatibility with `max_batch_size`;
/// 4. output must reduce to a flat score vector (batch axis skipped);
/// 5. input must have channel + two spatial axes (batch axis skipped);
/// 6. input layout must be channel-first or channel-last;
/// 7. derive spatial extents and byte sizes.
pub fn negotiate(
    metadata: &ModelMetadata,
    config: &ModelConfigDoc,
    batch_size: usize,
) -> ServeResult<ModelDescriptor> {
    if batch_size == 0 {
        return Err(ServeError::invalid_input(
            "requested batch size must be at least 1",
        ));
    }

    if metadata.inputs.len() != 1 {
        return Err(ServeError::config_error(format!(
            "expecting 1 input, got {}",
            metadata.inputs.len()
        )));
    }
    if metadata.outputs.len() != 1 {
        return Err(ServeError::config_error(format!(
            "expecting 1 output, got {}",
            metadata.outputs.len()
        )));
    }
    if config.input.len() != 1 {
        return Err(ServeError::config_error(format!(
            "expecting 1 input in model configuration, got {}",
            config.input.len()
        )));
    }
    if config.output.len() != 1 {
        return Err(ServeError::config_error(format!(
            "expecting 1 output in model configuration, got {}",
            config.output.len()
        )));
    }

    let input_metadata = &metadata.inputs[0];
    let output_metadata = &metadata.outputs[0];
    let input_config = &config.input[0];

    // Postprocessing interprets the output buffer as float scores.
    if output_metadata.datatype != "FP32" {
        return Err(ServeError::config_error(format!(
            "expecting output datatype to be FP32, model '{}' output type is '{}'",
            metadata.name, output_metadata.datatype
        )));
    }
    let output_dtype = ElementType::Fp32;

    if config.max_batch_size < 0 {
        return Err(ServeError::config_error(format!(
            "negative max_batch_size {} for model '{}'",
            config.max_batch_size, metadata.name
        )));
    }
    let max_batch_size = config.max_batch_size as usize;

    // max_batch_size of 0 means the input tensors carry no batch axis and
    // only a single sample may be inferred per call.
    if max_batch_size == 0 {
        if batch_size != 1 {
            return Err(ServeError::config_error(format!(
                "batching not supported for model '{}'",
                metadata.name
            )));
        }
    } else if batch_size > max_batch_size {
        return Err(ServeError::config_error(format!(
            "expecting batch size <= {} for model '{}'",
            max_batch_size, metadata.name
        )));
    }
    let batching = max_batch_size > 0;
    let batch_axes = usize::from(batching);

    let output_full_shape = output_metadata.shape.as_ref().ok_or_else(|| {
        ServeError::config_error(format!(
            "output missing shape in the metadata for model '{}'",
            metadata.name
        ))
    })?;
    // The output must be a vector, but any number of dimensions is allowed
    // as long as all but one are size 1 ({10}, {1,10}, {10,1,1} are all ok).
    let output_sample_dims = &output_full_shape[batch_axes.min(output_full_shape.len())..];
    let mut non_one_count = 0usize;
    for &dim in output_sample_dims {
        if dim == -1 {
            return Err(ServeError::config_error(
                "variable-size dimension in model output not supported",
            ));
        }
        if dim < 1 {
            return Err(ServeError::config_error(format!(
                "non-positive dimension {} in model '{}' output shape",
                dim, metadata.name
            )));
        }
        if dim > 1 {
            non_one_count += 1;
            if non_one_count > 1 {
                return Err(ServeError::config_error(
                    "expecting model output to be a vector",
                ));
            }
        }
    }

    let input_full_shape = input_metadata.shape.as_ref().ok_or_else(|| {
        ServeError::config_error(format!(
            "input missing shape in the metadata for model '{}'",
            metadata.name
        ))
    })?;
    // Channel plus two spatial axes, in either order, batch axis aside.
    let expected_input_dims = 3 + batch_axes;
    if input_full_shape.len() != expected_input_dims {
        return Err(ServeError::config_error(format!(
            "expecting input to have {} dimensions, model '{}' input has {}",
            expected_input_dims,
            metadata.name,
            input_full_shape.len()
        )));
    }
    let input_sample_dims = &input_full_shape[batch_axes..];
    for &dim in input_sample_dims {
        if dim < 1 {
            return Err(ServeError::config_error(format!(
                "variable-size dimension {} in model '{}' input not supported",
                dim, metadata.name
            )));
        }
    }

    let format_tag = input_config.format.as_deref().ok_or_else(|| {
        ServeError::config_error(format!(
            "model '{}' configuration is missing the input format",
            metadata.name
        ))
    })?;
    let input_format = TensorFormat::parse(format_tag)?;

    let input_dtype: ElementType = input_metadata.datatype.parse().map_err(|_| {
        ServeError::config_error(format!(
            "unexpected input datatype '{}' for model '{}'",
            input_metadata.datatype, metadata.name
        ))
    })?;

    let (input_channels, input_height, input_width) = match input_format {
        TensorFormat::Nchw => (
            input_sample_dims[0] as usize,
            input_sample_dims[1] as usize,
            input_sample_dims[2] as usize,
        ),
        TensorFormat::Nhwc => (
            input_sample_dims[2] as usize,
            input_sample_dims[0] as usize,
            input_sample_dims[1] as usize,
        ),
    };

    let mut input_shape = Vec::with_capacity(expected_input_dims);
    let mut output_shape = Vec::with_capacity(output_sample_dims.len() + batch_axes);
    if batching {
        input_shape.push(batch_size as i64);
        output_shape.push(batch_size as i64);
    }
    input_shape.extend_from_slice(input_sample_dims);
    output_shape.extend_from_slice(output_sample_dims);

    let input_elements: i64 = input_shape.iter().product();
    let output_elements: i64 = output_shape.iter().product();
    let input_byte_size = input_elements as usize * input_dtype.byte_width();
    let output_byte_size = output_elements as usize * output_dtype.byte_width();

    let descriptor = ModelDescriptor {
        input_name: input_metadata.name.clone(),
        output_name: output_metadata.name.clone(),
        input_dtype,
        output_dtype,
        input_format,
        input_shape,
        output_shape,
        input_byte_size,
        output_byte_size,
        max_batch_size,
        channel_first: input_format.channel_first(),
        input_height,
        input_width,
        input_channels,
    };
    descriptor.check_invariants()?;
    Ok(descriptor)
}
