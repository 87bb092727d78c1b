//! The validated, immutable description of a model's input/output contract.

use crate::core::dtype::ElementType;
use crate::core::errors::{ServeError, ServeResult};

/// Tensor layout for image inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorFormat {
    /// Channel-first layout (batch, channel, height, width).
    Nchw,
    /// Channel-last layout (batch, height, width, channel).
    Nhwc,
}

impl TensorFormat {
    /// Parses the inference server's format tag.
    pub fn parse(tag: &str) -> ServeResult<Self> {
        match tag {
            "FORMAT_NCHW" => Ok(TensorFormat::Nchw),
            "FORMAT_NHWC" => Ok(TensorFormat::Nhwc),
            other => Err(ServeError::config_error(format!(
                "unexpected input format '{other}', expecting FORMAT_NCHW or FORMAT_NHWC"
            ))),
        }
    }

    /// True when the channel axis precedes the spatial axes.
    pub fn channel_first(&self) -> bool {
        matches!(self, TensorFormat::Nchw)
    }

    /// Protocol string form of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            TensorFormat::Nchw => "FORMAT_NCHW",
            TensorFormat::Nhwc => "FORMAT_NHWC",
        }
    }
}

impl std::fmt::Display for TensorFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model's negotiated input/output contract.
///
/// Built once by [`crate::core::negotiate::negotiate`] when an engine is
/// constructed and treated as immutable afterwards. Shapes include the
/// batch dimension when the model supports batching; a `-1` dimension is
/// never stored (dynamic axes are rejected during negotiation).
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    /// Name the backend uses to address the input tensor.
    pub input_name: String,
    /// Name the backend uses to address the output tensor.
    pub output_name: String,
    /// Element type of the input tensor.
    pub input_dtype: ElementType,
    /// Element type of the output tensor (always `FP32` after negotiation).
    pub output_dtype: ElementType,
    /// Declared input layout.
    pub input_format: TensorFormat,
    /// Full input shape, batch dimension included when batching is enabled.
    pub input_shape: Vec<i64>,
    /// Full output shape, batch dimension included when batching is enabled.
    pub output_shape: Vec<i64>,
    /// Total input size in bytes: product(input_shape) x width(input_dtype).
    pub input_byte_size: usize,
    /// Total output size in bytes: product(output_shape) x width(output_dtype).
    pub output_byte_size: usize,
    /// Maximum batch size the backend accepts; 0 means batching is not
    /// supported and exactly one sample must be submitted per call.
    pub max_batch_size: usize,
    /// Redundant convenience flag; must always agree with `input_format`.
    pub channel_first: bool,
    /// Input image height derived from the shape and layout.
    pub input_height: usize,
    /// Input image width derived from the shape and layout.
    pub input_width: usize,
    /// Input channel count derived from the shape and layout.
    pub input_channels: usize,
}

impl ModelDescriptor {
    /// Number of elements in one sample of the input tensor (batch axis
    /// excluded).
    pub fn sample_input_elements(&self) -> usize {
        self.input_channels * self.input_height * self.input_width
    }

    /// Per-sample input shape in the declared layout, batch axis excluded.
    pub fn sample_input_shape(&self) -> Vec<i64> {
        match self.input_format {
            TensorFormat::Nchw => vec![
                self.input_channels as i64,
                self.input_height as i64,
                self.input_width as i64,
            ],
            TensorFormat::Nhwc => vec![
                self.input_height as i64,
                self.input_width as i64,
                self.input_channels as i64,
            ],
        }
    }

    /// Checks the internal consistency a negotiated descriptor must hold.
    ///
    /// The `channel_first` flag is kept for convenience and must agree with
    /// `input_format`; the byte sizes must match the shape/dtype products.
    pub fn check_invariants(&self) -> ServeResult<()> {
        if self.channel_first != self.input_format.channel_first() {
            return Err(ServeError::config_error(format!(
                "channel_first flag ({}) disagrees with input format {}",
                self.channel_first, self.input_format
            )));
        }
        let input_elements: i64 = self.input_shape.iter().product();
        if input_elements as usize * self.input_dtype.byte_width() != self.input_byte_size {
            return Err(ServeError::config_error(format!(
                "input byte size {} does not match shape {:?} of {}",
                self.input_byte_size, self.input_shape, self.input_dtype
            )));
        }
        let output_elements: i64 = self.output_shape.iter().product();
        if output_elements as usize * self.output_dtype.byte_width() != self.output_byte_size {
            return Err(ServeError::config_error(format!(
                "output byte size {} does not match shape {:?} of {}",
                self.output_byte_size, self.output_shape, self.output_dtype
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor {
            input_name: "input".to_string(),
            output_name: "output".to_string(),
            input_dtype: ElementType::Fp32,
            output_dtype: ElementType::Fp32,
            input_format: TensorFormat::Nchw,
            input_shape: vec![1, 3, 384, 384],
            output_shape: vec![1, 1000],
            input_byte_size: 3 * 384 * 384 * 4,
            output_byte_size: 1000 * 4,
            max_batch_size: 1,
            channel_first: true,
            input_height: 384,
            input_width: 384,
            input_channels: 3,
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(TensorFormat::parse("FORMAT_NCHW").unwrap(), TensorFormat::Nchw);
        assert_eq!(TensorFormat::parse("FORMAT_NHWC").unwrap(), TensorFormat::Nhwc);
        assert!(TensorFormat::parse("FORMAT_NONE").is_err());
    }

    #[test]
    fn test_sample_shape_follows_layout() {
        let mut desc = descriptor();
        assert_eq!(desc.sample_input_shape(), vec![3, 384, 384]);
        assert_eq!(desc.sample_input_elements(), 3 * 384 * 384);

        desc.input_format = TensorFormat::Nhwc;
        desc.channel_first = false;
        assert_eq!(desc.sample_input_shape(), vec![384, 384, 3]);
    }

    #[test]
    fn test_invariants_hold_for_consistent_descriptor() {
        assert!(descriptor().check_invariants().is_ok());
    }

    #[test]
    fn test_channel_first_mismatch_is_invariant_violation() {
        let mut desc = descriptor();
        desc.channel_first = false;
        assert!(desc.check_invariants().is_err());
    }

    #[test]
    fn test_byte_size_mismatch_is_invariant_violation() {
        let mut desc = descriptor();
        desc.input_byte_size += 1;
        assert!(desc.check_invariants().is_err());
    }
}
