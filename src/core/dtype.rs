//! Tensor element types and their byte widths.

use crate::core::errors::ServeError;

/// Element type of a tensor, using the inference server's protocol naming.
///
/// The set is closed: an element type unknown to this enum is rejected at
/// negotiation time rather than carried around as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// Boolean, one byte per element.
    Bool,
    /// 8-bit unsigned integer.
    Uint8,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit unsigned integer.
    Uint16,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit unsigned integer.
    Uint32,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit unsigned integer.
    Uint64,
    /// 64-bit signed integer.
    Int64,
    /// 16-bit floating point.
    Fp16,
    /// 32-bit floating point.
    Fp32,
    /// 64-bit floating point.
    Fp64,
}

impl ElementType {
    /// Width of one element in bytes.
    pub fn byte_width(&self) -> usize {
        match self {
            ElementType::Bool | ElementType::Uint8 | ElementType::Int8 => 1,
            ElementType::Uint16 | ElementType::Int16 | ElementType::Fp16 => 2,
            ElementType::Uint32 | ElementType::Int32 | ElementType::Fp32 => 4,
            ElementType::Uint64 | ElementType::Int64 | ElementType::Fp64 => 8,
        }
    }

    /// Protocol string form (`"FP32"`, `"UINT8"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Bool => "BOOL",
            ElementType::Uint8 => "UINT8",
            ElementType::Int8 => "INT8",
            ElementType::Uint16 => "UINT16",
            ElementType::Int16 => "INT16",
            ElementType::Uint32 => "UINT32",
            ElementType::Int32 => "INT32",
            ElementType::Uint64 => "UINT64",
            ElementType::Int64 => "INT64",
            ElementType::Fp16 => "FP16",
            ElementType::Fp32 => "FP32",
            ElementType::Fp64 => "FP64",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ElementType {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOL" => Ok(ElementType::Bool),
            "UINT8" => Ok(ElementType::Uint8),
            "INT8" => Ok(ElementType::Int8),
            "UINT16" => Ok(ElementType::Uint16),
            "INT16" => Ok(ElementType::Int16),
            "UINT32" => Ok(ElementType::Uint32),
            "INT32" => Ok(ElementType::Int32),
            "UINT64" => Ok(ElementType::Uint64),
            "INT64" => Ok(ElementType::Int64),
            "FP16" => Ok(ElementType::Fp16),
            "FP32" => Ok(ElementType::Fp32),
            "FP64" => Ok(ElementType::Fp64),
            other => Err(ServeError::config_error(format!(
                "unexpected element datatype '{other}'"
            ))),
        }
    }
}
