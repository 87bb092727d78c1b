//! Error types for the serving core.
//!
//! This module defines the error enum shared by every fallible operation in
//! the crate, together with the coarse error taxonomy the surrounding HTTP
//! layer uses to pick a response status. No error from a wrapped SDK
//! (`ort`, `reqwest`, `image`) escapes the crate boundary undressed; each
//! call site converts into a [`ServeError`] with enough context to be
//! surfaced verbatim.

use thiserror::Error;

/// Coarse classification of a [`ServeError`], used by callers to map an
/// error to a transport-level response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or a batch-size/shape contract violation.
    Validation,
    /// Payload decoded but is not usable (undecodable or too-small image).
    InvalidData,
    /// Engine not initialized, backend unreachable, or an unexpected SDK
    /// failure.
    Internal,
    /// The backend accepted the call but inference failed or the response
    /// could not be interpreted.
    Inference,
}

impl ErrorKind {
    /// Stable string form of the kind, matching the wire-level error codes
    /// the outer service logs and documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::InvalidData => "INVALID_DATA",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::Inference => "INFERENCE_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the serving core.
#[derive(Error, Debug)]
pub enum ServeError {
    /// Malformed caller input (bad base64, shape/dtype mismatch, bad batch
    /// size).
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of what was wrong with the input.
        message: String,
    },

    /// Input decoded structurally but its content is unusable.
    #[error("invalid data: {message}")]
    InvalidData {
        /// Description of the unusable content.
        message: String,
    },

    /// Model metadata/configuration failed negotiation.
    #[error("configuration: {message}")]
    ConfigError {
        /// Description of the negotiation failure.
        message: String,
    },

    /// The image payload could not be decoded.
    #[error("image decode")]
    ImageDecode(#[source] image::ImageError),

    /// Engine-internal failure: uninitialized state or an unexpected error
    /// from a wrapped SDK call.
    #[error("{context}")]
    Internal {
        /// What the core was doing when the failure occurred.
        context: String,
        /// The underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend ran but the inference call failed or its response could
    /// not be parsed.
    #[error("inference failed: {context}")]
    Inference {
        /// What was being inferred when the failure occurred.
        context: String,
        /// The underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor shape operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// Transport-level error talking to the remote inference server.
    #[error("transport")]
    Transport(#[from] reqwest::Error),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl ServeError {
    /// Creates a validation error from a message.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an invalid-data error from a message.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Creates a configuration/negotiation error from a message.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Creates an internal error with context only.
    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            source: None,
        }
    }

    /// Creates an internal error wrapping an SDK-level failure.
    pub fn internal_with(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an inference error with context only.
    pub fn inference(context: impl Into<String>) -> Self {
        Self::Inference {
            context: context.into(),
            source: None,
        }
    }

    /// Creates an inference error wrapping a backend failure.
    pub fn inference_with(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the coarse taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServeError::InvalidInput { .. } | ServeError::ConfigError { .. } => {
                ErrorKind::Validation
            }
            ServeError::InvalidData { .. } | ServeError::ImageDecode(_) => ErrorKind::InvalidData,
            ServeError::Internal { .. }
            | ServeError::Session(_)
            | ServeError::Tensor(_)
            | ServeError::Transport(_)
            | ServeError::Io(_) => ErrorKind::Internal,
            ServeError::Inference { .. } => ErrorKind::Inference,
        }
    }
}

impl From<image::ImageError> for ServeError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageDecode(error)
    }
}

/// Convenient result alias for serving operations.
pub type ServeResult<T> = Result<T, ServeError>;
