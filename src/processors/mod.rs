//! Image pre- and post-processing for the classification pipeline.

pub mod normalization;
pub mod postprocess;
pub mod preprocess;

pub use normalization::Normalize;
pub use postprocess::{softmax, ClassificationPostprocessor, ClassificationResult};
pub use preprocess::{ImagePreprocessor, PreprocessConfig};
