//! Image preprocessing: base64 payload to typed input tensor.

use base64::Engine as _;
use image::imageops::FilterType;

use crate::core::descriptor::ModelDescriptor;
use crate::core::dtype::ElementType;
use crate::core::engine::InferenceRequest;
use crate::core::errors::{ServeError, ServeResult};
use crate::processors::normalization::Normalize;

/// Configuration of the preprocessing pipeline.
///
/// The normalization constants belong to the pipeline, not to the model
/// descriptor; the defaults are the ImageNet statistics.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Interpolation used for resizing.
    pub resize_filter: FilterType,
    /// Scaling factor applied before normalization.
    pub normalize_scale: f32,
    /// Per-channel means (RGB order).
    pub normalize_mean: Vec<f32>,
    /// Per-channel standard deviations (RGB order).
    pub normalize_std: Vec<f32>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_filter: FilterType::CatmullRom,
            normalize_scale: 1.0 / 255.0,
            normalize_mean: vec![0.485, 0.456, 0.406],
            normalize_std: vec![0.229, 0.224, 0.225],
        }
    }
}

/// Decodes, resizes, and normalizes base64 image payloads into the tensor
/// layout a model descriptor declares.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    resize_filter: FilterType,
    normalize: Normalize,
}

impl ImagePreprocessor {
    /// Creates a preprocessor from the given configuration.
    pub fn new(config: PreprocessConfig) -> ServeResult<Self> {
        let normalize = Normalize::new(
            config.normalize_scale,
            config.normalize_mean,
            config.normalize_std,
        )?;
        Ok(Self {
            resize_filter: config.resize_filter,
            normalize,
        })
    }

    /// Creates a preprocessor with the default configuration.
    pub fn with_defaults() -> ServeResult<Self> {
        Self::new(PreprocessConfig::default())
    }

    /// Converts a base64 image payload into one inference request matching
    /// `descriptor`.
    ///
    /// Failure modes, in order: malformed base64 is a validation error
    /// (before any image-library call); an undecodable buffer or a source
    /// smaller than the model's input extent is invalid data.
    pub fn preprocess(
        &self,
        image_base64: &str,
        descriptor: &ModelDescriptor,
    ) -> ServeResult<InferenceRequest> {
        if descriptor.input_channels != 3 {
            return Err(ServeError::invalid_input(format!(
                "model expects {} channels, preprocessing produces 3-channel RGB",
                descriptor.input_channels
            )));
        }
        if descriptor.input_dtype != ElementType::Fp32 {
            return Err(ServeError::invalid_input(format!(
                "model input datatype {} is not supported by the float preprocessing pipeline",
                descriptor.input_dtype
            )));
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(image_base64)
            .map_err(|e| {
                ServeError::invalid_input(format!("malformed base64 image payload: {e}"))
            })?;

        let decoded = image::load_from_memory(&bytes)
            .map_err(|_| ServeError::invalid_data("invalid image data"))?;
        let rgb = decoded.to_rgb8();

        let (width, height) = rgb.dimensions();
        let target_w = descriptor.input_width as u32;
        let target_h = descriptor.input_height as u32;
        if width < target_w || height < target_h {
            return Err(ServeError::invalid_data(format!(
                "image {width}x{height} is too small to resize to {target_w}x{target_h}"
            )));
        }

        let resized = image::imageops::resize(&rgb, target_w, target_h, self.resize_filter);
        let data = self.normalize.apply(&resized, descriptor.input_format);

        Ok(InferenceRequest {
            data,
            dtype: ElementType::Fp32,
            shape: descriptor.sample_input_shape(),
            input_name: descriptor.input_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::TensorFormat;
    use crate::core::errors::ErrorKind;
    use std::io::Cursor;

    fn descriptor(height: usize, width: usize) -> ModelDescriptor {
        ModelDescriptor {
            input_name: "input".to_string(),
            output_name: "output".to_string(),
            input_dtype: ElementType::Fp32,
            output_dtype: ElementType::Fp32,
            input_format: TensorFormat::Nchw,
            input_shape: vec![1, 3, height as i64, width as i64],
            output_shape: vec![1, 1000],
            input_byte_size: 3 * height * width * 4,
            output_byte_size: 1000 * 4,
            max_batch_size: 1,
            channel_first: true,
            input_height: height,
            input_width: width,
            input_channels: 3,
        }
    }

    fn encoded_png(width: u32, height: u32) -> String {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut cursor = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, image::ImageFormat::Png)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(cursor.into_inner())
    }

    #[test]
    fn test_base64_round_trip() {
        for payload in [&b""[..], b"a", b"serving", &[0u8, 255, 7, 42]] {
            let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(&encoded)
                .unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn test_malformed_base64_is_validation_error() {
        let preprocessor = ImagePreprocessor::with_defaults().unwrap();
        let err = preprocessor
            .preprocess("not-valid-base64!!!", &descriptor(384, 384))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_undecodable_bytes_are_invalid_data() {
        let preprocessor = ImagePreprocessor::with_defaults().unwrap();
        let payload = base64::engine::general_purpose::STANDARD.encode(b"not an image at all");
        let err = preprocessor
            .preprocess(&payload, &descriptor(384, 384))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.to_string().contains("invalid image data"));
    }

    #[test]
    fn test_too_small_source_is_invalid_data() {
        let preprocessor = ImagePreprocessor::with_defaults().unwrap();
        let err = preprocessor
            .preprocess(&encoded_png(128, 128), &descriptor(384, 384))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn test_large_enough_source_yields_exact_buffer_length() {
        let preprocessor = ImagePreprocessor::with_defaults().unwrap();
        let request = preprocessor
            .preprocess(&encoded_png(512, 512), &descriptor(384, 384))
            .unwrap();

        assert_eq!(request.data.len(), 3 * 384 * 384);
        assert_eq!(request.shape, vec![3, 384, 384]);
        assert_eq!(request.input_name, "input");
        assert_eq!(request.dtype, ElementType::Fp32);

        // ImageNet normalization centers the values around zero.
        let mean: f32 = request.data.iter().sum::<f32>() / request.data.len() as f32;
        assert!(mean.abs() < 1.5, "mean {mean} not near zero");
        assert!(request.data.iter().any(|&v| v < 0.0));
        assert!(request.data.iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_channel_last_descriptor_keeps_interleaved_shape() {
        let mut desc = descriptor(384, 384);
        desc.input_format = TensorFormat::Nhwc;
        desc.channel_first = false;

        let preprocessor = ImagePreprocessor::with_defaults().unwrap();
        let request = preprocessor.preprocess(&encoded_png(400, 400), &desc).unwrap();
        assert_eq!(request.shape, vec![384, 384, 3]);
        assert_eq!(request.data.len(), 3 * 384 * 384);
    }
}
