//! Pixel normalization for model input tensors.

use image::RgbImage;

use crate::core::descriptor::TensorFormat;
use crate::core::errors::{ServeError, ServeResult};

/// Normalizes an RGB image into a float tensor buffer.
///
/// The per-channel scale/mean/std configuration is folded into
/// `alpha = scale / std` and `beta = -mean / std` once at construction, so
/// the per-pixel work is a single multiply-add.
#[derive(Debug, Clone)]
pub struct Normalize {
    /// Scaling factors per channel (alpha = scale / std).
    alpha: Vec<f32>,
    /// Offsets per channel (beta = -mean / std).
    beta: Vec<f32>,
}

impl Normalize {
    /// Creates a normalizer from scale, per-channel means, and per-channel
    /// standard deviations (RGB order).
    pub fn new(scale: f32, mean: Vec<f32>, std: Vec<f32>) -> ServeResult<Self> {
        if scale <= 0.0 {
            return Err(ServeError::config_error(
                "normalization scale must be greater than 0",
            ));
        }
        if mean.len() != 3 || std.len() != 3 {
            return Err(ServeError::config_error(
                "normalization mean and std must have exactly 3 elements for RGB",
            ));
        }
        for (i, &s) in std.iter().enumerate() {
            if s <= 0.0 {
                return Err(ServeError::config_error(format!(
                    "standard deviation at index {i} must be greater than 0, got {s}"
                )));
            }
        }

        let alpha: Vec<f32> = std.iter().map(|s| scale / s).collect();
        let beta: Vec<f32> = mean.iter().zip(&std).map(|(m, s)| -m / s).collect();
        Ok(Self { alpha, beta })
    }

    /// Normalizes one image into a flat buffer in the requested layout:
    /// channel-major for channel-first models, interleaved for
    /// channel-last models.
    pub fn apply(&self, img: &RgbImage, format: TensorFormat) -> Vec<f32> {
        let (width, height) = img.dimensions();
        let channels = 3u32;
        let mut result = vec![0.0f32; (channels * height * width) as usize];

        match format {
            TensorFormat::Nchw => {
                for c in 0..channels {
                    for y in 0..height {
                        for x in 0..width {
                            let pixel = img.get_pixel(x, y);
                            let value = pixel[c as usize] as f32;
                            let dst_idx = (c * height * width + y * width + x) as usize;
                            result[dst_idx] =
                                value * self.alpha[c as usize] + self.beta[c as usize];
                        }
                    }
                }
            }
            TensorFormat::Nhwc => {
                for y in 0..height {
                    for x in 0..width {
                        let pixel = img.get_pixel(x, y);
                        for c in 0..channels {
                            let value = pixel[c as usize] as f32;
                            let dst_idx = (y * width * channels + x * channels + c) as usize;
                            result[dst_idx] =
                                value * self.alpha[c as usize] + self.beta[c as usize];
                        }
                    }
                }
            }
        }
        result
    }
}
