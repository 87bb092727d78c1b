//! The classification pipeline exposed to the surrounding HTTP layer.

use tracing::{debug, warn};

use crate::core::engine::InferenceEngine;
use crate::core::errors::{ServeError, ServeResult};
use crate::processors::postprocess::{ClassificationPostprocessor, ClassificationResult};
use crate::processors::preprocess::ImagePreprocessor;

/// Composes preprocessing, batched inference, and postprocessing behind the
/// two calls the HTTP layer needs.
///
/// Each incoming request flows through synchronously: preprocess, dispatch,
/// postprocess. The classifier holds its engine for its whole lifetime; the
/// engine's internal synchronization makes the classifier safe to share
/// across concurrent requests.
pub struct ImageClassifier {
    engine: Box<dyn InferenceEngine>,
    preprocessor: ImagePreprocessor,
    postprocessor: ClassificationPostprocessor,
}

impl ImageClassifier {
    /// Creates a classifier from an engine and configured processors.
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        preprocessor: ImagePreprocessor,
        postprocessor: ClassificationPostprocessor,
    ) -> Self {
        Self {
            engine,
            preprocessor,
            postprocessor,
        }
    }

    /// True when the underlying engine can accept inference calls.
    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    /// The contract the engine negotiated at construction.
    pub fn descriptor(&self) -> &crate::core::descriptor::ModelDescriptor {
        self.engine.descriptor()
    }

    /// Classifies one base64-encoded image.
    ///
    /// Returns the ranked classification for every inferred sample, in
    /// dispatch order. When the engine's batch size exceeds one, the
    /// repeat-fill batching policy duplicates the image across the batch
    /// and the duplicates appear in the returned sequence.
    pub fn classify(&self, image_base64: &str) -> ServeResult<Vec<ClassificationResult>> {
        if !self.is_ready() {
            warn!("classification requested while engine is not ready");
            return Err(ServeError::internal("inference engine is not initialized"));
        }

        let request = self
            .preprocessor
            .preprocess(image_base64, self.engine.descriptor())?;
        let results = self.engine.infer(std::slice::from_ref(&request))?;

        let mut classifications = Vec::new();
        for result in &results {
            classifications.extend(self.postprocessor.postprocess(result)?);
        }
        debug!(
            batches = results.len(),
            classifications = classifications.len(),
            "classification complete"
        );
        Ok(classifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{ModelDescriptor, TensorFormat};
    use crate::core::dtype::ElementType;
    use crate::core::engine::{InferenceRequest, InferenceResult};
    use crate::core::errors::ErrorKind;
    use base64::Engine as _;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor {
            input_name: "input".to_string(),
            output_name: "output".to_string(),
            input_dtype: ElementType::Fp32,
            output_dtype: ElementType::Fp32,
            input_format: TensorFormat::Nchw,
            input_shape: vec![1, 3, 8, 8],
            output_shape: vec![1, 3],
            input_byte_size: 3 * 8 * 8 * 4,
            output_byte_size: 3 * 4,
            max_batch_size: 1,
            channel_first: true,
            input_height: 8,
            input_width: 8,
            input_channels: 3,
        }
    }

    struct StubEngine {
        descriptor: ModelDescriptor,
        ready: bool,
        fail_inference: bool,
        calls: AtomicUsize,
    }

    impl StubEngine {
        fn new() -> Self {
            Self {
                descriptor: descriptor(),
                ready: true,
                fail_inference: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl InferenceEngine for StubEngine {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn descriptor(&self) -> &ModelDescriptor {
            &self.descriptor
        }

        fn infer(&self, requests: &[InferenceRequest]) -> ServeResult<Vec<InferenceResult>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_inference {
                return Err(ServeError::inference("backend exploded"));
            }
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].data.len(), 3 * 8 * 8);
            Ok(vec![InferenceResult {
                data: vec![0.1, 2.0, 0.3],
                dtype: ElementType::Fp32,
                shape: vec![1, 3],
                output_name: "output".to_string(),
                byte_size: 3 * 4,
                status: true,
            }])
        }
    }

    fn encoded_png(width: u32, height: u32) -> String {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([64, 128, 192]));
        let mut cursor = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, image::ImageFormat::Png)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(cursor.into_inner())
    }

    fn classifier(engine: StubEngine) -> ImageClassifier {
        ImageClassifier::new(
            Box::new(engine),
            ImagePreprocessor::with_defaults().unwrap(),
            ClassificationPostprocessor::without_labels(),
        )
    }

    #[test]
    fn test_classify_end_to_end() {
        let classifier = classifier(StubEngine::new());
        let classifications = classifier.classify(&encoded_png(16, 16)).unwrap();

        assert_eq!(classifications.len(), 1);
        assert_eq!(classifications[0].class_index, 2);
        assert_eq!(classifications[0].label, "class_2");
    }

    #[test]
    fn test_not_ready_engine_fails_fast() {
        let mut engine = StubEngine::new();
        engine.ready = false;
        let classifier = classifier(engine);

        let err = classifier.classify(&encoded_png(16, 16)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("not initialized"));
    }

    #[test]
    fn test_preprocess_failure_skips_inference() {
        let classifier = classifier(StubEngine::new());
        let err = classifier.classify("!!!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let mut engine = StubEngine::new();
        engine.fail_inference = true;
        let classifier = classifier(engine);

        let err = classifier.classify(&encoded_png(16, 16)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
    }
}
