//! Classifies one image file against either backend.
//!
//! Usage:
//!   classify onnx <model.onnx> <image> [labels.txt]
//!   classify triton <url> <model-name> <image> [labels.txt]

use base64::Engine as _;

use percept::core::init_tracing;
use percept::prelude::*;

fn build_engine(args: &[String]) -> Result<(Box<dyn InferenceEngine>, usize), ServeError> {
    match args.first().map(String::as_str) {
        Some("onnx") if args.len() >= 3 => {
            let engine = OnnxEngine::new(&args[1], 1)?;
            Ok((Box::new(engine), 2))
        }
        Some("triton") if args.len() >= 4 => {
            let config = TritonClientConfig {
                url: args[1].clone(),
                model_name: args[2].clone(),
                model_version: String::new(),
            };
            let engine = TritonEngine::new(config, 1)?;
            Ok((Box::new(engine), 3))
        }
        _ => Err(ServeError::invalid_input(
            "usage: classify onnx <model.onnx> <image> [labels.txt] | \
             classify triton <url> <model-name> <image> [labels.txt]",
        )),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (engine, image_arg) = build_engine(&args)?;

    let postprocessor = match args.get(image_arg + 1) {
        Some(labels_path) => ClassificationPostprocessor::from_label_file(labels_path)?,
        None => ClassificationPostprocessor::without_labels(),
    };

    let classifier = ImageClassifier::new(
        engine,
        ImagePreprocessor::with_defaults()?,
        postprocessor,
    );
    if !classifier.is_ready() {
        return Err("inference backend is not ready".into());
    }

    let image_bytes = std::fs::read(&args[image_arg])?;
    let payload = base64::engine::general_purpose::STANDARD.encode(image_bytes);

    for result in classifier.classify(&payload)? {
        println!(
            "class {:>5}  score {:.4}  {}",
            result.class_index, result.score, result.label
        );
    }
    Ok(())
}
