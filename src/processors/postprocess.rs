//! Classification postprocessing: raw score tensors to ranked results.

use std::path::Path;

use crate::core::engine::InferenceResult;
use crate::core::errors::{ServeError, ServeResult};

/// One ranked classification.
///
/// `class_index` is 1-based to match the external label-numbering
/// convention (index 0 is reserved by the label scheme).
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// 1-based class index.
    pub class_index: usize,
    /// Post-softmax probability in [0, 1].
    pub score: f32,
    /// Resolved label, or a `class_<index>` placeholder when no label
    /// table is configured.
    pub label: String,
}

/// Numerically stable softmax over one row of scores.
///
/// Subtracts the row maximum before exponentiating so large logits do not
/// overflow.
pub fn softmax(row: &[f32]) -> Vec<f32> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Converts raw output tensors into ranked class/score pairs.
#[derive(Debug, Clone, Default)]
pub struct ClassificationPostprocessor {
    labels: Option<Vec<String>>,
}

impl ClassificationPostprocessor {
    /// Creates a postprocessor with an optional label table. The table is
    /// zero-based: entry `i` names the class with 1-based index `i + 1`.
    pub fn new(labels: Option<Vec<String>>) -> Self {
        Self { labels }
    }

    /// Creates a postprocessor without label resolution.
    pub fn without_labels() -> Self {
        Self::new(None)
    }

    /// Loads a newline-delimited label table from a file.
    pub fn from_label_file(path: impl AsRef<Path>) -> ServeResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let labels: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self::new(Some(labels)))
    }

    /// Converts one batch's raw output into one classification per row.
    ///
    /// The buffer is interpreted as `rows x cols` where rows is the batch
    /// axis; each row is softmaxed and arg-maxed independently.
    pub fn postprocess(&self, result: &InferenceResult) -> ServeResult<Vec<ClassificationResult>> {
        if !result.status {
            return Err(ServeError::inference(
                "cannot postprocess a failed inference result",
            ));
        }
        if result.shape.is_empty() || result.data.is_empty() {
            return Err(ServeError::invalid_input(
                "inference result carries no output elements",
            ));
        }

        let declared_elements: i64 = result.shape.iter().product();
        if declared_elements as usize != result.data.len() {
            return Err(ServeError::invalid_input(format!(
                "output buffer holds {} elements but shape {:?} declares {}",
                result.data.len(),
                result.shape,
                declared_elements
            )));
        }

        let rows = if result.shape.len() >= 2 {
            result.shape[0] as usize
        } else {
            1
        };
        let cols = result.data.len() / rows;
        if cols == 0 {
            return Err(ServeError::invalid_input(
                "inference result has an empty class axis",
            ));
        }

        let mut classifications = Vec::with_capacity(rows);
        for row in result.data.chunks_exact(cols) {
            let probabilities = softmax(row);
            let mut argmax = 0usize;
            let mut score = probabilities[0];
            for (idx, &p) in probabilities.iter().enumerate().skip(1) {
                if p > score {
                    score = p;
                    argmax = idx;
                }
            }

            let class_index = argmax + 1;
            let label = self
                .labels
                .as_ref()
                .and_then(|labels| labels.get(argmax))
                .cloned()
                .unwrap_or_else(|| format!("class_{class_index}"));

            classifications.push(ClassificationResult {
                class_index,
                score,
                label,
            });
        }
        Ok(classifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dtype::ElementType;

    fn result(shape: Vec<i64>, data: Vec<f32>) -> InferenceResult {
        let byte_size = data.len() * 4;
        InferenceResult {
            data,
            dtype: ElementType::Fp32,
            shape,
            output_name: "output".to_string(),
            byte_size,
            status: true,
        }
    }

    #[test]
    fn test_softmax_uniform_input() {
        let probabilities = softmax(&[1.0, 1.0, 1.0]);
        for p in &probabilities {
            assert!((p - 1.0 / 3.0).abs() < 1e-6);
        }
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let probabilities = softmax(&[1000.0, 999.0, 998.0]);
        assert!(probabilities.iter().all(|p| p.is_finite()));
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_uses_one_based_indexing() {
        let postprocessor = ClassificationPostprocessor::without_labels();
        let classifications = postprocessor
            .postprocess(&result(vec![1, 3], vec![0.1, 0.9, 0.05]))
            .unwrap();

        assert_eq!(classifications.len(), 1);
        assert_eq!(classifications[0].class_index, 2);
        assert_eq!(classifications[0].label, "class_2");
        assert!(classifications[0].score > 0.0 && classifications[0].score <= 1.0);
    }

    #[test]
    fn test_one_classification_per_batch_row() {
        let postprocessor = ClassificationPostprocessor::without_labels();
        let classifications = postprocessor
            .postprocess(&result(
                vec![2, 3],
                vec![0.1, 0.9, 0.05, 2.0, 0.0, 0.0],
            ))
            .unwrap();

        assert_eq!(classifications.len(), 2);
        assert_eq!(classifications[0].class_index, 2);
        assert_eq!(classifications[1].class_index, 1);
    }

    #[test]
    fn test_rank_one_output_is_a_single_row() {
        let postprocessor = ClassificationPostprocessor::without_labels();
        let classifications = postprocessor
            .postprocess(&result(vec![4], vec![0.0, 0.0, 3.0, 0.0]))
            .unwrap();

        assert_eq!(classifications.len(), 1);
        assert_eq!(classifications[0].class_index, 3);
    }

    #[test]
    fn test_labels_resolve_from_table() {
        let postprocessor = ClassificationPostprocessor::new(Some(vec![
            "tench".to_string(),
            "goldfish".to_string(),
            "shark".to_string(),
        ]));
        let classifications = postprocessor
            .postprocess(&result(vec![1, 3], vec![0.0, 5.0, 0.0]))
            .unwrap();

        assert_eq!(classifications[0].label, "goldfish");
        assert_eq!(classifications[0].class_index, 2);
    }

    #[test]
    fn test_shape_and_buffer_disagreement_rejected() {
        let postprocessor = ClassificationPostprocessor::without_labels();
        let err = postprocessor
            .postprocess(&result(vec![2, 3], vec![0.1, 0.2]))
            .unwrap_err();
        assert!(err.to_string().contains("declares"));
    }

    #[test]
    fn test_failed_result_rejected() {
        let postprocessor = ClassificationPostprocessor::without_labels();
        let mut failed = result(vec![1, 2], vec![0.5, 0.5]);
        failed.status = false;
        assert!(postprocessor.postprocess(&failed).is_err());
    }
}
