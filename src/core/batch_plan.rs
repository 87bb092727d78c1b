//! Batch planning for the dispatch loop embedded in each engine.

use crate::core::errors::{ServeError, ServeResult};

/// Partitions `sample_count` samples into batches of exactly `batch_size`.
///
/// Batches are returned as index lists into the caller's sample sequence,
/// in dispatch order. When the sample count is not a multiple of the batch
/// size, the final batch wraps around and reuses samples from the start of
/// the sequence until it is full. This repeat-fill policy means those
/// samples are inferred twice and produce duplicate results; it is the
/// documented contract, not zero-padding.
pub fn plan_batches(sample_count: usize, batch_size: usize) -> ServeResult<Vec<Vec<usize>>> {
    if batch_size == 0 {
        return Err(ServeError::invalid_input("batch size must be at least 1"));
    }
    if sample_count == 0 {
        return Err(ServeError::invalid_input(
            "at least one sample is required per inference call",
        ));
    }

    let mut batches = Vec::with_capacity(sample_count.div_ceil(batch_size));
    let mut data_idx = 0usize;
    let mut last_batch = false;
    while !last_batch {
        let mut batch = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            batch.push(data_idx);
            data_idx = (data_idx + 1) % sample_count;
            if data_idx == 0 {
                last_batch = true;
            }
        }
        batches.push(batch);
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_multiple_produces_ordered_batches() {
        let batches = plan_batches(4, 2).unwrap();
        assert_eq!(batches, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_single_sample_single_batch() {
        let batches = plan_batches(1, 1).unwrap();
        assert_eq!(batches, vec![vec![0]]);
    }

    // The ragged final batch wraps around to the start of the sequence
    // instead of being zero-padded or rejected. Samples 0 (below) are
    // inferred twice and the caller sees duplicate results for them; any
    // change away from this behavior needs product sign-off.
    #[test]
    fn test_ragged_final_batch_wraps_to_front() {
        let batches = plan_batches(5, 2).unwrap();
        assert_eq!(batches, vec![vec![0, 1], vec![2, 3], vec![4, 0]]);
    }

    #[test]
    fn test_single_sample_fills_whole_batch() {
        let batches = plan_batches(1, 4).unwrap();
        assert_eq!(batches, vec![vec![0, 0, 0, 0]]);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(plan_batches(0, 2).is_err());
        assert!(plan_batches(2, 0).is_err());
    }
}
