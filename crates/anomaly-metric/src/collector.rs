//! Append-only accumulation of evaluation batches.
//!
//! Adding a batch does no work beyond storing the tensor handles; shapes and
//! mask values are only checked when the batches are concatenated for a
//! compute call.

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{MetricError, MetricResult};

/// Ordered list of `(predictions, targets)` batches.
///
/// Each tensor is `[batch, channels, height, width]`. Collectors filled by
/// different producers combine with [`BatchCollector::append`].
#[derive(Debug, Clone)]
pub struct BatchCollector<B: Backend> {
    preds: Vec<Tensor<B, 4>>,
    target: Vec<Tensor<B, 4>>,
}

impl<B: Backend> Default for BatchCollector<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> BatchCollector<B> {
    pub const fn new() -> Self {
        Self {
            preds: Vec::new(),
            target: Vec::new(),
        }
    }

    /// Stores one batch.
    pub fn push(&mut self, preds: Tensor<B, 4>, target: Tensor<B, 4>) {
        self.preds.push(preds);
        self.target.push(target);
    }

    /// Moves every batch of `other` to the end of `self`.
    pub fn append(&mut self, mut other: Self) {
        self.preds.append(&mut other.preds);
        self.target.append(&mut other.target);
    }

    /// Drops all stored batches.
    pub fn clear(&mut self) {
        self.preds.clear();
        self.target.clear();
    }

    pub fn len(&self) -> usize {
        self.preds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    /// Concatenates all batches along the batch dimension.
    ///
    /// The stored batches are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `Err(MetricError::NoBatches)` when nothing was collected and
    /// `Err(MetricError::ShapeMismatch)` when a batch's predictions and
    /// targets differ in shape or batches disagree in their per-sample shape.
    pub fn concat(&self) -> MetricResult<(Tensor<B, 4>, Tensor<B, 4>)> {
        let Some(first) = self.target.first() else {
            return Err(MetricError::NoBatches);
        };
        let [_, channels, height, width] = first.dims();

        for (preds, target) in self.preds.iter().zip(&self.target) {
            let preds_dims = preds.dims();
            let target_dims = target.dims();
            if preds_dims != target_dims {
                return Err(MetricError::ShapeMismatch {
                    preds: preds_dims.to_vec(),
                    target: target_dims.to_vec(),
                });
            }
            if target_dims[1..] != [channels, height, width] {
                return Err(MetricError::ShapeMismatch {
                    preds: target_dims.to_vec(),
                    target: first.dims().to_vec(),
                });
            }
        }

        Ok((
            Tensor::cat(self.preds.clone(), 0),
            Tensor::cat(self.target.clone(), 0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    fn filled(batch: usize, value: f32) -> Tensor<TestBackend, 4> {
        Tensor::full([batch, 1, 2, 3], value, &Default::default())
    }

    #[test]
    fn concat_preserves_batch_order() {
        let mut collector = BatchCollector::<TestBackend>::new();
        collector.push(filled(1, 0.1), filled(1, 0.0));
        collector.push(filled(2, 0.2), filled(2, 1.0));

        let (preds, target) = collector.concat().unwrap();

        assert_eq!(preds.dims(), [3, 1, 2, 3]);
        assert_eq!(target.dims(), [3, 1, 2, 3]);
        let values = preds.into_data().to_vec::<f32>().unwrap();
        assert!(values[..6].iter().all(|&v| (v - 0.1).abs() < 1e-6));
        assert!(values[6..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
        assert_eq!(collector.len(), 2, "concat must not consume batches");
    }

    #[test]
    fn empty_collector_has_nothing_to_concat() {
        let collector = BatchCollector::<TestBackend>::new();

        assert!(matches!(collector.concat(), Err(MetricError::NoBatches)));
    }

    #[test]
    fn mismatched_pair_is_rejected() {
        let device = Default::default();
        let mut collector = BatchCollector::<TestBackend>::new();
        collector.push(
            Tensor::zeros([1, 1, 2, 3], &device),
            Tensor::zeros([1, 1, 3, 2], &device),
        );

        match collector.concat() {
            Err(MetricError::ShapeMismatch { preds, target }) => {
                assert_eq!(preds, vec![1, 1, 2, 3]);
                assert_eq!(target, vec![1, 1, 3, 2]);
            }
            other => panic!("Expected ShapeMismatch error, got {other:?}"),
        }
    }

    #[test]
    fn batches_must_share_sample_shape() {
        let device = Default::default();
        let mut collector = BatchCollector::<TestBackend>::new();
        collector.push(filled(1, 0.0), filled(1, 0.0));
        collector.push(
            Tensor::zeros([1, 1, 4, 4], &device),
            Tensor::zeros([1, 1, 4, 4], &device),
        );

        assert!(matches!(
            collector.concat(),
            Err(MetricError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn append_and_clear() {
        let mut first = BatchCollector::<TestBackend>::new();
        first.push(filled(1, 0.1), filled(1, 0.0));
        let mut second = BatchCollector::<TestBackend>::new();
        second.push(filled(1, 0.2), filled(1, 0.0));
        second.push(filled(1, 0.3), filled(1, 0.0));

        first.append(second);
        assert_eq!(first.len(), 3);

        first.clear();
        assert!(first.is_empty());
    }
}
