//! Validated, labeled host view of an evaluation batch.

use anomaly_util::{ConnectedComponents, LabelMap};
use burn::tensor::{backend::Backend, ElementConversion, Tensor};

use crate::error::{MetricError, MetricResult};

/// Flattened predictions and targets together with the region map of the
/// targets.
///
/// All three arrays share the raster order of the `[batch, channels,
/// height, width]` tensors they were read from. A `RegionBatch` always holds
/// at least one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionBatch {
    preds: Vec<f32>,
    target: Vec<f32>,
    labels: LabelMap,
}

impl RegionBatch {
    /// Validates the tensors, labels the target and reads everything back
    /// to host memory.
    ///
    /// Every `[height, width]` plane is labeled independently.
    ///
    /// # Errors
    ///
    /// - `ShapeMismatch` when `preds` and `target` differ in shape.
    /// - `InvalidMaskRange` when `target` leaves `[0, 1]`; checked before
    ///   labeling.
    /// - `EmptyGroundTruth` when the target holds no region.
    /// - `Label` or `TensorData` when the labeler or the readback fails.
    pub fn from_tensors<B, L>(
        preds: Tensor<B, 4>,
        target: Tensor<B, 4>,
        labeler: &L,
    ) -> MetricResult<Self>
    where
        B: Backend,
        L: ConnectedComponents<B> + ?Sized,
    {
        let dims = target.dims();
        if preds.dims() != dims {
            return Err(MetricError::ShapeMismatch {
                preds: preds.dims().to_vec(),
                target: dims.to_vec(),
            });
        }
        if dims.iter().product::<usize>() == 0 {
            return Err(MetricError::EmptyGroundTruth);
        }

        let min = target.clone().min().into_scalar().elem::<f32>();
        let max = target.clone().max().into_scalar().elem::<f32>();
        check_mask_range(min, max)?;

        let [batch, channels, height, width] = dims;
        let labels = labeler.label(target.clone().reshape([batch * channels, height, width]))?;

        Self::from_parts(to_host(preds)?, to_host(target)?, labels)
    }

    /// Builds a batch from host arrays and an existing region map.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the three arrays differ in length,
    /// `InvalidMaskRange` for targets outside `[0, 1]` and `EmptyGroundTruth`
    /// when `labels` has no region.
    pub fn from_parts(preds: Vec<f32>, target: Vec<f32>, labels: LabelMap) -> MetricResult<Self> {
        if preds.len() != target.len() || labels.len() != target.len() {
            return Err(MetricError::ShapeMismatch {
                preds: vec![preds.len()],
                target: vec![target.len(), labels.len()],
            });
        }

        let (min, max) = target
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if !target.is_empty() {
            check_mask_range(min, max)?;
        }

        if labels.num_regions() == 0 {
            return Err(MetricError::EmptyGroundTruth);
        }

        Ok(Self {
            preds,
            target,
            labels,
        })
    }

    pub fn preds(&self) -> &[f32] {
        &self.preds
    }

    pub fn target(&self) -> &[f32] {
        &self.target
    }

    pub const fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn num_regions(&self) -> usize {
        self.labels.num_regions()
    }

    pub fn len(&self) -> usize {
        self.preds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }
}

fn check_mask_range(min: f32, max: f32) -> MetricResult<()> {
    if min < 0.0 || max > 1.0 || min.is_nan() || max.is_nan() {
        return Err(MetricError::InvalidMaskRange { min, max });
    }
    Ok(())
}

fn to_host<B: Backend>(tensor: Tensor<B, 4>) -> MetricResult<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| MetricError::TensorData {
            reason: format!("{e:?}"),
        })
}

#[cfg(test)]
mod tests {
    use anomaly_util::{LabelError, LabelerFn, UnionFindLabeler};
    use burn::{backend::NdArray, tensor::TensorData};
    use rstest::*;

    use super::*;

    type TestBackend = NdArray;

    fn tensor(values: Vec<f32>, shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn planes_are_labeled_independently() {
        // Two 2x2 samples whose foreground would touch if stacked.
        let target = tensor(vec![0., 1., 0., 1., 0., 1., 0., 1.], [2, 1, 2, 2]);
        let preds = tensor(vec![0.5; 8], [2, 1, 2, 2]);

        let batch = RegionBatch::from_tensors(preds, target, &UnionFindLabeler::default()).unwrap();

        assert_eq!(batch.num_regions(), 2);
        assert_eq!(batch.labels().labels(), &[0, 1, 0, 1, 0, 2, 0, 2]);
        assert_eq!(batch.len(), 8);
    }

    #[rstest]
    #[case(vec![0., 2., 1., 0.], 0.0, 2.0)]
    #[case(vec![-0.5, 1., 0., 0.], -0.5, 1.0)]
    fn mask_range_is_checked_before_labeling(
        #[case] values: Vec<f32>,
        #[case] min: f32,
        #[case] max: f32,
    ) {
        let labeler = LabelerFn(|_: Tensor<TestBackend, 3>| -> LabelMap {
            panic!("labeler must not run on an invalid mask")
        });

        let err = RegionBatch::from_tensors(
            tensor(vec![0.0; 4], [1, 1, 2, 2]),
            tensor(values, [1, 1, 2, 2]),
            &labeler,
        )
        .unwrap_err();

        match err {
            MetricError::InvalidMaskRange { min: lo, max: hi } => {
                assert_eq!(lo, min);
                assert_eq!(hi, max);
            }
            other => panic!("Expected InvalidMaskRange error, got {other:?}"),
        }
    }

    #[test]
    fn all_background_target_has_no_regions() {
        let err = RegionBatch::from_tensors(
            tensor(vec![0.3; 4], [1, 1, 2, 2]),
            tensor(vec![0.0; 4], [1, 1, 2, 2]),
            &UnionFindLabeler::default(),
        )
        .unwrap_err();

        assert!(matches!(err, MetricError::EmptyGroundTruth));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let err = RegionBatch::from_tensors(
            tensor(vec![0.0; 6], [1, 1, 2, 3]),
            tensor(vec![0.0; 6], [1, 1, 3, 2]),
            &UnionFindLabeler::default(),
        )
        .unwrap_err();

        assert!(matches!(err, MetricError::ShapeMismatch { .. }));
    }

    #[test]
    fn label_errors_propagate() {
        struct Failing;
        impl ConnectedComponents<TestBackend> for Failing {
            fn label(&self, _: Tensor<TestBackend, 3>) -> Result<LabelMap, LabelError> {
                Err(LabelError::TensorConversion {
                    reason: "unavailable".to_string(),
                })
            }
        }

        let err = RegionBatch::from_tensors(
            tensor(vec![0.0; 4], [1, 1, 2, 2]),
            tensor(vec![0., 1., 0., 0.], [1, 1, 2, 2]),
            &Failing,
        )
        .unwrap_err();

        assert!(matches!(err, MetricError::Label(_)));
    }

    #[test]
    fn from_parts_checks_lengths() {
        let err = RegionBatch::from_parts(
            vec![0.0; 3],
            vec![0.0, 1.0, 0.0, 0.0],
            LabelMap::from_raw(vec![0, 1, 0, 0]),
        )
        .unwrap_err();

        assert!(matches!(err, MetricError::ShapeMismatch { .. }));
    }
}
