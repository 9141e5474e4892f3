//! Instance average precision (IAPS).
//!
//! Every ground-truth region is represented by one score, taken at a fixed
//! rank of its sorted pixel scores. Using each representative score as a
//! threshold, pixel-level precision is measured over the whole batch while
//! recall counts the fraction of regions whose representative score clears
//! the threshold.

use anomaly_util::{ConnectedComponents, Connectivity, UnionFindLabeler};
use burn::{
    config::Config,
    tensor::{backend::Backend, Tensor},
};
use serde::Serialize;

use crate::{
    batch::RegionBatch,
    collector::BatchCollector,
    error::{MetricError, MetricResult},
};

/// Configuration for [`Iaps`].
#[derive(Config, Debug)]
pub struct IapsConfig {
    /// Rank, as a fraction of the region size, of the pixel score that
    /// represents a region. `0` picks the highest score.
    #[config(default = 0.5)]
    pub ioi_thresh: f64,
    /// Recall level at which precision is reported.
    #[config(default = 0.9)]
    pub recall_thresh: f64,
    /// Pixel adjacency used to split the ground truth into regions.
    #[config(default = "Connectivity::Eight")]
    pub connectivity: Connectivity,
}

impl IapsConfig {
    /// Checks that both thresholds lie in `[0, 1]`.
    pub fn validate(&self) -> MetricResult<()> {
        for (name, value) in [
            ("ioi_thresh", self.ioi_thresh),
            ("recall_thresh", self.recall_thresh),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MetricError::InvalidConfiguration {
                    reason: format!("{name} must lie in [0, 1], got {value}"),
                });
            }
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self) -> MetricResult<Iaps<B>> {
        self.validate()?;
        Ok(Iaps {
            collector: BatchCollector::new(),
            ioi_thresh: self.ioi_thresh,
            recall_thresh: self.recall_thresh,
            labeler: UnionFindLabeler::new(self.connectivity.clone()),
        })
    }
}

/// Average precision and precision at the configured recall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IapsScore {
    pub average_precision: f64,
    pub precision_at_recall: f64,
}

/// Accumulating IAPS metric.
#[derive(Debug, Clone)]
pub struct Iaps<B: Backend, L = UnionFindLabeler> {
    collector: BatchCollector<B>,
    ioi_thresh: f64,
    recall_thresh: f64,
    labeler: L,
}

impl<B: Backend> Default for Iaps<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Iaps<B> {
    /// IAPS at the median region score, reported at 90% recall.
    pub fn new() -> Self {
        Self {
            collector: BatchCollector::new(),
            ioi_thresh: 0.5,
            recall_thresh: 0.9,
            labeler: UnionFindLabeler::default(),
        }
    }
}

impl<B: Backend, L: ConnectedComponents<B>> Iaps<B, L> {
    pub fn with_labeler<M: ConnectedComponents<B>>(self, labeler: M) -> Iaps<B, M> {
        Iaps {
            collector: self.collector,
            ioi_thresh: self.ioi_thresh,
            recall_thresh: self.recall_thresh,
            labeler,
        }
    }

    pub fn update(&mut self, preds: Tensor<B, 4>, target: Tensor<B, 4>) {
        self.collector.push(preds, target);
    }

    pub fn clear(&mut self) {
        self.collector.clear();
    }

    pub fn num_batches(&self) -> usize {
        self.collector.len()
    }

    pub const fn collector(&self) -> &BatchCollector<B> {
        &self.collector
    }

    pub fn collector_mut(&mut self) -> &mut BatchCollector<B> {
        &mut self.collector
    }

    /// Corrected precision-recall curve over all collected batches.
    pub fn compute_curve(&self) -> MetricResult<PrecisionRecall> {
        let batch = self.region_batch()?;
        let scores = instance_scores(&batch, self.ioi_thresh);
        Ok(precision_recall(&batch, &scores))
    }

    pub fn compute(&self) -> MetricResult<IapsScore> {
        let batch = self.region_batch()?;
        iaps_score(&batch, self.ioi_thresh, self.recall_thresh)
    }

    fn region_batch(&self) -> MetricResult<RegionBatch> {
        let (preds, target) = self.collector.concat()?;
        let batch = RegionBatch::from_tensors(preds, target, &self.labeler)?;
        tracing::debug!(
            batches = self.collector.len(),
            regions = batch.num_regions(),
            "computing instance average precision"
        );
        Ok(batch)
    }
}

/// Precision at each representative score, from the loosest threshold to
/// the tightest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrecisionRecall {
    /// Representative region scores, ascending.
    pub thresholds: Vec<f32>,
    /// `1 - i / N`, descending.
    pub recall: Vec<f64>,
    /// Precision made non-decreasing along `thresholds`.
    pub precision: Vec<f64>,
}

impl PrecisionRecall {
    pub fn len(&self) -> usize {
        self.precision.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precision.is_empty()
    }

    /// Mean of the corrected precisions.
    pub fn average_precision(&self) -> f64 {
        if self.precision.is_empty() {
            return 0.0;
        }
        self.precision.iter().sum::<f64>() / self.precision.len() as f64
    }

    /// Precision at the first point whose recall reaches `recall_thresh`,
    /// scanning from lowest recall. Falls back to the highest recall point.
    pub fn precision_at_recall(&self, recall_thresh: f64) -> f64 {
        let n = self.len();
        if n == 0 {
            return 0.0;
        }
        let ascending: Vec<f64> = self.recall.iter().rev().copied().collect();
        let k = ascending
            .partition_point(|&r| r < recall_thresh)
            .min(n - 1);
        self.precision[n - 1 - k]
    }
}

/// Representative score of every region, in the order of
/// [`anomaly_util::LabelMap::regions`].
///
/// A region of `n` pixels is represented by its `floor(ioi_thresh * n)`-th
/// highest score, clamped to the lowest one.
pub fn instance_scores(batch: &RegionBatch, ioi_thresh: f64) -> Vec<f32> {
    let label_map = batch.labels();
    let slots = label_map.region_slots();

    let mut members: Vec<Vec<f32>> = vec![Vec::new(); slots.len()];
    for (label, &score) in label_map.labels().iter().zip(batch.preds()) {
        if let Some(&slot) = slots.get(label) {
            members[slot].push(score);
        }
    }

    members
        .into_iter()
        .filter(|scores| !scores.is_empty())
        .map(|mut scores| {
            scores.sort_by(|a, b| b.total_cmp(a));
            let rank = ((ioi_thresh * scores.len() as f64) as usize).min(scores.len() - 1);
            scores[rank]
        })
        .collect()
}

/// Precision-recall curve with one point per representative score.
///
/// Precision at score `s` is `#(pred * target >= s) / #(pred >= s)` over the
/// whole batch, or 0 when no pixel reaches `s`. A single forward sweep then
/// carries every precision onto the tighter thresholds that follow it.
pub fn precision_recall(batch: &RegionBatch, instance_scores: &[f32]) -> PrecisionRecall {
    let mut thresholds = instance_scores.to_vec();
    thresholds.sort_by(f32::total_cmp);
    let n = thresholds.len();

    let mut predicted = batch.preds().to_vec();
    predicted.sort_by(|a, b| b.total_cmp(a));
    let mut hits: Vec<f32> = batch
        .preds()
        .iter()
        .zip(batch.target())
        .map(|(p, t)| p * t)
        .collect();
    hits.sort_by(|a, b| b.total_cmp(a));

    let recall = (0..n).map(|i| 1.0 - i as f64 / n as f64).collect();
    let mut precision: Vec<f64> = thresholds
        .iter()
        .map(|&score| {
            let positives = predicted.partition_point(|&v| v >= score);
            let true_positives = hits.partition_point(|&v| v >= score);
            if positives == 0 {
                0.0
            } else {
                true_positives as f64 / positives as f64
            }
        })
        .collect();

    for i in 1..n {
        precision[i] = precision[i].max(precision[i - 1]);
    }

    PrecisionRecall {
        thresholds,
        recall,
        precision,
    }
}

/// Average precision and precision at `recall_thresh` for `batch`.
pub fn iaps_score(batch: &RegionBatch, ioi_thresh: f64, recall_thresh: f64) -> MetricResult<IapsScore> {
    let scores = instance_scores(batch, ioi_thresh);
    if scores.is_empty() {
        return Err(MetricError::EmptyGroundTruth);
    }

    let curve = precision_recall(batch, &scores);
    Ok(IapsScore {
        average_precision: curve.average_precision(),
        precision_at_recall: curve.precision_at_recall(recall_thresh),
    })
}

#[cfg(test)]
mod tests {
    use anomaly_util::LabelMap;
    use approx::assert_relative_eq;
    use rstest::*;

    use super::*;

    /// 1 x 6 strip with a two-pixel and a one-pixel region.
    fn strip() -> RegionBatch {
        RegionBatch::from_parts(
            vec![0.9, 0.2, 0.8, 0.7, 0.1, 0.6],
            vec![1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            LabelMap::from_raw(vec![1, 1, 0, 0, 2, 0]),
        )
        .unwrap()
    }

    #[rstest]
    #[case(0.0, 0.4)]
    #[case(0.5, 0.2)]
    #[case(0.25, 0.3)]
    #[case(0.99, 0.1)]
    #[case(1.0, 0.1)]
    fn representative_rank(#[case] ioi: f64, #[case] expected: f32) {
        let batch = RegionBatch::from_parts(
            vec![0.1, 0.4, 0.3, 0.2],
            vec![1.0; 4],
            LabelMap::from_raw(vec![1; 4]),
        )
        .unwrap();

        assert_eq!(instance_scores(&batch, ioi), vec![expected]);
    }

    #[test]
    fn forward_sweep_lifts_later_precision() {
        let batch = strip();
        let scores = instance_scores(&batch, 0.5);
        assert_eq!(scores, vec![0.2, 0.1]);

        let curve = precision_recall(&batch, &scores);

        assert_eq!(curve.thresholds, vec![0.1, 0.2]);
        assert_eq!(curve.recall, vec![1.0, 0.5]);
        // Raw precisions are 3/6 and 2/5.
        assert_relative_eq!(curve.precision[0], 0.5);
        assert_relative_eq!(curve.precision[1], 0.5);
    }

    #[test]
    fn strip_score() {
        let score = iaps_score(&strip(), 0.5, 0.9).unwrap();

        assert_relative_eq!(score.average_precision, 0.5);
        assert_relative_eq!(score.precision_at_recall, 0.5);
    }

    #[rstest]
    #[case(0.0, 0.2)]
    #[case(0.3, 0.8)]
    #[case(0.5, 0.7)]
    #[case(0.6, 0.7)]
    #[case(1.0, 0.6)]
    fn precision_lookup_by_recall(#[case] recall_thresh: f64, #[case] expected: f64) {
        let curve = PrecisionRecall {
            thresholds: vec![0.1, 0.2, 0.3, 0.4, 0.5],
            recall: vec![1.0, 0.8, 0.6, 0.4, 0.2],
            precision: vec![0.6, 0.6, 0.7, 0.8, 0.2],
        };

        assert_relative_eq!(curve.precision_at_recall(recall_thresh), expected);
    }

    #[test]
    fn no_pixel_above_threshold_gives_zero_precision() {
        let batch = strip();

        let curve = precision_recall(&batch, &[2.0]);

        assert_eq!(curve.precision, vec![0.0]);
    }

    #[rstest]
    #[case(-0.1, 0.9)]
    #[case(0.5, 1.1)]
    #[case(f64::NAN, 0.9)]
    fn config_rejects_out_of_range_thresholds(#[case] ioi: f64, #[case] recall: f64) {
        let config = IapsConfig::new()
            .with_ioi_thresh(ioi)
            .with_recall_thresh(recall);

        assert!(matches!(
            config.validate(),
            Err(MetricError::InvalidConfiguration { .. })
        ));
    }
}
