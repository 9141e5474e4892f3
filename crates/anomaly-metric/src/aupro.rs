//! Area under the per-region overlap curve (AUPRO).
//!
//! Each ground-truth region gets its own ROC curve, computed over the
//! region's pixels and all background pixels. These curves have different
//! numbers of points, so each one is truncated at `fpr_limit` and resampled
//! onto a shared integer grid whose size is the number of whole-image ROC
//! points below the limit. The resampled curves are averaged and the area
//! under the average is normalized by its final fpr.

use anomaly_util::{
    area_under_curve, roc_curve_sorted, ConnectedComponents, Connectivity, RocCurve,
    UnionFindLabeler,
};
use burn::{
    config::Config,
    tensor::{backend::Backend, Tensor},
};
use serde::Serialize;

use crate::{
    batch::RegionBatch,
    collector::BatchCollector,
    error::{MetricError, MetricResult},
    figure::{ProFigure, PRO_TITLE},
    interpolate::interp1d,
};

/// Default upper bound of the integrated global false positive rate.
pub const DEFAULT_FPR_LIMIT: f64 = 0.3;

/// Configuration for [`Aupro`].
#[derive(Config, Debug)]
pub struct AuproConfig {
    /// Largest global false positive rate integrated over, in `(0, 1]`.
    #[config(default = 0.3)]
    pub fpr_limit: f64,
    /// Pixel adjacency used to split the ground truth into regions.
    #[config(default = "Connectivity::Eight")]
    pub connectivity: Connectivity,
}

impl AuproConfig {
    /// Checks that `fpr_limit` lies in `(0, 1]`.
    pub fn validate(&self) -> MetricResult<()> {
        if !(self.fpr_limit > 0.0 && self.fpr_limit <= 1.0) {
            return Err(MetricError::InvalidConfiguration {
                reason: format!("fpr_limit must lie in (0, 1], got {}", self.fpr_limit),
            });
        }
        Ok(())
    }

    /// Initializes an AUPRO metric that labels regions on the host.
    pub fn init<B: Backend>(&self) -> MetricResult<Aupro<B>> {
        self.validate()?;
        Ok(Aupro {
            collector: BatchCollector::new(),
            fpr_limit: self.fpr_limit as f32,
            labeler: UnionFindLabeler::new(self.connectivity.clone()),
        })
    }
}

/// Accumulating AUPRO metric.
///
/// Batches are only stored by [`Aupro::update`]; all labeling and curve
/// work happens in [`Aupro::compute`], which leaves the stored batches as
/// they are.
#[derive(Debug, Clone)]
pub struct Aupro<B: Backend, L = UnionFindLabeler> {
    collector: BatchCollector<B>,
    fpr_limit: f32,
    labeler: L,
}

impl<B: Backend> Default for Aupro<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Aupro<B> {
    /// AUPRO with an fpr limit of 0.3 and 8-connected regions.
    pub fn new() -> Self {
        Self {
            collector: BatchCollector::new(),
            fpr_limit: DEFAULT_FPR_LIMIT as f32,
            labeler: UnionFindLabeler::default(),
        }
    }
}

impl<B: Backend, L: ConnectedComponents<B>> Aupro<B, L> {
    /// Replaces the region labeler, keeping collected batches.
    pub fn with_labeler<M: ConnectedComponents<B>>(self, labeler: M) -> Aupro<B, M> {
        Aupro {
            collector: self.collector,
            fpr_limit: self.fpr_limit,
            labeler,
        }
    }

    /// Stores one batch of `[batch, channels, height, width]` scores and
    /// ground-truth masks.
    pub fn update(&mut self, preds: Tensor<B, 4>, target: Tensor<B, 4>) {
        self.collector.push(preds, target);
    }

    pub fn clear(&mut self) {
        self.collector.clear();
    }

    pub fn num_batches(&self) -> usize {
        self.collector.len()
    }

    pub const fn fpr_limit(&self) -> f32 {
        self.fpr_limit
    }

    pub const fn collector(&self) -> &BatchCollector<B> {
        &self.collector
    }

    /// Mutable access for merging collectors filled elsewhere.
    pub fn collector_mut(&mut self) -> &mut BatchCollector<B> {
        &mut self.collector
    }

    /// Averaged per-region overlap curve over all collected batches.
    pub fn compute_curve(&self) -> MetricResult<ProCurve> {
        let (preds, target) = self.collector.concat()?;
        let batch = RegionBatch::from_tensors(preds, target, &self.labeler)?;
        tracing::debug!(
            batches = self.collector.len(),
            regions = batch.num_regions(),
            "computing per-region overlap curve"
        );
        pro_curve(&batch, self.fpr_limit)
    }

    /// AUPRO over all collected batches.
    pub fn compute(&self) -> MetricResult<f32> {
        aupro_score(&self.compute_curve()?)
    }

    /// Curve data for plotting, with the figure title.
    pub fn generate_figure(&self) -> MetricResult<(ProFigure, &'static str)> {
        let curve = self.compute_curve()?;
        let aupro = aupro_score(&curve)?;
        Ok((ProFigure::new(curve, aupro, self.fpr_limit), PRO_TITLE))
    }
}

/// Region-averaged false and true positive rates on the shared grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProCurve {
    pub fpr: Vec<f32>,
    pub tpr: Vec<f32>,
}

impl ProCurve {
    pub fn len(&self) -> usize {
        self.fpr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fpr.is_empty()
    }
}

/// Builds the averaged per-region overlap curve of `batch`.
///
/// A pixel is background when its label is 0 and counts as a global
/// positive when its label is not.
pub fn pro_curve(batch: &RegionBatch, fpr_limit: f32) -> MetricResult<ProCurve> {
    let preds = batch.preds();
    let labels = batch.labels().labels();
    let regions = batch.labels().regions();
    if regions.is_empty() {
        return Err(MetricError::EmptyGroundTruth);
    }

    // One descending sort serves the global curve and every region curve.
    let mut order: Vec<usize> = (0..preds.len()).collect();
    order.sort_by(|&a, &b| preds[b].total_cmp(&preds[a]));

    let global = roc_curve_sorted(order.iter().map(|&i| (preds[i], labels[i] != 0)));
    let grid_size = global.fpr.iter().filter(|&&f| f <= fpr_limit).count();

    let mut fpr = vec![0.0_f32; grid_size];
    let mut tpr = vec![0.0_f32; grid_size];
    for &region in regions {
        let roc = roc_curve_sorted(
            order
                .iter()
                .filter(|&&i| labels[i] == 0 || labels[i] == region)
                .map(|&i| (preds[i], labels[i] == region)),
        );
        let (region_fpr, region_tpr) = resample_region(&roc, fpr_limit, grid_size);
        for (sum, value) in fpr.iter_mut().zip(region_fpr) {
            *sum += value;
        }
        for (sum, value) in tpr.iter_mut().zip(region_tpr) {
            *sum += value;
        }
    }

    let count = regions.len() as f32;
    fpr.iter_mut().for_each(|v| *v /= count);
    tpr.iter_mut().for_each(|v| *v /= count);

    tracing::debug!(regions = regions.len(), grid_size, "per-region curves aggregated");
    Ok(ProCurve { fpr, tpr })
}

/// Area under `curve`, normalized by its final fpr.
///
/// A curve that never leaves zero fpr scores 0.
pub fn aupro_score(curve: &ProCurve) -> MetricResult<f32> {
    let area = area_under_curve(&curve.fpr, &curve.tpr, true)?;
    match curve.fpr.last() {
        Some(&reached) if reached > 0.0 => Ok(area / reached),
        _ => {
            tracing::warn!("averaged per-region curve has no positive fpr; AUPRO is 0");
            Ok(0.0)
        }
    }
}

/// Truncates one region curve at `fpr_limit` and resamples it onto
/// `0..grid_size`.
fn resample_region(roc: &RocCurve, fpr_limit: f32, grid_size: usize) -> (Vec<f32>, Vec<f32>) {
    let fpr = &roc.fpr;
    let tpr = &roc.tpr;

    // A curve still at zero fpr by the limit is cut after its first step.
    let reached = fpr
        .iter()
        .copied()
        .filter(|&f| f <= fpr_limit)
        .fold(0.0_f32, f32::max);
    let ceiling = if reached == 0.0 {
        fpr.iter()
            .copied()
            .filter(|&f| f > fpr_limit)
            .reduce(f32::min)
            .unwrap_or(fpr_limit)
    } else {
        fpr_limit
    };

    let mut selected: Vec<usize> = (0..fpr.len()).filter(|&i| fpr[i] <= ceiling).collect();
    let selected_max = selected
        .iter()
        .map(|&i| fpr[i])
        .fold(f32::NEG_INFINITY, f32::max);

    let mut boundary = None;
    if !is_close(selected_max, fpr_limit) {
        let next = fpr.partition_point(|&f| f < fpr_limit);
        if next > 0 && next < fpr.len() {
            boundary = Some(1.0 - (fpr[next] - fpr_limit) / (fpr[next] - fpr[next - 1]));
            selected.push(next);
        }
    }

    let span = grid_size.saturating_sub(1) as f32;
    let last_index = selected.iter().copied().max().unwrap_or(0) as f32;
    let positions: Vec<f32> = selected
        .iter()
        .map(|&i| {
            if last_index > 0.0 {
                i as f32 / last_index * span
            } else {
                0.0
            }
        })
        .collect();

    let mut grid: Vec<f32> = (0..grid_size).map(|i| i as f32).collect();
    if let (Some(fraction), Some(last)) = (boundary, grid.last_mut()) {
        let n = positions.len();
        *last = positions[n - 2] + (positions[n - 1] - positions[n - 2]) * fraction;
    }

    let selected_fpr: Vec<f32> = selected.iter().map(|&i| fpr[i]).collect();
    let selected_tpr: Vec<f32> = selected.iter().map(|&i| tpr[i]).collect();
    (
        interp1d(&positions, &selected_fpr, &grid),
        interp1d(&positions, &selected_tpr, &grid),
    )
}

fn is_close(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

#[cfg(test)]
mod tests {
    use anomaly_util::LabelMap;
    use approx::assert_relative_eq;
    use rstest::*;

    use super::*;

    fn roc(fpr: Vec<f32>, tpr: Vec<f32>) -> RocCurve {
        RocCurve {
            fpr,
            tpr,
            thresholds: Vec::new(),
        }
    }

    #[test]
    fn curve_on_the_limit_is_resampled_at_its_knots() {
        let curve = roc(vec![0.0, 0.1, 0.2, 0.3, 1.0], vec![0.0, 0.5, 0.7, 0.9, 1.0]);

        let (fpr, tpr) = resample_region(&curve, 0.3, 4);

        for (actual, expected) in fpr.iter().zip([0.0, 0.1, 0.2, 0.3]) {
            assert_relative_eq!(*actual, expected, epsilon = 1e-5);
        }
        for (actual, expected) in tpr.iter().zip([0.0, 0.5, 0.7, 0.9]) {
            assert_relative_eq!(*actual, expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn curve_past_the_limit_ends_exactly_on_it() {
        let curve = roc(vec![0.0, 0.2, 0.5, 1.0], vec![0.0, 0.4, 0.7, 1.0]);

        let (fpr, tpr) = resample_region(&curve, 0.3, 3);

        assert_eq!(fpr.len(), 3);
        assert_relative_eq!(fpr[1], 0.2, epsilon = 1e-5);
        assert_relative_eq!(fpr[2], 0.3, epsilon = 1e-5);
        assert_relative_eq!(tpr[2], 0.5, epsilon = 1e-5);
    }

    #[test]
    fn zero_fpr_curve_jumps_to_first_step() {
        // Region scored above all background: fpr stays 0 until everything
        // is predicted positive.
        let curve = roc(vec![0.0, 0.0, 1.0], vec![0.0, 1.0, 1.0]);

        let (fpr, tpr) = resample_region(&curve, 0.3, 2);

        assert_relative_eq!(fpr[0], 0.0);
        assert_relative_eq!(fpr[1], 1.0, epsilon = 1e-5);
        assert_relative_eq!(tpr[1], 1.0, epsilon = 1e-5);
    }

    #[rstest]
    #[case(0.3, 0.3, true)]
    #[case(0.300001, 0.3, true)]
    #[case(0.2999, 0.3, false)]
    #[case(0.0, 1e-9, true)]
    fn closeness(#[case] a: f32, #[case] b: f32, #[case] expected: bool) {
        assert_eq!(is_close(a, b), expected);
    }

    #[test]
    fn flat_curve_scores_zero() {
        let curve = ProCurve {
            fpr: vec![0.0, 0.0],
            tpr: vec![0.0, 1.0],
        };

        assert_eq!(aupro_score(&curve).unwrap(), 0.0);
    }

    #[test]
    fn score_is_normalized_by_final_fpr() {
        let curve = ProCurve {
            fpr: vec![0.0, 0.1, 0.2],
            tpr: vec![0.0, 1.0, 1.0],
        };

        // Area 0.05 + 0.1 over 0.2.
        assert_relative_eq!(aupro_score(&curve).unwrap(), 0.75, epsilon = 1e-5);
    }

    #[test]
    fn grid_size_follows_global_curve() {
        // 1 x 6 strip: one region of two pixels, four background pixels.
        let preds = vec![0.9, 0.8, 0.4, 0.3, 0.2, 0.1];
        let target = vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let labels = LabelMap::from_raw(vec![1, 1, 0, 0, 0, 0]);
        let batch = RegionBatch::from_parts(preds, target, labels).unwrap();

        let curve = pro_curve(&batch, 0.5).unwrap();

        // Global fpr: 0, 0, 0, 0.25, 0.5, 0.75, 1.0 -> five points <= 0.5.
        assert_eq!(curve.len(), 5);
        assert_relative_eq!(curve.fpr[4], 0.5, epsilon = 1e-5);
        assert_relative_eq!(curve.tpr[4], 1.0, epsilon = 1e-5);
        assert_relative_eq!(aupro_score(&curve).unwrap(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn config_rejects_out_of_range_limit() {
        for limit in [0.0, -0.1, 1.5, f64::NAN] {
            let config = AuproConfig::new().with_fpr_limit(limit);
            assert!(matches!(
                config.validate(),
                Err(MetricError::InvalidConfiguration { .. })
            ));
        }
        assert!(AuproConfig::new().with_fpr_limit(1.0).validate().is_ok());
    }

    #[test]
    fn config_defaults() {
        let config = AuproConfig::new();

        assert_eq!(config.fpr_limit, DEFAULT_FPR_LIMIT);
        assert_eq!(config.connectivity, Connectivity::Eight);
    }
}
