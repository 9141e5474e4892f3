//! ROC curve construction and trapezoidal area under a curve.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurveError {
    #[error("curve coordinates differ in length: x={x}, y={y}")]
    LengthMismatch { x: usize, y: usize },

    #[error("x-coordinates are neither non-decreasing nor non-increasing; reorder the curve first")]
    NonMonotonic,
}

/// False/true positive rates ordered by decreasing threshold.
///
/// The first point is always `(0, 0)` at a threshold one above the highest
/// score, so every curve starts at the origin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f32>,
    pub tpr: Vec<f32>,
    pub thresholds: Vec<f32>,
}

impl RocCurve {
    pub fn len(&self) -> usize {
        self.fpr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fpr.is_empty()
    }
}

/// Computes the ROC curve of `scores` against binary `labels`.
pub fn roc_curve(scores: &[f32], labels: &[bool]) -> Result<RocCurve, CurveError> {
    if scores.len() != labels.len() {
        return Err(CurveError::LengthMismatch {
            x: scores.len(),
            y: labels.len(),
        });
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    Ok(roc_curve_sorted(
        order.into_iter().map(|i| (scores[i], labels[i])),
    ))
}

/// Computes the ROC curve from `(score, is_positive)` pairs that are
/// already sorted by descending score.
///
/// One point is emitted per distinct score. If there are no negatives the
/// fpr stays at zero; likewise for tpr without positives.
pub fn roc_curve_sorted<I>(pairs: I) -> RocCurve
where
    I: IntoIterator<Item = (f32, bool)>,
{
    let mut tps = vec![0_usize];
    let mut fps = vec![0_usize];
    let mut thresholds = Vec::new();

    let mut pairs = pairs.into_iter().peekable();
    let mut seen = 0_usize;
    let mut positives = 0_usize;
    while let Some((score, positive)) = pairs.next() {
        seen += 1;
        positives += usize::from(positive);

        let last_of_run = pairs.peek().map_or(true, |&(next, _)| next != score);
        if last_of_run {
            tps.push(positives);
            fps.push(seen - positives);
            thresholds.push(score);
        }
    }

    let top = thresholds.first().map_or(f32::INFINITY, |&t| t + 1.0);
    thresholds.insert(0, top);

    RocCurve {
        fpr: normalize(&fps),
        tpr: normalize(&tps),
        thresholds,
    }
}

fn normalize(counts: &[usize]) -> Vec<f32> {
    let total = counts.last().copied().unwrap_or(0);
    if total == 0 {
        return vec![0.0; counts.len()];
    }
    counts.iter().map(|&c| c as f32 / total as f32).collect()
}

/// Area under `(x, y)` by the trapezoidal rule.
///
/// With `reorder` the points are stably sorted by `x` first. Without it `x`
/// must be monotone; a non-increasing `x` yields a positive area as well.
pub fn area_under_curve(x: &[f32], y: &[f32], reorder: bool) -> Result<f32, CurveError> {
    if x.len() != y.len() {
        return Err(CurveError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.len() < 2 {
        return Ok(0.0);
    }

    let (x, y) = if reorder {
        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
        (
            order.iter().map(|&i| x[i]).collect::<Vec<_>>(),
            order.iter().map(|&i| y[i]).collect::<Vec<_>>(),
        )
    } else {
        (x.to_vec(), y.to_vec())
    };

    let direction = if x.windows(2).all(|w| w[1] >= w[0]) {
        1.0
    } else if x.windows(2).all(|w| w[1] <= w[0]) {
        -1.0
    } else {
        return Err(CurveError::NonMonotonic);
    };

    Ok(direction * trapezoid(&x, &y))
}

fn trapezoid(x: &[f32], y: &[f32]) -> f32 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}
