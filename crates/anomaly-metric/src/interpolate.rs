//! Piecewise-linear resampling of curves with monotone knots.

use num_traits::Float;

/// Evaluates the piecewise-linear function through `(old_x, old_y)` at every
/// point of `new_x`.
///
/// `old_x` must be non-decreasing. Queries outside the knot range are
/// extrapolated from the first or last segment. Coincident knots are handled
/// by adding machine epsilon to every segment width, so values at knots are
/// exact only up to that epsilon.
///
/// A single knot yields its `y` for every query; no knots yield no values.
/// Extra entries of the longer of `old_x` and `old_y` are ignored.
pub fn interp1d<F: Float>(old_x: &[F], old_y: &[F], new_x: &[F]) -> Vec<F> {
    let knots = old_x.len().min(old_y.len());
    let (old_x, old_y) = (&old_x[..knots], &old_y[..knots]);

    match knots {
        0 => return Vec::new(),
        1 => return vec![old_y[0]; new_x.len()],
        _ => {}
    }

    let eps = F::epsilon();
    let slopes: Vec<F> = old_x
        .windows(2)
        .zip(old_y.windows(2))
        .map(|(x, y)| (y[1] - y[0]) / (eps + (x[1] - x[0])))
        .collect();

    let last_segment = knots - 2;
    new_x
        .iter()
        .map(|&query| {
            let segment = old_x
                .partition_point(|&knot| knot < query)
                .saturating_sub(1)
                .min(last_segment);
            old_y[segment] + slopes[segment] * (query - old_x[segment])
        })
        .collect()
}
