//! Vector math over aligned axis arrays.
//!
//! Detection operates directly on raw samples, so these helpers do no smoothing.
//! Peak and trough searches break ties on the first occurrence.

/// Euclidean norm of a single 3-axis reading.
///
/// Scaled through `hypot`, so large finite axes do not overflow the squares.
pub fn magnitude(x: f64, y: f64, z: f64) -> f64 {
    x.hypot(y).hypot(z)
}

/// Per-sample magnitude over three index-aligned axis arrays.
///
/// The output is as long as the shortest input.
pub fn magnitudes(x: &[f64], y: &[f64], z: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(y)
        .zip(z)
        .map(|((&x, &y), &z)| magnitude(x, y, z))
        .collect()
}

/// Index of the largest value, first occurrence on ties. `None` for an empty slice.
///
/// NaN values never win a comparison, so they are skipped unless every value is NaN,
/// in which case index 0 is returned.
pub fn argmax(values: &[f64]) -> Option<usize> {
    extreme_index(values, |candidate, best| candidate > best)
}

/// Index of the smallest value, first occurrence on ties. `None` for an empty slice.
pub fn argmin(values: &[f64]) -> Option<usize> {
    extreme_index(values, |candidate, best| candidate < best)
}

fn extreme_index(values: &[f64], better: impl Fn(f64, f64) -> bool) -> Option<usize> {
    let (first, rest) = values.split_first()?;
    let mut best_idx = 0;
    let mut best = *first;
    for (offset, &value) in rest.iter().enumerate() {
        if !value.is_nan() && (best.is_nan() || better(value, best)) {
            best = value;
            best_idx = offset + 1;
        }
    }
    Some(best_idx)
}

/// Converts an angular rate from radians to degrees per second.
pub fn rad_to_deg(rad_s: f64) -> f64 {
    rad_s.to_degrees()
}
