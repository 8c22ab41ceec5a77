//! Sample-level numeric steps of the pipeline: log scaling, percentile
//! bounds and rescaling to 8-bit.

use ndarray::{ArrayD, ArrayViewD};

use crate::error::TransformError;

/// Replace every sample `x` with `ln(1 + x)`.
///
/// If the image holds negative samples it is first shifted so its minimum
/// is 0. Non-finite samples are left as they are.
pub fn log_scale(image: &mut ArrayD<f64>) {
    let min = image
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::INFINITY, f64::min);
    let shift = if min.is_finite() && min < 0.0 { -min } else { 0.0 };
    image.mapv_inplace(|v| (v + shift).ln_1p());
}

/// The `q`-th percentile of ascending `sorted` samples, interpolating
/// linearly between the two closest ranks.
///
/// `sorted` must be non-empty and `q` in `[0, 100]`.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    let last = sorted.len() - 1;
    let rank = q / 100.0 * last as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    if below == above {
        return sorted[below];
    }
    let frac = rank - below as f64;
    sorted[below] + (sorted[above] - sorted[below]) * frac
}

/// Sample values at the `low`-th and `high`-th percentiles of `image`.
///
/// Non-finite samples do not take part.
pub fn percentile_bounds(
    image: ArrayViewD<'_, f64>,
    low: f64,
    high: f64,
) -> Result<(f64, f64), TransformError> {
    let valid = |q: f64| q.is_finite() && (0.0..=100.0).contains(&q);
    if !valid(low) || !valid(high) || low >= high {
        return Err(TransformError::InvalidPercentiles { low, high });
    }

    let mut samples: Vec<f64> = image.iter().copied().filter(|v| v.is_finite()).collect();
    if samples.is_empty() {
        return Err(TransformError::EmptyImage);
    }
    samples.sort_by(f64::total_cmp);

    Ok((percentile(&samples, low), percentile(&samples, high)))
}

/// Map `lo` to 0 and `hi` to 255, clipping everything outside.
///
/// A flat image (`hi <= lo`) and non-finite samples map to 0. Output is in
/// the logical (row-major) order of `image`.
pub fn rescale_to_u8(image: ArrayViewD<'_, f64>, lo: f64, hi: f64) -> Vec<u8> {
    let span = hi - lo;
    image
        .iter()
        .map(|&v| {
            if !v.is_finite() || span <= 0.0 {
                return 0;
            }
            ((v - lo) / span * 255.0).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}
