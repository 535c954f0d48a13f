//! Sigma-G outlier rejection on per-observation likelihood contributions.
//!
//! Uses the inter-percentile range in place of a standard deviation: with
//! the default coefficient 0.7413, `coeff * IQR` estimates one Gaussian
//! sigma, so the clip acts as a robust sigma cut.

/// Linear-interpolated percentile of an ascending-sorted, non-empty slice.
///
/// `pct` in [0, 100]; the sample position is `pct/100 * (n - 1)`.
pub fn percentile(sorted: &[f32], pct: f32) -> f32 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Clip observations whose likelihood contribution lies more than
/// `(p_high - p_low) / coeff` from the median, clearing their `valid` flag.
///
/// The percentiles are taken over the currently-valid entries only, on a
/// sorted copy (`scratch`), so summation order can never perturb the result.
/// An empty valid set, or a non-positive coefficient, disables the clip.
pub fn sigmag_clip(
    lh: &[f32],
    valid: &mut [bool],
    low_pct: f32,
    high_pct: f32,
    coeff: f32,
    scratch: &mut Vec<f32>,
) {
    if coeff <= 0.0 {
        return;
    }
    scratch.clear();
    for (i, &ok) in valid.iter().enumerate() {
        if ok {
            scratch.push(lh[i]);
        }
    }
    if scratch.is_empty() {
        return;
    }
    scratch.sort_unstable_by(|a, b| a.total_cmp(b));

    let p_low = percentile(scratch, low_pct);
    let p_high = percentile(scratch, high_pct);
    let median = percentile(scratch, 50.0);
    let threshold = (p_high - p_low) / coeff;

    for (i, ok) in valid.iter_mut().enumerate() {
        if *ok && (lh[i] - median).abs() > threshold {
            *ok = false;
        }
    }
}
