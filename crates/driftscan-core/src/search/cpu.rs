//! CPU reference implementation of the trajectory grid search.
//!
//! Pixel-parallel via Rayon with an index-ordered collect, so repeated runs
//! on identical inputs are bit-identical.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::config::{SearchParameters, SearchRect};
use crate::image::{nearest_pixel, pixel_has_data};
use crate::psiphi::PsiPhiArray;
use crate::trajectory::{compare_trajectories, Trajectory};

use super::sigma_g::sigmag_clip;

/// Per-pixel scratch buffers, reused across all velocities of one pixel.
struct CandidateScratch {
    psi: Vec<f32>,
    phi: Vec<f32>,
    lh: Vec<f32>,
    valid: Vec<bool>,
    sorted: Vec<f32>,
}

impl CandidateScratch {
    fn new(num_times: usize) -> Self {
        Self {
            psi: vec![0.0; num_times],
            phi: vec![0.0; num_times],
            lh: vec![0.0; num_times],
            valid: vec![false; num_times],
            sorted: Vec::with_capacity(num_times),
        }
    }
}

/// Run the grid search over every start pixel in the rectangle, returning
/// the concatenated per-pixel top-K lists in globally sorted order.
pub fn search_cpu(
    psi_phi: &PsiPhiArray,
    grid: &[(f32, f32)],
    params: &SearchParameters,
) -> Vec<Trajectory> {
    let rect = resolve_rect(params, psi_phi.width(), psi_phi.height());
    if rect.x_start_min >= rect.x_start_max || rect.y_start_min >= rect.y_start_max {
        return Vec::new();
    }

    let pixels: Vec<(i32, i32)> = (rect.y_start_min..rect.y_start_max)
        .flat_map(|y| (rect.x_start_min..rect.x_start_max).map(move |x| (x, y)))
        .collect();

    let mut results: Vec<Trajectory> = pixels
        .par_iter()
        .map(|&(x, y)| {
            let mut scratch = CandidateScratch::new(psi_phi.num_times());
            let mut top: Vec<Trajectory> = Vec::with_capacity(params.results_per_pixel + 1);
            for &(vx, vy) in grid {
                if let Some(trj) = evaluate_candidate(psi_phi, x, y, vx, vy, params, &mut scratch)
                {
                    insert_top_k(&mut top, params.results_per_pixel, trj);
                }
            }
            top
        })
        .flatten()
        .collect();

    results.sort_by(compare_trajectories);
    results
}

/// The start-pixel rectangle, defaulting to the full image.
fn resolve_rect(params: &SearchParameters, width: usize, height: usize) -> SearchRect {
    params.rect.unwrap_or(SearchRect {
        x_start_min: 0,
        x_start_max: width as i32,
        y_start_min: 0,
        y_start_max: height as i32,
    })
}

/// Re-score one trajectory against the host psi/phi array.
///
/// Used by the GPU backend when `gpu_filter` is off: the kernel returns
/// unfiltered candidates and each one is re-evaluated here with the sigma-G
/// filter and the reporting thresholds applied.
#[cfg_attr(not(feature = "gpu"), allow(dead_code))]
pub(crate) fn reevaluate_candidate(
    psi_phi: &PsiPhiArray,
    x: i32,
    y: i32,
    vx: f32,
    vy: f32,
    params: &SearchParameters,
) -> Option<Trajectory> {
    let mut scratch = CandidateScratch::new(psi_phi.num_times());
    evaluate_candidate(psi_phi, x, y, vx, vy, params, &mut scratch)
}

/// Evaluate one `(start_pixel, velocity)` candidate.
fn evaluate_candidate(
    psi_phi: &PsiPhiArray,
    x: i32,
    y: i32,
    vx: f32,
    vy: f32,
    params: &SearchParameters,
    scratch: &mut CandidateScratch,
) -> Option<Trajectory> {
    let times = psi_phi.zeroed_times();

    for (i, &t) in times.iter().enumerate() {
        let col = nearest_pixel(x as f32 + vx * t);
        let row = nearest_pixel(y as f32 + vy * t);
        let psi = psi_phi.read_psi(i, row, col);
        let phi = psi_phi.read_phi(i, row, col);
        let ok = pixel_has_data(psi) && pixel_has_data(phi) && phi > 0.0;
        scratch.valid[i] = ok;
        scratch.psi[i] = psi;
        scratch.phi[i] = phi;
        scratch.lh[i] = if ok { psi / phi.sqrt() } else { 0.0 };
    }

    if params.do_sigmag_filter {
        sigmag_clip(
            &scratch.lh,
            &mut scratch.valid,
            params.sgl_l,
            params.sgl_h,
            params.sigmag_coeff,
            &mut scratch.sorted,
        );
    }

    let mut psi_sum = 0.0f32;
    let mut phi_sum = 0.0f32;
    let mut obs_count = 0i16;
    for (i, &ok) in scratch.valid.iter().enumerate() {
        if ok {
            psi_sum += scratch.psi[i];
            phi_sum += scratch.phi[i];
            obs_count += 1;
        }
    }

    let (likelihood, flux) = if phi_sum > 0.0 {
        (
            sanitize(psi_sum / phi_sum.sqrt()),
            sanitize(psi_sum / phi_sum),
        )
    } else {
        (0.0, 0.0)
    };

    if (obs_count as usize) < params.min_observations || likelihood < params.min_lh {
        return None;
    }

    Some(Trajectory {
        x: x as i16,
        y: y as i16,
        vx,
        vy,
        flux,
        likelihood,
        obs_count,
    })
}

/// Reported statistics are never NaN or infinite.
#[inline]
fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Ordered insertion into the per-pixel top-K list.
fn insert_top_k(top: &mut Vec<Trajectory>, k: usize, trj: Trajectory) {
    if k == 0 {
        return;
    }
    let pos = top.partition_point(|t| compare_trajectories(t, &trj) != Ordering::Greater);
    if pos >= k && top.len() >= k {
        return;
    }
    top.insert(pos, trj);
    top.truncate(k);
}
