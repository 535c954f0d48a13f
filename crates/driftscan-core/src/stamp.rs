//! Postage stamps along trajectories and their coadds.
//!
//! A rejected coadd is replaced by a 1x1 NO_DATA stamp so batch output stays
//! index-aligned with the input trajectory list.

use ndarray::Array2;
use rayon::prelude::*;

use crate::config::{StampParameters, StampType};
use crate::consts::NO_DATA;
use crate::error::{DriftscanError, Result};
use crate::image::{
    create_mean_image, create_median_image, create_summed_image, pixel_has_data, RawImage,
};
use crate::stack::ImageStack;
use crate::trajectory::Trajectory;

/// Cut one science stamp per contributing time along a trajectory.
///
/// `use_index` selects contributing times; an empty slice means all. Its
/// length must otherwise match the stack.
pub fn trajectory_stamps(
    stack: &ImageStack,
    trj: &Trajectory,
    radius: usize,
    use_index: &[bool],
) -> Result<Vec<RawImage>> {
    if !use_index.is_empty() && use_index.len() != stack.len() {
        return Err(DriftscanError::MaskLengthMismatch {
            expected: stack.len(),
            got: use_index.len(),
        });
    }
    let times = stack.zeroed_times();
    let mut stamps = Vec::with_capacity(stack.len());
    for (i, &t) in times.iter().enumerate() {
        if !use_index.is_empty() && !use_index[i] {
            continue;
        }
        let center_col = trj.x as f32 + trj.vx * t;
        let center_row = trj.y as f32 + trj.vy * t;
        stamps.push(stack.get(i)?.science().stamp(center_col, center_row, radius)?);
    }
    Ok(stamps)
}

/// Reduce the per-time stamps of one trajectory to a single coadd, applying
/// the quality filters when enabled.
pub fn coadd_stamp(
    stack: &ImageStack,
    trj: &Trajectory,
    params: &StampParameters,
    use_index: &[bool],
) -> Result<RawImage> {
    let stamps = trajectory_stamps(stack, trj, params.radius, use_index)?;
    let coadd = match params.stamp_type {
        StampType::Sum => create_summed_image(&stamps),
        StampType::Mean => create_mean_image(&stamps),
        StampType::Median => create_median_image(&stamps),
    };
    if params.do_filtering && !stamp_passes_filters(&coadd, params) {
        return Ok(rejected_stamp());
    }
    Ok(coadd)
}

/// CPU batch coadd, trajectory-parallel. `use_index` is either empty or one
/// boolean vector per trajectory.
pub fn coadd_stamps_cpu(
    stack: &ImageStack,
    trajectories: &[Trajectory],
    params: &StampParameters,
    use_index: &[Vec<bool>],
) -> Result<Vec<RawImage>> {
    if !use_index.is_empty() && use_index.len() != trajectories.len() {
        return Err(DriftscanError::MaskLengthMismatch {
            expected: trajectories.len(),
            got: use_index.len(),
        });
    }
    trajectories
        .par_iter()
        .enumerate()
        .map(|(i, trj)| {
            let index_mask: &[bool] = if use_index.is_empty() {
                &[]
            } else {
                &use_index[i]
            };
            coadd_stamp(stack, trj, params, index_mask)
        })
        .collect()
}

/// The 1x1 NO_DATA stamp standing in for a filtered-out trajectory.
pub fn rejected_stamp() -> RawImage {
    RawImage::new(Array2::from_elem((1, 1), NO_DATA))
}

pub fn is_rejected_stamp(stamp: &RawImage) -> bool {
    stamp.width() == 1 && stamp.height() == 1 && !pixel_has_data(stamp.data[[0, 0]])
}

/// Quality gauntlet on a coadd: peak position, central flux concentration,
/// then central moments. Any failing check rejects the trajectory.
pub fn stamp_passes_filters(stamp: &RawImage, params: &StampParameters) -> bool {
    let radius = (stamp.width() / 2) as f32;

    let (peak_row, peak_col) = stamp.peak();
    let peak_val = stamp.data[[peak_row, peak_col]];
    if !pixel_has_data(peak_val) {
        return false;
    }
    if (peak_col as f32 - radius).abs() > params.peak_offset_x
        || (peak_row as f32 - radius).abs() > params.peak_offset_y
    {
        return false;
    }

    let total = stamp.sum();
    if total <= 0.0 || peak_val / total < params.center_thresh {
        return false;
    }

    let m = stamp.central_moments();
    if m.m01.abs() > params.m01_limit
        || m.m10.abs() > params.m10_limit
        || m.m11.abs() > params.m11_limit
        || m.m02 > params.m02_limit
        || m.m20 > params.m20_limit
    {
        return false;
    }

    true
}
