mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use common::{layer_with_science, spike_image, uniform_image};
use driftscan_core::config::{StampParameters, StampType};
use driftscan_core::consts::NO_DATA;
use driftscan_core::image::{pixel_has_data, RawImage};
use driftscan_core::psf::Psf;
use driftscan_core::stack::ImageStack;
use driftscan_core::stamp::{
    coadd_stamp, coadd_stamps_cpu, is_rejected_stamp, stamp_passes_filters, trajectory_stamps,
};
use driftscan_core::trajectory::Trajectory;

fn static_trajectory(x: i16, y: i16) -> Trajectory {
    Trajectory {
        x,
        y,
        ..Default::default()
    }
}

/// Five exposures whose center pixel value is `i + 1`, with the center
/// masked in the first two.
fn graded_center_stack() -> ImageStack {
    let images = (0..5)
        .map(|i| {
            let mut science = spike_image(32, 32, 10, 10, (i + 1) as f32);
            if i < 2 {
                science.data[[10, 10]] = NO_DATA;
            }
            layer_with_science(science, 1.0, 60000.0 + i as f64 * 0.1, 1.0)
        })
        .collect();
    ImageStack::new(images).unwrap()
}

fn stamp_params(stamp_type: StampType, radius: usize) -> StampParameters {
    StampParameters {
        radius,
        stamp_type,
        do_filtering: false,
        ..Default::default()
    }
}

#[test]
fn test_trajectory_stamps_count_and_centering() {
    let stack = graded_center_stack();
    let trj = static_trajectory(10, 10);
    let stamps = trajectory_stamps(&stack, &trj, 3, &[]).unwrap();
    assert_eq!(stamps.len(), 5);
    assert_eq!(stamps[2].width(), 7);
    assert_abs_diff_eq!(stamps[2].data[[3, 3]], 3.0);
    assert!(!pixel_has_data(stamps[0].data[[3, 3]]));
}

#[test]
fn test_trajectory_stamps_use_index_selection() {
    let stack = graded_center_stack();
    let trj = static_trajectory(10, 10);
    let use_index = vec![false, false, true, false, true];
    let stamps = trajectory_stamps(&stack, &trj, 2, &use_index).unwrap();
    assert_eq!(stamps.len(), 2);
    assert_abs_diff_eq!(stamps[0].data[[2, 2]], 3.0);
    assert_abs_diff_eq!(stamps[1].data[[2, 2]], 5.0);
}

#[test]
fn test_use_index_length_mismatch() {
    let stack = graded_center_stack();
    let trj = static_trajectory(10, 10);
    assert!(trajectory_stamps(&stack, &trj, 2, &[true, false]).is_err());
}

#[test]
fn test_median_coadd_with_masked_center() {
    let stack = graded_center_stack();
    let trj = static_trajectory(10, 10);
    let coadd = coadd_stamp(&stack, &trj, &stamp_params(StampType::Median, 3), &[]).unwrap();
    // Center masked in images 1 and 2: median over the surviving 3, 4, 5.
    assert_abs_diff_eq!(coadd.data[[3, 3]], 4.0);
}

#[test]
fn test_sum_coadd_treats_no_data_as_zero() {
    let stack = graded_center_stack();
    let trj = static_trajectory(10, 10);
    let coadd = coadd_stamp(&stack, &trj, &stamp_params(StampType::Sum, 3), &[]).unwrap();
    assert_abs_diff_eq!(coadd.data[[3, 3]], 12.0);
    // Off-center pixels are zero in every exposure.
    assert_abs_diff_eq!(coadd.data[[0, 0]], 0.0);
}

#[test]
fn test_mean_coadd_skips_masked() {
    let stack = graded_center_stack();
    let trj = static_trajectory(10, 10);
    let coadd = coadd_stamp(&stack, &trj, &stamp_params(StampType::Mean, 3), &[]).unwrap();
    assert_abs_diff_eq!(coadd.data[[3, 3]], 4.0);
}

#[test]
fn test_moving_trajectory_recenters_stamps() {
    // Spike drifts one pixel per exposure; stamps along the matching
    // trajectory hold it centered.
    let images = (0..5)
        .map(|i| {
            layer_with_science(
                spike_image(32, 32, 16, 10 + i, 2.0),
                1.0,
                60000.0 + i as f64 * 1.0,
                1.0,
            )
        })
        .collect();
    let stack = ImageStack::new(images).unwrap();
    let trj = Trajectory {
        x: 10,
        y: 16,
        vx: 1.0,
        vy: 0.0,
        ..Default::default()
    };
    let coadd = coadd_stamp(&stack, &trj, &stamp_params(StampType::Sum, 2), &[]).unwrap();
    assert_abs_diff_eq!(coadd.data[[2, 2]], 10.0);
}

fn centered_gaussian_stamp(radius: usize) -> RawImage {
    let psf = Psf::gaussian(1.0).unwrap();
    let edge = 2 * radius + 1;
    let mut data = Array2::<f32>::zeros((edge, edge));
    let kr = psf.radius();
    for ky in 0..psf.size() {
        for kx in 0..psf.size() {
            let row = radius + ky - kr;
            let col = radius + kx - kr;
            data[[row, col]] = psf.kernel()[[ky, kx]];
        }
    }
    RawImage::new(data)
}

#[test]
fn test_filters_accept_centered_source() {
    let stamp = centered_gaussian_stamp(5);
    let params = StampParameters {
        radius: 5,
        do_filtering: true,
        peak_offset_x: 2.0,
        peak_offset_y: 2.0,
        center_thresh: 0.03,
        m01_limit: 0.2,
        m10_limit: 0.2,
        m11_limit: 0.3,
        m02_limit: 0.5,
        m20_limit: 0.5,
        ..Default::default()
    };
    assert!(stamp_passes_filters(&stamp, &params));
}

#[test]
fn test_filters_reject_offset_peak() {
    let mut stamp = centered_gaussian_stamp(5);
    // A hot pixel far off center out-shines the source.
    stamp.data[[0, 10]] = 1.0;
    let params = StampParameters {
        radius: 5,
        do_filtering: true,
        peak_offset_x: 2.0,
        peak_offset_y: 2.0,
        center_thresh: 0.0,
        m01_limit: f32::MAX,
        m10_limit: f32::MAX,
        m11_limit: f32::MAX,
        m02_limit: f32::MAX,
        m20_limit: f32::MAX,
        ..Default::default()
    };
    assert!(!stamp_passes_filters(&stamp, &params));
}

#[test]
fn test_filters_reject_diffuse_flux() {
    // Uniform stamp: brightest pixel holds a tiny fraction of the flux.
    let stamp = uniform_image(11, 11, 1.0);
    let params = StampParameters {
        radius: 5,
        do_filtering: true,
        peak_offset_x: 100.0,
        peak_offset_y: 100.0,
        center_thresh: 0.03,
        m01_limit: f32::MAX,
        m10_limit: f32::MAX,
        m11_limit: f32::MAX,
        m02_limit: f32::MAX,
        m20_limit: f32::MAX,
        ..Default::default()
    };
    assert!(!stamp_passes_filters(&stamp, &params));
}

#[test]
fn test_filters_reject_high_moments() {
    let stamp = uniform_image(11, 11, 1.0);
    let params = StampParameters {
        radius: 5,
        do_filtering: true,
        peak_offset_x: 100.0,
        peak_offset_y: 100.0,
        center_thresh: 0.0,
        m01_limit: f32::MAX,
        m10_limit: f32::MAX,
        m11_limit: f32::MAX,
        // A flat stamp has large second moments.
        m02_limit: 1.0,
        m20_limit: 1.0,
        ..Default::default()
    };
    assert!(!stamp_passes_filters(&stamp, &params));
}

#[test]
fn test_rejected_trajectory_yields_1x1_no_data() {
    let stack = graded_center_stack();
    let trj = static_trajectory(10, 10);
    let params = StampParameters {
        radius: 3,
        stamp_type: StampType::Mean,
        do_filtering: true,
        // Impossible concentration requirement.
        center_thresh: 2.0,
        ..Default::default()
    };
    let coadd = coadd_stamp(&stack, &trj, &params, &[]).unwrap();
    assert!(is_rejected_stamp(&coadd));
}

#[test]
fn test_batch_coadd_alignment_and_validation() {
    let stack = graded_center_stack();
    let trajectories = vec![static_trajectory(10, 10), static_trajectory(20, 20)];

    let stamps =
        coadd_stamps_cpu(&stack, &trajectories, &stamp_params(StampType::Sum, 2), &[]).unwrap();
    assert_eq!(stamps.len(), 2);
    assert_abs_diff_eq!(stamps[0].data[[2, 2]], 12.0);
    assert_abs_diff_eq!(stamps[1].data[[2, 2]], 0.0);

    // One mask vector for two trajectories.
    let bad = vec![vec![true; 5]];
    assert!(
        coadd_stamps_cpu(&stack, &trajectories, &stamp_params(StampType::Sum, 2), &bad).is_err()
    );
}

#[test]
fn test_stamp_radius_validated_in_coadd() {
    let stack = graded_center_stack();
    let trj = static_trajectory(10, 10);
    let params = stamp_params(StampType::Sum, 65);
    assert!(coadd_stamp(&stack, &trj, &params, &[]).is_err());
}
