use approx::{assert_abs_diff_eq, assert_relative_eq};
use ndarray::Array2;

use driftscan_core::psf::Psf;

#[test]
fn test_gaussian_kernel_normalized() {
    let psf = Psf::gaussian(1.0).unwrap();
    assert_eq!(psf.radius(), 3);
    assert_eq!(psf.size(), 7);
    let sum: f32 = psf.kernel().iter().sum();
    assert_relative_eq!(sum, 1.0, max_relative = 1e-6);
    assert_abs_diff_eq!(psf.kernel_sum(), 1.0);
}

#[test]
fn test_gaussian_center_is_maximum() {
    let psf = Psf::gaussian(1.5).unwrap();
    let r = psf.radius();
    let center = psf.kernel()[[r, r]];
    for v in psf.kernel().iter() {
        assert!(*v <= center);
    }
}

#[test]
fn test_gaussian_rejects_bad_sigma() {
    assert!(Psf::gaussian(0.0).is_err());
    assert!(Psf::gaussian(-1.0).is_err());
    assert!(Psf::gaussian(f32::NAN).is_err());
}

#[test]
fn test_from_kernel_normalizes() {
    let kernel = Array2::from_elem((3, 3), 2.0f32);
    let psf = Psf::from_kernel(kernel).unwrap();
    assert_eq!(psf.radius(), 1);
    assert_relative_eq!(psf.kernel()[[0, 0]], 1.0 / 9.0, max_relative = 1e-6);
    assert!(psf.sigma().is_none());
}

#[test]
fn test_from_kernel_validation() {
    // Even-sized kernel.
    assert!(Psf::from_kernel(Array2::from_elem((2, 2), 1.0f32)).is_err());
    // Non-square kernel.
    assert!(Psf::from_kernel(Array2::from_elem((3, 5), 1.0f32)).is_err());
    // Negative entry.
    let mut negative = Array2::from_elem((3, 3), 1.0f32);
    negative[[0, 0]] = -0.5;
    assert!(Psf::from_kernel(negative).is_err());
    // Zero sum.
    assert!(Psf::from_kernel(Array2::zeros((3, 3))).is_err());
}

#[test]
fn test_squared_kernel_not_renormalized() {
    let psf = Psf::gaussian(1.0).unwrap();
    let squared = psf.squared();
    assert_eq!(squared.radius(), psf.radius());

    let expected_sum: f32 = psf.kernel().iter().map(|v| v * v).sum();
    assert_relative_eq!(squared.kernel_sum(), expected_sum, max_relative = 1e-6);
    assert!(squared.kernel_sum() < 1.0);

    let r = psf.radius();
    let kc = psf.kernel()[[r, r]];
    assert_relative_eq!(squared.kernel()[[r, r]], kc * kc, max_relative = 1e-6);
}
