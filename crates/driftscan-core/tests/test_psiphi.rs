mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use common::uniform_image;
use driftscan_core::consts::NO_DATA;
use driftscan_core::image::{pixel_has_data, RawImage};
use driftscan_core::psiphi::PsiPhiArray;

fn gradient_image(height: usize, width: usize, lo: f32, hi: f32) -> RawImage {
    let n = (height * width - 1).max(1) as f32;
    let mut data = Array2::<f32>::zeros((height, width));
    for ((row, col), v) in data.indexed_iter_mut() {
        *v = lo + (hi - lo) * (row * width + col) as f32 / n;
    }
    RawImage::new(data)
}

fn build_array(psi_num_bytes: usize, phi_num_bytes: usize) -> PsiPhiArray {
    let psi = vec![
        gradient_image(8, 8, -5.0, 5.0),
        gradient_image(8, 8, 0.0, 100.0),
    ];
    let phi = vec![
        gradient_image(8, 8, 0.1, 1.0),
        gradient_image(8, 8, 0.2, 2.0),
    ];
    PsiPhiArray::new(&psi, &phi, vec![0.0, 0.5], psi_num_bytes, phi_num_bytes).unwrap()
}

#[test]
fn test_float_layout_round_trips_exactly() {
    let array = build_array(4, 4);
    let expected = gradient_image(8, 8, -5.0, 5.0);
    for ((row, col), v) in expected.data.indexed_iter() {
        assert_abs_diff_eq!(array.read_psi(0, row as i64, col as i64), *v);
    }
    let expected = gradient_image(8, 8, 0.2, 2.0);
    for ((row, col), v) in expected.data.indexed_iter() {
        assert_abs_diff_eq!(array.read_phi(1, row as i64, col as i64), *v);
    }
}

#[test]
fn test_quantization_error_is_bounded_by_scale() {
    for num_bytes in [1usize, 2] {
        let array = build_array(num_bytes, num_bytes);
        let codes = (1u32 << (8 * num_bytes)) - 2;
        let psi_scale = 10.0 / codes as f32;
        let phi_scale = 1.8 / codes as f32;

        let expected = gradient_image(8, 8, -5.0, 5.0);
        for ((row, col), v) in expected.data.indexed_iter() {
            let decoded = array.read_psi(0, row as i64, col as i64);
            assert!(
                (decoded - v).abs() <= psi_scale,
                "psi {num_bytes}-byte decode off by {}",
                (decoded - v).abs()
            );
        }
        let expected = gradient_image(8, 8, 0.2, 2.0);
        for ((row, col), v) in expected.data.indexed_iter() {
            let decoded = array.read_phi(1, row as i64, col as i64);
            assert!((decoded - v).abs() <= phi_scale);
        }
    }
}

#[test]
fn test_no_data_survives_quantization() {
    for num_bytes in [1usize, 2, 4] {
        let mut psi_img = gradient_image(8, 8, 0.0, 10.0);
        psi_img.data[[3, 4]] = NO_DATA;
        let phi_img = uniform_image(8, 8, 1.0);
        let array =
            PsiPhiArray::new(&[psi_img], &[phi_img], vec![0.0], num_bytes, num_bytes).unwrap();
        assert!(!pixel_has_data(array.read_psi(0, 3, 4)));
        assert!(pixel_has_data(array.read_psi(0, 3, 3)));
    }
}

#[test]
fn test_all_masked_image_encodes() {
    let psi_img = uniform_image(4, 4, NO_DATA);
    let phi_img = uniform_image(4, 4, NO_DATA);
    let array = PsiPhiArray::new(&[psi_img], &[phi_img], vec![0.0], 1, 1).unwrap();
    for row in 0..4 {
        for col in 0..4 {
            assert!(!pixel_has_data(array.read_psi(0, row, col)));
            assert!(!pixel_has_data(array.read_phi(0, row, col)));
        }
    }
}

#[test]
fn test_out_of_bounds_reads_are_no_data() {
    let array = build_array(4, 4);
    assert!(!pixel_has_data(array.read_psi(0, -1, 0)));
    assert!(!pixel_has_data(array.read_psi(0, 0, 8)));
    assert!(!pixel_has_data(array.read_phi(1, 8, 0)));
}

#[test]
fn test_invalid_encoding_width() {
    let psi = vec![uniform_image(4, 4, 1.0)];
    let phi = vec![uniform_image(4, 4, 1.0)];
    assert!(PsiPhiArray::new(&psi, &phi, vec![0.0], 3, 4).is_err());
    assert!(PsiPhiArray::new(&psi, &phi, vec![0.0], 4, 0).is_err());
}

#[test]
fn test_constant_image_quantizes_to_itself() {
    // Degenerate range: the minimum-width floor keeps the scale positive and
    // decode lands on the constant.
    let psi = vec![uniform_image(4, 4, 42.0)];
    let phi = vec![uniform_image(4, 4, 1.0)];
    let array = PsiPhiArray::new(&psi, &phi, vec![0.0], 2, 2).unwrap();
    assert_abs_diff_eq!(array.read_psi(0, 2, 2), 42.0, epsilon = 1e-4);
}

#[test]
fn test_time_vector_length_mismatch() {
    let psi = vec![uniform_image(4, 4, 1.0)];
    let phi = vec![uniform_image(4, 4, 1.0)];
    assert!(PsiPhiArray::new(&psi, &phi, vec![0.0, 1.0], 4, 4).is_err());
}
