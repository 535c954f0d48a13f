//! Masked convolution of science images with PSF kernels.
//!
//! Masked (NO_DATA) inputs are skipped and the kernel weight is renormalized
//! over the pixels that were actually touched; a masked center pixel stays
//! masked. The same contract is served by a direct sliding-window path and,
//! for wide kernels, an FFT path.

use ndarray::Array2;
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::FftPlanner;

use crate::consts::{CONV_WEIGHT_FLOOR, FFT_CONV_MIN_RADIUS, NO_DATA, PARALLEL_PIXEL_THRESHOLD};
use crate::image::{pixel_has_data, RawImage};
use crate::psf::Psf;

/// Convolve an image with a PSF kernel under NO_DATA renormalization.
///
/// For each output pixel the kernel-weighted sum over unmasked neighbors is
/// rescaled by `kernel_sum / touched_weight`; if the touched weight falls
/// below [`CONV_WEIGHT_FLOOR`] the output is NO_DATA. Border pixels treat
/// out-of-image samples as masked.
pub fn convolve(image: &RawImage, psf: &Psf) -> RawImage {
    if psf.radius() >= FFT_CONV_MIN_RADIUS {
        convolve_fft(image, psf)
    } else {
        convolve_direct(image, psf)
    }
}

/// Direct sliding-window convolution; row-parallel for large images.
pub fn convolve_direct(image: &RawImage, psf: &Psf) -> RawImage {
    let (h, w) = image.data.dim();
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        convolve_direct_parallel(image, psf, h, w)
    } else {
        convolve_direct_sequential(image, psf, h, w)
    }
}

fn convolve_pixel(image: &RawImage, psf: &Psf, row: usize, col: usize) -> f32 {
    if !pixel_has_data(image.data[[row, col]]) {
        return NO_DATA;
    }
    let radius = psf.radius() as i64;
    let kernel = psf.kernel();

    let mut acc = 0.0f32;
    let mut touched = 0.0f32;
    for ky in 0..psf.size() {
        let r = row as i64 + ky as i64 - radius;
        for kx in 0..psf.size() {
            let c = col as i64 + kx as i64 - radius;
            let v = image.pixel(r, c);
            if pixel_has_data(v) {
                let weight = kernel[[ky, kx]];
                acc += v * weight;
                touched += weight;
            }
        }
    }

    if touched < CONV_WEIGHT_FLOOR {
        NO_DATA
    } else {
        acc * psf.kernel_sum() / touched
    }
}

fn convolve_direct_parallel(image: &RawImage, psf: &Psf, h: usize, w: usize) -> RawImage {
    let rows: Vec<Vec<f32>> = (0..h)
        .into_par_iter()
        .map(|row| (0..w).map(|col| convolve_pixel(image, psf, row, col)).collect())
        .collect();

    let mut result = Array2::<f32>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            result[[row, col]] = val;
        }
    }
    RawImage::new(result)
}

fn convolve_direct_sequential(image: &RawImage, psf: &Psf, h: usize, w: usize) -> RawImage {
    let mut result = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            result[[row, col]] = convolve_pixel(image, psf, row, col);
        }
    }
    RawImage::new(result)
}

/// FFT convolution: transforms the zero-filled values and the validity mask,
/// multiplies both with the kernel spectrum, and renormalizes per pixel.
pub fn convolve_fft(image: &RawImage, psf: &Psf) -> RawImage {
    let (h, w) = image.data.dim();
    let ksize = psf.size();
    let ph = (h + ksize - 1).next_power_of_two();
    let pw = (w + ksize - 1).next_power_of_two();

    let mut values = Array2::<Complex<f64>>::zeros((ph, pw));
    let mut validity = Array2::<Complex<f64>>::zeros((ph, pw));
    for row in 0..h {
        for col in 0..w {
            let v = image.data[[row, col]];
            if pixel_has_data(v) {
                values[[row, col]] = Complex::new(v as f64, 0.0);
                validity[[row, col]] = Complex::new(1.0, 0.0);
            }
        }
    }

    // Kernel laid out for correlation: g(dy, dx) = k(r - dy, r - dx),
    // wrapped so the kernel center sits at (0, 0).
    let radius = psf.radius() as i64;
    let kernel = psf.kernel();
    let mut kernel_fft = Array2::<Complex<f64>>::zeros((ph, pw));
    for dy in -radius..=radius {
        let gy = dy.rem_euclid(ph as i64) as usize;
        for dx in -radius..=radius {
            let gx = dx.rem_euclid(pw as i64) as usize;
            let kv = kernel[[(radius - dy) as usize, (radius - dx) as usize]];
            kernel_fft[[gy, gx]] = Complex::new(kv as f64, 0.0);
        }
    }

    fft2d(&mut values, false);
    fft2d(&mut validity, false);
    fft2d(&mut kernel_fft, false);

    for ((row, col), &k) in kernel_fft.indexed_iter() {
        values[[row, col]] *= k;
        validity[[row, col]] *= k;
    }

    fft2d(&mut values, true);
    fft2d(&mut validity, true);

    let scale = 1.0 / (ph * pw) as f64;
    let kernel_sum = psf.kernel_sum() as f64;
    let mut result = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            if !pixel_has_data(image.data[[row, col]]) {
                result[[row, col]] = NO_DATA;
                continue;
            }
            let acc = values[[row, col]].re * scale;
            let touched = validity[[row, col]].re * scale;
            result[[row, col]] = if touched < CONV_WEIGHT_FLOOR as f64 {
                NO_DATA
            } else {
                (acc * kernel_sum / touched) as f32
            };
        }
    }
    RawImage::new(result)
}

/// In-place 2D FFT over rows then columns; parallel above the pixel threshold.
fn fft2d(data: &mut Array2<Complex<f64>>, inverse: bool) {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let (fft_row, fft_col) = if inverse {
        (planner.plan_fft_inverse(w), planner.plan_fft_inverse(h))
    } else {
        (planner.plan_fft_forward(w), planner.plan_fft_forward(h))
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        let processed_rows: Vec<Vec<Complex<f64>>> = (0..h)
            .into_par_iter()
            .map(|row| {
                let mut row_data: Vec<Complex<f64>> = (0..w).map(|c| data[[row, c]]).collect();
                fft_row.process(&mut row_data);
                row_data
            })
            .collect();
        for (row, row_data) in processed_rows.into_iter().enumerate() {
            for (col, val) in row_data.into_iter().enumerate() {
                data[[row, col]] = val;
            }
        }

        let processed_cols: Vec<Vec<Complex<f64>>> = (0..w)
            .into_par_iter()
            .map(|col| {
                let mut col_data: Vec<Complex<f64>> = (0..h).map(|r| data[[r, col]]).collect();
                fft_col.process(&mut col_data);
                col_data
            })
            .collect();
        for (col, col_data) in processed_cols.into_iter().enumerate() {
            for (row, val) in col_data.into_iter().enumerate() {
                data[[row, col]] = val;
            }
        }
    } else {
        for row in 0..h {
            let mut row_data: Vec<Complex<f64>> = (0..w).map(|c| data[[row, c]]).collect();
            fft_row.process(&mut row_data);
            for (col, val) in row_data.into_iter().enumerate() {
                data[[row, col]] = val;
            }
        }
        for col in 0..w {
            let mut col_data: Vec<Complex<f64>> = (0..h).map(|r| data[[r, col]]).collect();
            fft_col.process(&mut col_data);
            for (row, val) in col_data.into_iter().enumerate() {
                data[[row, col]] = val;
            }
        }
    }
}
