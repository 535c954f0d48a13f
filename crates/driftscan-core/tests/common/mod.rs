#![allow(dead_code)]

use ndarray::Array2;

use driftscan_core::image::RawImage;
use driftscan_core::layered::LayeredImage;
use driftscan_core::psf::Psf;
use driftscan_core::stack::ImageStack;

/// A zero image with a single delta spike.
pub fn spike_image(height: usize, width: usize, row: usize, col: usize, flux: f32) -> RawImage {
    let mut data = Array2::<f32>::zeros((height, width));
    data[[row, col]] = flux;
    RawImage::new(data)
}

pub fn uniform_image(height: usize, width: usize, value: f32) -> RawImage {
    RawImage::new(Array2::from_elem((height, width), value))
}

pub fn zero_mask(height: usize, width: usize) -> Array2<u32> {
    Array2::zeros((height, width))
}

/// A layered exposure with flat variance, an empty mask and a Gaussian PSF.
pub fn layer_with_science(
    science: RawImage,
    variance: f32,
    mjd: f64,
    psf_sigma: f32,
) -> LayeredImage {
    let (h, w) = science.data.dim();
    LayeredImage::new(
        science,
        uniform_image(h, w, variance),
        zero_mask(h, w),
        mjd,
        Psf::gaussian(psf_sigma).unwrap(),
    )
    .unwrap()
}

/// A stack of delta spikes moving linearly: image i holds a spike of `flux`
/// at `(row0 + vy * t_i, col0 + vx * t_i)` with `t_i = i * cadence` days.
pub fn moving_spike_stack(
    num_times: usize,
    height: usize,
    width: usize,
    col0: f32,
    row0: f32,
    vx: f32,
    vy: f32,
    cadence: f64,
    flux: f32,
    psf_sigma: f32,
) -> ImageStack {
    let mjd0 = 60000.0;
    let images = (0..num_times)
        .map(|i| {
            let t = i as f64 * cadence;
            let col = (col0 + vx * t as f32).round() as usize;
            let row = (row0 + vy * t as f32).round() as usize;
            layer_with_science(
                spike_image(height, width, row, col, flux),
                1.0,
                mjd0 + t,
                psf_sigma,
            )
        })
        .collect();
    ImageStack::new(images).unwrap()
}

/// Ten identical exposures of a static unit spike.
pub fn static_spike_stack(height: usize, width: usize, row: usize, col: usize) -> ImageStack {
    moving_spike_stack(10, height, width, col as f32, row as f32, 0.0, 0.0, 0.1, 1.0, 1.0)
}
