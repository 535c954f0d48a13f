use ndarray::Array2;

use crate::error::{DriftscanError, Result};

/// A point-spread-function kernel: square, odd-sized, non-negative, and
/// normalized to unit sum.
///
/// The elementwise-squared companion kernel used for phi generation is
/// deliberately not renormalized; its sum is carried so masked convolution
/// can rescale correctly.
#[derive(Clone, Debug)]
pub struct Psf {
    kernel: Array2<f32>,
    radius: usize,
    kernel_sum: f32,
    sigma: Option<f32>,
}

impl Psf {
    /// Build a Gaussian PSF with the given sigma in pixels.
    ///
    /// The kernel radius is `ceil(3 * sigma)`, matching the support used for
    /// Gaussian blurs elsewhere in the pipeline.
    pub fn gaussian(sigma: f32) -> Result<Self> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(DriftscanError::InvalidPsf(format!(
                "Gaussian sigma must be positive, got {sigma}"
            )));
        }
        let radius = (sigma * 3.0).ceil() as usize;
        let size = 2 * radius + 1;
        let s2 = 2.0 * sigma * sigma;

        let mut kernel = Array2::<f32>::zeros((size, size));
        let mut sum = 0.0f32;
        for row in 0..size {
            let dy = row as f32 - radius as f32;
            for col in 0..size {
                let dx = col as f32 - radius as f32;
                let v = (-(dx * dx + dy * dy) / s2).exp();
                kernel[[row, col]] = v;
                sum += v;
            }
        }
        kernel.mapv_inplace(|v| v / sum);

        Ok(Self {
            kernel,
            radius,
            kernel_sum: 1.0,
            sigma: Some(sigma),
        })
    }

    /// Build a PSF from an explicit kernel, normalizing it to unit sum.
    pub fn from_kernel(kernel: Array2<f32>) -> Result<Self> {
        let (h, w) = kernel.dim();
        if h != w || h % 2 == 0 {
            return Err(DriftscanError::InvalidPsf(format!(
                "kernel must be square with odd size, got {h}x{w}"
            )));
        }
        if kernel.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(DriftscanError::InvalidPsf(
                "kernel entries must be finite and non-negative".to_string(),
            ));
        }
        let sum: f32 = kernel.iter().sum();
        if sum <= 0.0 {
            return Err(DriftscanError::InvalidPsf(
                "kernel sum must be positive".to_string(),
            ));
        }
        let normalized = kernel.mapv(|v| v / sum);
        Ok(Self {
            kernel: normalized,
            radius: h / 2,
            kernel_sum: 1.0,
            sigma: None,
        })
    }

    /// The elementwise square of this kernel, without renormalization.
    pub fn squared(&self) -> Psf {
        let kernel = self.kernel.mapv(|v| v * v);
        let kernel_sum = kernel.iter().sum();
        Psf {
            kernel,
            radius: self.radius,
            kernel_sum,
            sigma: None,
        }
    }

    pub fn kernel(&self) -> &Array2<f32> {
        &self.kernel
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Kernel side length, `2 * radius + 1`.
    pub fn size(&self) -> usize {
        2 * self.radius + 1
    }

    /// Total kernel weight (1.0 except for squared companions).
    pub fn kernel_sum(&self) -> f32 {
        self.kernel_sum
    }

    /// The Gaussian sigma this kernel was built from, if any.
    pub fn sigma(&self) -> Option<f32> {
        self.sigma
    }
}
