use ndarray::Array2;

use crate::consts::NO_DATA;
use crate::convolve::convolve;
use crate::error::{DriftscanError, Result};
use crate::image::{pixel_has_data, RawImage};
use crate::psf::Psf;

/// One calibrated exposure: science, variance and mask planes of identical
/// shape, an observation time, and the exposure's PSF.
///
/// Mask pixels are a bitfield of flag reasons (saturation, cosmic ray, edge,
/// and so on); the engine only ever tests them against a caller-supplied
/// flag mask.
#[derive(Clone, Debug)]
pub struct LayeredImage {
    science: RawImage,
    variance: RawImage,
    mask: Array2<u32>,
    mjd: f64,
    psf: Psf,
}

impl LayeredImage {
    pub fn new(
        science: RawImage,
        variance: RawImage,
        mask: Array2<u32>,
        mjd: f64,
        psf: Psf,
    ) -> Result<Self> {
        let dim = science.data.dim();
        if dim.0 == 0 || dim.1 == 0 {
            return Err(DriftscanError::InvalidDimensions {
                width: dim.1,
                height: dim.0,
            });
        }
        for other in [variance.data.dim(), mask.dim()] {
            if other != dim {
                return Err(DriftscanError::LayerShapeMismatch {
                    expected_width: dim.1,
                    expected_height: dim.0,
                    width: other.1,
                    height: other.0,
                });
            }
        }
        Ok(Self {
            science,
            variance,
            mask,
            mjd,
            psf,
        })
    }

    pub fn width(&self) -> usize {
        self.science.width()
    }

    pub fn height(&self) -> usize {
        self.science.height()
    }

    pub fn mjd(&self) -> f64 {
        self.mjd
    }

    pub fn psf(&self) -> &Psf {
        &self.psf
    }

    pub fn science(&self) -> &RawImage {
        &self.science
    }

    pub fn science_mut(&mut self) -> &mut RawImage {
        &mut self.science
    }

    pub fn variance(&self) -> &RawImage {
        &self.variance
    }

    pub fn variance_mut(&mut self) -> &mut RawImage {
        &mut self.variance
    }

    pub fn mask(&self) -> &Array2<u32> {
        &self.mask
    }

    /// Assign NO_DATA to science and variance wherever the mask plane shares
    /// a bit with `flags`.
    pub fn apply_mask(&mut self, flags: u32) {
        for ((row, col), &bits) in self.mask.indexed_iter() {
            if bits & flags != 0 {
                self.science.data[[row, col]] = NO_DATA;
                self.variance.data[[row, col]] = NO_DATA;
            }
        }
    }

    /// Assign NO_DATA to science and variance wherever the given binary
    /// global mask is set.
    pub fn apply_global_mask(&mut self, global: &RawImage) {
        for ((row, col), &v) in global.data.indexed_iter() {
            if pixel_has_data(v) && v != 0.0 {
                self.science.data[[row, col]] = NO_DATA;
                self.variance.data[[row, col]] = NO_DATA;
            }
        }
    }

    /// The psi sufficient-statistic image: conv(science / variance, psf).
    ///
    /// Pixels with masked or non-positive variance degrade to NO_DATA before
    /// the convolution.
    pub fn generate_psi(&self) -> RawImage {
        let ratio = self.divide_by_variance(&self.science);
        convolve(&ratio, &self.psf)
    }

    /// The phi sufficient-statistic image: conv(1 / variance, psf^2).
    pub fn generate_phi(&self) -> RawImage {
        let ones = RawImage::new(Array2::from_elem(self.science.data.dim(), 1.0f32));
        let ratio = self.divide_by_variance(&ones);
        convolve(&ratio, &self.psf.squared())
    }

    fn divide_by_variance(&self, numerator: &RawImage) -> RawImage {
        let mut out = Array2::<f32>::zeros(numerator.data.dim());
        for ((row, col), &num) in numerator.data.indexed_iter() {
            let var = self.variance.data[[row, col]];
            out[[row, col]] = if pixel_has_data(num) && pixel_has_data(var) && var > 0.0 {
                num / var
            } else {
                NO_DATA
            };
        }
        RawImage::new(out)
    }
}
