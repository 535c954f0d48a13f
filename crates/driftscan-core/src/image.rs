use ndarray::Array2;

use crate::consts::{MAX_STAMP_EDGE, NO_DATA};
use crate::error::{DriftscanError, Result};

/// True if the pixel carries data (is not the NO_DATA sentinel).
#[inline]
pub fn pixel_has_data(value: f32) -> bool {
    !value.is_nan()
}

/// Nearest-pixel rounding used everywhere a sub-pixel position becomes an
/// index.
///
/// `floor(x + 0.5)` rather than `round()`: ties resolve the same way on the
/// CPU and in WGSL, where `round()` ties to even.
#[inline]
pub fn nearest_pixel(value: f32) -> i64 {
    (value + 0.5).floor() as i64
}

/// A single science-grade image plane.
///
/// Pixel data is row-major f32, shape = (height, width). Masked pixels hold
/// [`NO_DATA`] and are skipped by every reduction.
#[derive(Clone, Debug)]
pub struct RawImage {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
}

/// Central image moments of a stamp, normalized by the stamp radius.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageMoments {
    pub m00: f32,
    pub m01: f32,
    pub m10: f32,
    pub m11: f32,
    pub m02: f32,
    pub m20: f32,
}

impl RawImage {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: Array2::zeros((height, width)),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Pixel at (row, col), or NO_DATA when the position is out of bounds.
    #[inline]
    pub fn pixel(&self, row: i64, col: i64) -> f32 {
        if row >= 0 && row < self.height() as i64 && col >= 0 && col < self.width() as i64 {
            self.data[[row as usize, col as usize]]
        } else {
            NO_DATA
        }
    }

    #[inline]
    pub fn set_pixel(&mut self, row: usize, col: usize, value: f32) {
        self.data[[row, col]] = value;
    }

    /// Sum of all unmasked pixels.
    pub fn sum(&self) -> f32 {
        self.data.iter().filter(|v| pixel_has_data(**v)).sum()
    }

    /// Mean of all unmasked pixels, or NO_DATA if every pixel is masked.
    pub fn mean(&self) -> f32 {
        let mut sum = 0.0f32;
        let mut count = 0u32;
        for &v in self.data.iter() {
            if pixel_has_data(v) {
                sum += v;
                count += 1;
            }
        }
        if count > 0 {
            sum / count as f32
        } else {
            NO_DATA
        }
    }

    /// Median of all unmasked pixels, or NO_DATA if every pixel is masked.
    ///
    /// Even counts average the two middle values.
    pub fn median(&self) -> f32 {
        let mut values: Vec<f32> = self
            .data
            .iter()
            .copied()
            .filter(|v| pixel_has_data(*v))
            .collect();
        median_of(&mut values)
    }

    /// Position `(row, col)` of the maximum unmasked pixel.
    ///
    /// Ties break toward the lowest row, then the lowest column. Returns
    /// (0, 0) when every pixel is masked.
    pub fn peak(&self) -> (usize, usize) {
        let (h, w) = self.data.dim();
        let mut best = (0usize, 0usize);
        let mut best_val = f32::NEG_INFINITY;
        for row in 0..h {
            for col in 0..w {
                let v = self.data[[row, col]];
                if pixel_has_data(v) && v > best_val {
                    best_val = v;
                    best = (row, col);
                }
            }
        }
        best
    }

    /// Flux-weighted peak: the intensity-weighted centroid over unmasked
    /// positive pixels, rounded to the nearest pixel.
    ///
    /// Falls back to the geometric center when there is no positive flux.
    pub fn weighted_peak(&self) -> (usize, usize) {
        let (h, w) = self.data.dim();
        let mut sum_r = 0.0f64;
        let mut sum_c = 0.0f64;
        let mut sum_w = 0.0f64;
        for row in 0..h {
            for col in 0..w {
                let v = self.data[[row, col]];
                if pixel_has_data(v) && v > 0.0 {
                    let weight = v as f64;
                    sum_r += row as f64 * weight;
                    sum_c += col as f64 * weight;
                    sum_w += weight;
                }
            }
        }
        if sum_w > 0.0 {
            (
                (sum_r / sum_w).round() as usize,
                (sum_c / sum_w).round() as usize,
            )
        } else {
            (h / 2, w / 2)
        }
    }

    /// Central moments of a square stamp, normalized by its radius.
    ///
    /// `m_pq = sum over pixels of value * ((col - r)/r)^p * ((row - r)/r)^q`,
    /// skipping NO_DATA.
    pub fn central_moments(&self) -> ImageMoments {
        let (h, w) = self.data.dim();
        let rx = ((w.saturating_sub(1)) / 2).max(1) as f32;
        let ry = ((h.saturating_sub(1)) / 2).max(1) as f32;

        let mut m = ImageMoments::default();
        for row in 0..h {
            let dy = (row as f32 - ry) / ry;
            for col in 0..w {
                let v = self.data[[row, col]];
                if !pixel_has_data(v) {
                    continue;
                }
                let dx = (col as f32 - rx) / rx;
                m.m00 += v;
                m.m10 += v * dx;
                m.m01 += v * dy;
                m.m11 += v * dx * dy;
                m.m20 += v * dx * dx;
                m.m02 += v * dy * dy;
            }
        }
        m
    }

    /// Extract a `(2r+1) x (2r+1)` stamp centered on the sub-pixel position
    /// `(center_col, center_row)`.
    ///
    /// Stamp pixel `[i, j]` is the input pixel nearest
    /// `(center_col - r + j, center_row - r + i)`; no interpolation.
    /// Out-of-bounds samples are NO_DATA.
    pub fn stamp(&self, center_col: f32, center_row: f32, radius: usize) -> Result<RawImage> {
        if radius == 0 || radius > MAX_STAMP_EDGE {
            return Err(DriftscanError::InvalidStampRadius {
                radius,
                max: MAX_STAMP_EDGE,
            });
        }
        let edge = 2 * radius + 1;
        let base_row = nearest_pixel(center_row) - radius as i64;
        let base_col = nearest_pixel(center_col) - radius as i64;

        let mut out = Array2::from_elem((edge, edge), NO_DATA);
        for i in 0..edge {
            for j in 0..edge {
                out[[i, j]] = self.pixel(base_row + i as i64, base_col + j as i64);
            }
        }
        Ok(RawImage::new(out))
    }

    /// Stamp variant for display: NO_DATA samples are replaced by zero.
    pub fn stamp_filled(&self, center_col: f32, center_row: f32, radius: usize) -> Result<RawImage> {
        let mut stamp = self.stamp(center_col, center_row, radius)?;
        stamp
            .data
            .mapv_inplace(|v| if pixel_has_data(v) { v } else { 0.0 });
        Ok(stamp)
    }
}

/// Median of a scratch slice of unmasked values; empty input yields NO_DATA.
fn median_of(values: &mut Vec<f32>) -> f32 {
    let n = values.len();
    if n == 0 {
        return NO_DATA;
    }
    if n == 1 {
        return values[0];
    }
    let mid = n / 2;
    if n % 2 == 1 {
        *values
            .select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap())
            .1
    } else {
        let (_, upper, _) = values.select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap());
        let upper_val = *upper;
        let lower_val = values[..mid]
            .iter()
            .copied()
            .max_by(|a, b| a.partial_cmp(b).unwrap())
            .unwrap();
        (lower_val + upper_val) / 2.0
    }
}

/// The 1x1 NO_DATA image returned by reductions over an empty stamp list.
fn empty_reduction() -> RawImage {
    RawImage::new(Array2::from_elem((1, 1), NO_DATA))
}

/// Per-pixel sum across stamps, treating NO_DATA as zero.
pub fn create_summed_image(images: &[RawImage]) -> RawImage {
    if images.is_empty() {
        return empty_reduction();
    }
    let (h, w) = images[0].data.dim();
    let mut result = Array2::<f32>::zeros((h, w));
    for image in images {
        for ((row, col), &v) in image.data.indexed_iter() {
            if pixel_has_data(v) {
                result[[row, col]] += v;
            }
        }
    }
    RawImage::new(result)
}

/// Per-pixel mean of unmasked values across stamps; a pixel masked in every
/// stamp stays NO_DATA.
pub fn create_mean_image(images: &[RawImage]) -> RawImage {
    if images.is_empty() {
        return empty_reduction();
    }
    let (h, w) = images[0].data.dim();
    let mut result = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            let mut sum = 0.0f32;
            let mut count = 0u32;
            for image in images {
                let v = image.data[[row, col]];
                if pixel_has_data(v) {
                    sum += v;
                    count += 1;
                }
            }
            result[[row, col]] = if count > 0 { sum / count as f32 } else { NO_DATA };
        }
    }
    RawImage::new(result)
}

/// Per-pixel median of unmasked values across stamps; a pixel masked in every
/// stamp stays NO_DATA. Even counts average the two middle values.
pub fn create_median_image(images: &[RawImage]) -> RawImage {
    if images.is_empty() {
        return empty_reduction();
    }
    let (h, w) = images[0].data.dim();
    let mut result = Array2::<f32>::zeros((h, w));
    let mut values: Vec<f32> = Vec::with_capacity(images.len());
    for row in 0..h {
        for col in 0..w {
            values.clear();
            for image in images {
                let v = image.data[[row, col]];
                if pixel_has_data(v) {
                    values.push(v);
                }
            }
            result[[row, col]] = median_of(&mut values);
        }
    }
    RawImage::new(result)
}
