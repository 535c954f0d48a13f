use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{DriftscanError, Result};
use crate::image::RawImage;
use crate::layered::LayeredImage;

/// A time-ordered stack of co-registered exposures.
///
/// Index 0 defines the time origin; timestamps need not be sorted. Pixel
/// data is immutable for the duration of a search.
#[derive(Clone, Debug)]
pub struct ImageStack {
    images: Vec<LayeredImage>,
}

impl ImageStack {
    pub fn new(images: Vec<LayeredImage>) -> Result<Self> {
        let first = images.first().ok_or(DriftscanError::EmptyStack)?;
        let (w, h) = (first.width(), first.height());
        for image in &images[1..] {
            if image.width() != w || image.height() != h {
                return Err(DriftscanError::LayerShapeMismatch {
                    expected_width: w,
                    expected_height: h,
                    width: image.width(),
                    height: image.height(),
                });
            }
        }
        Ok(Self { images })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn width(&self) -> usize {
        self.images[0].width()
    }

    pub fn height(&self) -> usize {
        self.images[0].height()
    }

    pub fn images(&self) -> &[LayeredImage] {
        &self.images
    }

    pub fn get(&self, index: usize) -> Result<&LayeredImage> {
        self.images
            .get(index)
            .ok_or(DriftscanError::ImageIndexOutOfRange {
                index,
                total: self.images.len(),
            })
    }

    /// Observation times relative to image 0, in days.
    pub fn zeroed_times(&self) -> Vec<f32> {
        let origin = self.images[0].mjd();
        self.images
            .iter()
            .map(|image| (image.mjd() - origin) as f32)
            .collect()
    }

    /// Apply the bitfield mask of every image to its own science and
    /// variance planes.
    pub fn apply_mask_flags(&mut self, flags: u32) {
        self.images
            .par_iter_mut()
            .for_each(|image| image.apply_mask(flags));
    }

    /// Synthesize a binary global mask: pixel p is set iff at least
    /// `threshold` images have p flagged under one of `flags`.
    pub fn global_mask(&self, flags: u32, threshold: usize) -> RawImage {
        let (h, w) = (self.height(), self.width());
        let mut counts = Array2::<u32>::zeros((h, w));
        for image in &self.images {
            for ((row, col), &bits) in image.mask().indexed_iter() {
                if bits & flags != 0 {
                    counts[[row, col]] += 1;
                }
            }
        }
        RawImage::new(counts.mapv(|c| if c as usize >= threshold { 1.0 } else { 0.0 }))
    }

    /// Apply a global mask to every image in the stack.
    pub fn apply_global_mask(&mut self, flags: u32, threshold: usize) {
        let global = self.global_mask(flags, threshold);
        self.images
            .par_iter_mut()
            .for_each(|image| image.apply_global_mask(&global));
    }

    /// Generate psi images for the whole stack, one per exposure.
    pub fn generate_psi_images(&self) -> Vec<RawImage> {
        self.images
            .par_iter()
            .map(|image| image.generate_psi())
            .collect()
    }

    /// Generate phi images for the whole stack, one per exposure.
    pub fn generate_phi_images(&self) -> Vec<RawImage> {
        self.images
            .par_iter()
            .map(|image| image.generate_phi())
            .collect()
    }
}
