//! Packed psi/phi sufficient statistics for the whole stack.
//!
//! Two parallel planes (psi, phi) laid out as
//! `time * width * height + row * width + col`, each independently stored as
//! raw f32 or quantized to 1 or 2 bytes per value with a per-image affine
//! map. The all-ones code is reserved for NO_DATA.

use crate::consts::{NO_DATA, QUANT_MIN_RANGE};
use crate::error::{DriftscanError, Result};
use crate::image::{pixel_has_data, RawImage};

/// Per-image affine decode parameters for a quantized plane.
#[derive(Clone, Copy, Debug)]
pub struct QuantBounds {
    pub min_val: f32,
    pub scale: f32,
}

#[derive(Clone, Debug)]
enum PlaneData {
    Float(Vec<f32>),
    U8(Vec<u8>),
    U16(Vec<u16>),
}

/// One packed plane (psi or phi) across all times.
#[derive(Clone, Debug)]
pub struct PsiPhiPlane {
    data: PlaneData,
    /// One entry per image for quantized planes; empty for raw floats.
    bounds: Vec<QuantBounds>,
    pixels_per_image: usize,
}

impl PsiPhiPlane {
    fn encode(images: &[RawImage], num_bytes: usize) -> Result<Self> {
        let pixels_per_image = images
            .first()
            .map(|im| im.width() * im.height())
            .unwrap_or(0);
        match num_bytes {
            4 => {
                let mut data = Vec::with_capacity(images.len() * pixels_per_image);
                for image in images {
                    data.extend(image.data.iter().copied());
                }
                Ok(Self {
                    data: PlaneData::Float(data),
                    bounds: Vec::new(),
                    pixels_per_image,
                })
            }
            1 => {
                let (codes, bounds) = quantize(images, 1);
                Ok(Self {
                    data: PlaneData::U8(codes.into_iter().map(|q| q as u8).collect()),
                    bounds,
                    pixels_per_image,
                })
            }
            2 => {
                let (codes, bounds) = quantize(images, 2);
                Ok(Self {
                    data: PlaneData::U16(codes.into_iter().map(|q| q as u16).collect()),
                    bounds,
                    pixels_per_image,
                })
            }
            other => Err(DriftscanError::InvalidEncoding { num_bytes: other }),
        }
    }

    pub fn num_bytes(&self) -> usize {
        match self.data {
            PlaneData::Float(_) => 4,
            PlaneData::U8(_) => 1,
            PlaneData::U16(_) => 2,
        }
    }

    pub fn bounds(&self) -> &[QuantBounds] {
        &self.bounds
    }

    /// Decode the value at a flat plane index.
    #[inline]
    pub fn read(&self, index: usize) -> f32 {
        match &self.data {
            PlaneData::Float(data) => data[index],
            PlaneData::U8(data) => {
                let q = data[index] as u32;
                self.decode(q, u8::MAX as u32, index)
            }
            PlaneData::U16(data) => {
                let q = data[index] as u32;
                self.decode(q, u16::MAX as u32, index)
            }
        }
    }

    #[inline]
    fn decode(&self, code: u32, no_data_code: u32, index: usize) -> f32 {
        if code == no_data_code {
            NO_DATA
        } else {
            let b = self.bounds[index / self.pixels_per_image];
            b.min_val + code as f32 * b.scale
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            PlaneData::Float(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.data {
            PlaneData::U8(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match &self.data {
            PlaneData::U16(data) => Some(data),
            _ => None,
        }
    }
}

/// Quantize each image independently to `8 * num_bytes` bit codes.
fn quantize(images: &[RawImage], num_bytes: usize) -> (Vec<u32>, Vec<QuantBounds>) {
    let no_data_code: u32 = (1u32 << (8 * num_bytes)) - 1;
    let max_code = no_data_code - 1;

    let mut codes = Vec::new();
    let mut bounds = Vec::with_capacity(images.len());
    for image in images {
        let mut min_val = f32::INFINITY;
        let mut max_val = f32::NEG_INFINITY;
        for &v in image.data.iter() {
            if pixel_has_data(v) {
                min_val = min_val.min(v);
                max_val = max_val.max(v);
            }
        }
        if !min_val.is_finite() {
            // All-masked image: every code is the NO_DATA code, bounds unused.
            min_val = 0.0;
            max_val = 0.0;
        }
        let range = (max_val - min_val).max(QUANT_MIN_RANGE);
        let scale = range / max_code as f32;
        bounds.push(QuantBounds { min_val, scale });

        for &v in image.data.iter() {
            let q = if pixel_has_data(v) {
                (((v - min_val) / scale).round() as i64).clamp(0, max_code as i64) as u32
            } else {
                no_data_code
            };
            codes.push(q);
        }
    }
    (codes, bounds)
}

/// The device-facing packed representation of all psi and phi values.
///
/// The host copy is authoritative; `on_device` only tracks whether a backend
/// currently holds an uploaded copy.
#[derive(Clone, Debug)]
pub struct PsiPhiArray {
    num_times: usize,
    width: usize,
    height: usize,
    psi: PsiPhiPlane,
    phi: PsiPhiPlane,
    zeroed_times: Vec<f32>,
    on_device: bool,
}

impl PsiPhiArray {
    pub fn new(
        psi_images: &[RawImage],
        phi_images: &[RawImage],
        zeroed_times: Vec<f32>,
        psi_num_bytes: usize,
        phi_num_bytes: usize,
    ) -> Result<Self> {
        if psi_images.is_empty() {
            return Err(DriftscanError::EmptyStack);
        }
        if psi_images.len() != phi_images.len() {
            return Err(DriftscanError::MaskLengthMismatch {
                expected: psi_images.len(),
                got: phi_images.len(),
            });
        }
        if zeroed_times.len() != psi_images.len() {
            return Err(DriftscanError::MaskLengthMismatch {
                expected: psi_images.len(),
                got: zeroed_times.len(),
            });
        }
        let height = psi_images[0].height();
        let width = psi_images[0].width();

        Ok(Self {
            num_times: psi_images.len(),
            width,
            height,
            psi: PsiPhiPlane::encode(psi_images, psi_num_bytes)?,
            phi: PsiPhiPlane::encode(phi_images, phi_num_bytes)?,
            zeroed_times,
            on_device: false,
        })
    }

    pub fn num_times(&self) -> usize {
        self.num_times
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn zeroed_times(&self) -> &[f32] {
        &self.zeroed_times
    }

    pub fn psi_plane(&self) -> &PsiPhiPlane {
        &self.psi
    }

    pub fn phi_plane(&self) -> &PsiPhiPlane {
        &self.phi
    }

    pub fn psi_num_bytes(&self) -> usize {
        self.psi.num_bytes()
    }

    pub fn phi_num_bytes(&self) -> usize {
        self.phi.num_bytes()
    }

    pub fn on_device(&self) -> bool {
        self.on_device
    }

    pub fn set_on_device(&mut self, on_device: bool) {
        self.on_device = on_device;
    }

    #[inline]
    fn flat_index(&self, time: usize, row: usize, col: usize) -> usize {
        time * self.width * self.height + row * self.width + col
    }

    /// Decoded psi value at (time, row, col); NO_DATA when out of bounds.
    #[inline]
    pub fn read_psi(&self, time: usize, row: i64, col: i64) -> f32 {
        if row < 0 || col < 0 || row >= self.height as i64 || col >= self.width as i64 {
            return NO_DATA;
        }
        self.psi
            .read(self.flat_index(time, row as usize, col as usize))
    }

    /// Decoded phi value at (time, row, col); NO_DATA when out of bounds.
    #[inline]
    pub fn read_phi(&self, time: usize, row: i64, col: i64) -> f32 {
        if row < 0 || col < 0 || row >= self.height as i64 || col >= self.width as i64 {
            return NO_DATA;
        }
        self.phi
            .read(self.flat_index(time, row as usize, col as usize))
    }
}
