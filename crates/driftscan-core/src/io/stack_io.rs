//! Raw stack container (`.dstk`): a minimal binary format so tooling and
//! tests can round-trip image stacks without an external pipeline.
//!
//! Layout (all little-endian):
//!   magic "DSTK", version u16, num_images u32, width u32, height u32,
//!   then per image: mjd f64, psf_radius u32, kernel (2r+1)^2 f32,
//!   science w*h f32, variance w*h f32, mask w*h u32.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{DriftscanError, Result};
use crate::image::RawImage;
use crate::layered::LayeredImage;
use crate::psf::Psf;
use crate::stack::ImageStack;

pub const STACK_MAGIC: &[u8; 4] = b"DSTK";
pub const STACK_VERSION: u16 = 1;
pub const STACK_HEADER_SIZE: usize = 18;

/// Largest PSF kernel radius accepted from a container file; anything
/// bigger indicates corruption.
const MAX_CONTAINER_PSF_RADIUS: u32 = 64;

/// Fixed-size container header.
#[derive(Clone, Debug)]
pub struct StackHeader {
    pub num_images: u32,
    pub width: u32,
    pub height: u32,
}

/// Memory-mapped stack container reader.
pub struct StackReader {
    mmap: Mmap,
    pub header: StackHeader,
}

impl StackReader {
    /// Open a container file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < STACK_HEADER_SIZE {
            return Err(DriftscanError::InvalidContainer(
                "file shorter than header".to_string(),
            ));
        }

        let mut cursor = Cursor::new(&mmap[..]);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if &magic != STACK_MAGIC {
            return Err(DriftscanError::InvalidContainer(
                "bad magic (not a DSTK file)".to_string(),
            ));
        }
        let version = cursor.read_u16::<LittleEndian>()?;
        if version != STACK_VERSION {
            return Err(DriftscanError::InvalidContainer(format!(
                "unsupported version {version}"
            )));
        }
        let num_images = cursor.read_u32::<LittleEndian>()?;
        let width = cursor.read_u32::<LittleEndian>()?;
        let height = cursor.read_u32::<LittleEndian>()?;
        if num_images == 0 || width == 0 || height == 0 {
            return Err(DriftscanError::InvalidContainer(format!(
                "degenerate stack: {num_images} images of {width}x{height}"
            )));
        }

        Ok(Self {
            mmap,
            header: StackHeader {
                num_images,
                width,
                height,
            },
        })
    }

    /// Parse every image and assemble the stack.
    pub fn read_stack(&self) -> Result<ImageStack> {
        let w = self.header.width as usize;
        let h = self.header.height as usize;
        let pixels = w * h;

        let mut cursor = Cursor::new(&self.mmap[..]);
        cursor.set_position(STACK_HEADER_SIZE as u64);

        let mut images = Vec::with_capacity(self.header.num_images as usize);
        for _ in 0..self.header.num_images {
            let mjd = cursor.read_f64::<LittleEndian>()?;
            let radius = cursor.read_u32::<LittleEndian>()?;
            if radius > MAX_CONTAINER_PSF_RADIUS {
                return Err(DriftscanError::InvalidContainer(format!(
                    "implausible PSF radius {radius}"
                )));
            }
            let edge = (2 * radius + 1) as usize;
            let mut kernel = vec![0.0f32; edge * edge];
            cursor.read_f32_into::<LittleEndian>(&mut kernel)?;
            let kernel = Array2::from_shape_vec((edge, edge), kernel)
                .map_err(|e| DriftscanError::InvalidContainer(e.to_string()))?;
            let psf = Psf::from_kernel(kernel)?;

            let mut science = vec![0.0f32; pixels];
            cursor.read_f32_into::<LittleEndian>(&mut science)?;
            let mut variance = vec![0.0f32; pixels];
            cursor.read_f32_into::<LittleEndian>(&mut variance)?;
            let mut mask = vec![0u32; pixels];
            cursor.read_u32_into::<LittleEndian>(&mut mask)?;

            let to_plane = |v: Vec<f32>| -> Result<RawImage> {
                Ok(RawImage::new(
                    Array2::from_shape_vec((h, w), v)
                        .map_err(|e| DriftscanError::InvalidContainer(e.to_string()))?,
                ))
            };
            let mask = Array2::from_shape_vec((h, w), mask)
                .map_err(|e| DriftscanError::InvalidContainer(e.to_string()))?;

            images.push(LayeredImage::new(
                to_plane(science)?,
                to_plane(variance)?,
                mask,
                mjd,
                psf,
            )?);
        }
        ImageStack::new(images)
    }
}

/// Write a stack to a container file.
pub fn write_stack(path: &Path, stack: &ImageStack) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    out.write_all(STACK_MAGIC)?;
    out.write_u16::<LittleEndian>(STACK_VERSION)?;
    out.write_u32::<LittleEndian>(stack.len() as u32)?;
    out.write_u32::<LittleEndian>(stack.width() as u32)?;
    out.write_u32::<LittleEndian>(stack.height() as u32)?;

    for image in stack.images() {
        out.write_f64::<LittleEndian>(image.mjd())?;
        out.write_u32::<LittleEndian>(image.psf().radius() as u32)?;
        for &v in image.psf().kernel().iter() {
            out.write_f32::<LittleEndian>(v)?;
        }
        for &v in image.science().data.iter() {
            out.write_f32::<LittleEndian>(v)?;
        }
        for &v in image.variance().data.iter() {
            out.write_f32::<LittleEndian>(v)?;
        }
        for &v in image.mask().iter() {
            out.write_u32::<LittleEndian>(v)?;
        }
    }
    out.flush()?;
    Ok(())
}
