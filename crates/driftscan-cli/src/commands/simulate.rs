use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;
use ndarray::Array2;

use driftscan_core::image::{nearest_pixel, RawImage};
use driftscan_core::io::stack_io::write_stack;
use driftscan_core::layered::LayeredImage;
use driftscan_core::psf::Psf;
use driftscan_core::stack::ImageStack;

#[derive(Args)]
pub struct SimulateArgs {
    /// Output stack container (.dstk)
    pub output: PathBuf,

    #[arg(long, default_value = "256")]
    pub width: usize,

    #[arg(long, default_value = "256")]
    pub height: usize,

    /// Number of exposures
    #[arg(long, default_value = "10")]
    pub num_times: usize,

    /// Days between exposures
    #[arg(long, default_value = "0.1")]
    pub cadence: f64,

    /// Gaussian PSF sigma in pixels
    #[arg(long, default_value = "1.0")]
    pub psf_sigma: f32,

    /// Source flux
    #[arg(long, default_value = "250.0")]
    pub flux: f32,

    /// Source start column at t = 0
    #[arg(long, default_value = "128.0")]
    pub x0: f32,

    /// Source start row at t = 0
    #[arg(long, default_value = "128.0")]
    pub y0: f32,

    /// Source column velocity, pixels/day
    #[arg(long, default_value = "20.0")]
    pub vx: f32,

    /// Source row velocity, pixels/day
    #[arg(long, default_value = "0.0")]
    pub vy: f32,

    /// Flat per-pixel variance
    #[arg(long, default_value = "4.0")]
    pub variance: f32,
}

/// Add a PSF-shaped source at a sub-pixel position.
fn insert_source(science: &mut RawImage, psf: &Psf, col: f32, row: f32, flux: f32) {
    let radius = psf.radius() as i64;
    let center_row = nearest_pixel(row);
    let center_col = nearest_pixel(col);
    for (kr, krow) in (center_row - radius..=center_row + radius).enumerate() {
        for (kc, kcol) in (center_col - radius..=center_col + radius).enumerate() {
            if krow < 0
                || kcol < 0
                || krow >= science.height() as i64
                || kcol >= science.width() as i64
            {
                continue;
            }
            science.data[[krow as usize, kcol as usize]] += flux * psf.kernel()[[kr, kc]];
        }
    }
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    let psf = Psf::gaussian(args.psf_sigma)?;
    let mjd0 = 60000.0;

    let mut images = Vec::with_capacity(args.num_times);
    for i in 0..args.num_times {
        let t = i as f64 * args.cadence;
        let mut science = RawImage::zeros(args.height, args.width);
        insert_source(
            &mut science,
            &psf,
            args.x0 + args.vx * t as f32,
            args.y0 + args.vy * t as f32,
            args.flux,
        );
        let variance = RawImage::new(Array2::from_elem(
            (args.height, args.width),
            args.variance,
        ));
        let mask = Array2::<u32>::zeros((args.height, args.width));
        images.push(LayeredImage::new(
            science,
            variance,
            mask,
            mjd0 + t,
            psf.clone(),
        )?);
    }

    let stack = ImageStack::new(images)?;
    write_stack(&args.output, &stack)?;
    println!(
        "{} {} ({} x {}x{}, source at ({}, {}) moving ({}, {}) px/day)",
        style("wrote").green().bold(),
        args.output.display(),
        args.num_times,
        args.width,
        args.height,
        args.x0,
        args.y0,
        args.vx,
        args.vy
    );
    Ok(())
}
