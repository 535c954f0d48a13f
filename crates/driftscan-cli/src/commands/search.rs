use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use driftscan_core::compute::{create_backend, DevicePreference};
use driftscan_core::config::SearchConfig;
use driftscan_core::image::pixel_has_data;
use driftscan_core::io::stack_io::StackReader;
use driftscan_core::search::StackSearch;
use driftscan_core::stamp::is_rejected_stamp;

#[derive(Clone, ValueEnum)]
pub enum DeviceArg {
    Auto,
    Cpu,
    Gpu,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Input stack container (.dstk)
    pub file: PathBuf,

    /// TOML search configuration; defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the configured compute device
    #[arg(long, value_enum)]
    pub device: Option<DeviceArg>,

    /// Maximum trajectories to report
    #[arg(long, default_value = "20")]
    pub limit: usize,

    /// Write reported trajectories as CSV
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Write coadd stamp previews as PNGs into this directory
    #[arg(long)]
    pub stamps_dir: Option<PathBuf>,
}

pub fn run(args: &SearchArgs) -> Result<()> {
    let mut config: SearchConfig = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SearchConfig::default(),
    };
    if let Some(device) = &args.device {
        config.device = match device {
            DeviceArg::Auto => DevicePreference::Auto,
            DeviceArg::Cpu => DevicePreference::ForceCpu,
            DeviceArg::Gpu => DevicePreference::ForceGpu,
        };
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);

    spinner.set_message(format!("loading {}", args.file.display()));
    let reader = StackReader::open(&args.file)?;
    let mut stack = reader.read_stack()?;
    if config.mask_flags != 0 {
        stack.apply_mask_flags(config.mask_flags);
        if config.global_mask_threshold > 0 {
            stack.apply_global_mask(config.mask_flags, config.global_mask_threshold);
        }
    }

    let backend = create_backend(config.device)?;
    spinner.set_message(format!(
        "searching {} images of {}x{} on {}",
        stack.len(),
        stack.width(),
        stack.height(),
        backend.name()
    ));

    let mut search = StackSearch::with_backend(&stack, backend.clone());
    search.search(&config.grid, &config.search)?;
    spinner.finish_and_clear();
    tracing::debug!(results = search.results().len(), "search complete");

    let reported = &search.results()[..args.limit.min(search.results().len())];
    println!(
        "{} trajectories ({} reported)",
        search.results().len(),
        reported.len()
    );
    println!(
        "{:>5} {:>5} {:>9} {:>9} {:>10} {:>10} {:>4}",
        style("x").dim(),
        style("y").dim(),
        style("vx").dim(),
        style("vy").dim(),
        style("lh").dim(),
        style("flux").dim(),
        style("obs").dim()
    );
    for trj in reported {
        println!(
            "{:>5} {:>5} {:>9.3} {:>9.3} {:>10.3} {:>10.3} {:>4}",
            trj.x, trj.y, trj.vx, trj.vy, trj.likelihood, trj.flux, trj.obs_count
        );
    }

    if let Some(path) = &args.results {
        let mut out = fs::File::create(path)?;
        writeln!(out, "x,y,vx,vy,likelihood,flux,obs_count")?;
        for trj in reported {
            writeln!(
                out,
                "{},{},{},{},{},{},{}",
                trj.x, trj.y, trj.vx, trj.vy, trj.likelihood, trj.flux, trj.obs_count
            )?;
        }
        println!("{} {}", style("wrote").green().bold(), path.display());
    }

    if let Some(dir) = &args.stamps_dir {
        fs::create_dir_all(dir)?;
        let stamps = backend.coadd_stamps(&stack, reported, &config.stamp, &[])?;
        let bar = ProgressBar::new(stamps.len() as u64);
        bar.set_style(ProgressStyle::with_template(
            "{bar:30} {pos}/{len} stamps",
        )?);
        let mut kept = 0usize;
        for (i, stamp) in stamps.iter().enumerate() {
            bar.inc(1);
            if is_rejected_stamp(stamp) {
                continue;
            }
            let path = dir.join(format!("stamp_{i:04}.png"));
            save_stamp_png(stamp, &path)?;
            kept += 1;
        }
        bar.finish_and_clear();
        println!(
            "{} {} stamps to {}",
            style("wrote").green().bold(),
            kept,
            dir.display()
        );
    }

    Ok(())
}

/// Normalize a stamp to 8-bit grayscale; masked pixels render black.
fn save_stamp_png(stamp: &driftscan_core::image::RawImage, path: &PathBuf) -> Result<()> {
    let (h, w) = stamp.data.dim();
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in stamp.data.iter() {
        if pixel_has_data(v) {
            min = min.min(v);
            max = max.max(v);
        }
    }
    let range = (max - min).max(f32::EPSILON);

    let mut bytes = Vec::with_capacity(w * h);
    for &v in stamp.data.iter() {
        if pixel_has_data(v) {
            bytes.push((((v - min) / range) * 255.0) as u8);
        } else {
            bytes.push(0u8);
        }
    }
    let img = image::GrayImage::from_raw(w as u32, h as u32, bytes)
        .context("stamp buffer size mismatch")?;
    img.save(path)?;
    Ok(())
}
