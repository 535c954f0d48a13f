use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;
use driftscan_core::io::stack_io::StackReader;

#[derive(Args)]
pub struct InfoArgs {
    /// Input stack container (.dstk)
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = StackReader::open(&args.file)?;
    let header = &reader.header;

    println!("{}", style(args.file.display()).bold());
    println!("  images: {}", header.num_images);
    println!("  size:   {}x{}", header.width, header.height);

    let stack = reader.read_stack()?;
    let times = stack.zeroed_times();
    println!();
    println!(
        "  {:>5} {:>14} {:>10} {:>10}",
        style("index").dim(),
        style("mjd").dim(),
        style("t (days)").dim(),
        style("psf r").dim()
    );
    for (i, image) in stack.images().iter().enumerate() {
        println!(
            "  {:>5} {:>14.6} {:>10.4} {:>10}",
            i,
            image.mjd(),
            times[i],
            image.psf().radius()
        );
    }
    Ok(())
}
