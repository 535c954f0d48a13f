mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "driftscan", about = "Shift-and-stack moving-object search")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show stack container metadata
    Info(commands::info::InfoArgs),
    /// Generate a synthetic stack with an inserted moving source
    Simulate(commands::simulate::SimulateArgs),
    /// Run the trajectory grid search over a stack
    Search(commands::search::SearchArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Search(args) => commands::search::run(args),
    }
}
