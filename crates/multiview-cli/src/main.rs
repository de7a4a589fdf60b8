mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "multiview", about = "Non-rigid multi-view fusion of 3-D microscopy data")]
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
    /// Show the views, bounding boxes and landmarks of a dataset
    Info(commands::info::InfoArgs),
    /// Report landmark correspondences and reference points
    Landmarks(commands::landmarks::LandmarksArgs),
    /// Fuse all views into one volume and save it as TIFF slices
    Fuse(commands::fuse::FuseArgs),
    /// Print or save the default fusion config
    Config(commands::config::ConfigArgs),
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
        Commands::Landmarks(args) => commands::landmarks::run(args),
        Commands::Fuse(args) => commands::fuse::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
