mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "colonyscan", about = "Microbial colony image phenotyping tool")]
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
    /// Show plate-set archive metadata
    Info(commands::info::InfoArgs),
    /// Import plate images into a new archive
    Import(commands::import::ImportArgs),
    /// Detect and measure colonies on a single plate image
    Detect(commands::detect::DetectArgs),
    /// Run a pipeline over every image in an archive
    Batch(commands::batch::BatchArgs),
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
        Commands::Import(args) => commands::import::run(args),
        Commands::Detect(args) => commands::detect::run(args),
        Commands::Batch(args) => commands::batch::run(args),
    }
}
