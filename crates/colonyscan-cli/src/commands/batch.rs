use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use colonyscan_core::batch::{BatchConfig, BatchProcessor, PlateSet};

#[derive(Args)]
pub struct BatchArgs {
    /// Plate-set archive file
    pub archive: PathBuf,

    /// Pipeline configuration (TOML); defaults are used when omitted
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Worker threads; defaults to the CPU count
    #[arg(long)]
    pub workers: Option<usize>,

    /// Free-memory multiplier required before loading an image
    #[arg(long, default_value = "1.25")]
    pub ram_ratio: f64,
}

pub fn run(args: &BatchArgs) -> Result<()> {
    let pipeline_config = super::load_pipeline_config(args.config.as_deref())?;
    let pipeline = Arc::new(pipeline_config.build());

    let set = PlateSet::open(&args.archive)?;
    let total = set.len()?;
    info!(set = set.name(), images = total, "starting batch run");

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message("Processing plates");

    let mut config = BatchConfig {
        ram_ratio: args.ram_ratio,
        ..BatchConfig::default()
    };
    if let Some(workers) = args.workers {
        config.num_workers = workers;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let report = BatchProcessor::with_config(config).process_reported(
        &set,
        &pipeline,
        shutdown,
        &|done| pb.set_position(done as u64),
    )?;
    pb.finish_with_message("Done");

    println!(
        "\nProcessed {}/{} images ({} failed)",
        report.processed,
        report.submitted,
        report.failed.len()
    );
    for (name, reason) in &report.failed {
        println!("  FAILED {name}: {reason}");
    }

    let aggregated = set.all_measurements()?;
    println!(
        "Aggregated measurements: {} rows x {} columns",
        aggregated.n_rows(),
        aggregated.n_cols()
    );
    Ok(())
}
