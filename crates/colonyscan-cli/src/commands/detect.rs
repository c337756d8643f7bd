use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colonyscan_core::io::image_io::{load_image, save_gray};
use colonyscan_core::table::MeasurementTable;

#[derive(Args)]
pub struct DetectArgs {
    /// Plate image file
    pub image: PathBuf,

    /// Pipeline configuration (TOML); defaults are used when omitted
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Save the processed grayscale here
    #[arg(long, short)]
    pub out: Option<PathBuf>,

    /// Show at most N objects
    #[arg(long, default_value = "20")]
    pub top: usize,
}

pub fn run(args: &DetectArgs) -> Result<()> {
    let config = super::load_pipeline_config(args.config.as_deref())?;
    let pipeline = config.build();

    let image = load_image(&args.image)?;
    let (processed, table) = pipeline.apply_and_measure(&image)?;

    println!(
        "{}: {} colonies detected",
        processed.name(),
        processed.num_objects()
    );
    print_table_head(&table, args.top);

    if let Some(out) = &args.out {
        save_gray(&processed, out)?;
        println!("\nSaved processed grayscale to {}", out.display());
    }
    Ok(())
}

fn print_table_head(table: &MeasurementTable, top: usize) {
    println!(
        "\n{:>8}  {:>8}  {:>10}  {:>10}  {:>12}",
        "Label", "Area", "CenterRR", "CenterCC", "Mean"
    );
    println!("{}", "-".repeat(56));
    for &label in table.labels().iter().take(top) {
        println!(
            "{:>8}  {:>8}  {:>10.2}  {:>10.2}  {:>12.4}",
            label,
            table.int_value(label, "Area").unwrap_or(0),
            table.float_value(label, "Bbox_CenterRR").unwrap_or(0.0),
            table.float_value(label, "Bbox_CenterCC").unwrap_or(0.0),
            table.float_value(label, "Intensity_Mean").unwrap_or(0.0),
        );
    }
    if table.n_rows() > top {
        println!("... {} more", table.n_rows() - top);
    }
}
