use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colonyscan_core::batch::PlateSet;

#[derive(Args)]
pub struct ImportArgs {
    /// Directory of plate images (png/jpg/tif)
    pub dir: PathBuf,

    /// Output archive file
    #[arg(long, short)]
    pub out: PathBuf,

    /// Set name; defaults to the output file stem
    #[arg(long)]
    pub name: Option<String>,
}

pub fn run(args: &ImportArgs) -> Result<()> {
    let name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .out
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "plates".to_string()),
    };

    let set = PlateSet::from_directory(&name, &args.dir, &args.out)?;
    println!(
        "Imported {} images into {}",
        set.len()?,
        args.out.display()
    );
    Ok(())
}
