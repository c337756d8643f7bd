use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colonyscan_core::io::archive::ArchiveReader;

#[derive(Args)]
pub struct InfoArgs {
    /// Plate-set archive file
    pub archive: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = ArchiveReader::open(&args.archive)?;

    println!("Archive:  {}", args.archive.display());
    println!("Images:   {} / {} slots", reader.len(), reader.capacity());
    println!();
    println!("{:<32}  {:>12}  {:>8}", "Name", "Bytes", "Table");
    println!("{}", "-".repeat(56));

    for name in reader.names() {
        let size = reader.payload_size(&name)?;
        let has_table = reader.measurements(&name)?.is_some();
        println!(
            "{:<32}  {:>12}  {:>8}",
            name,
            size,
            if has_table { "yes" } else { "-" }
        );
    }

    Ok(())
}
