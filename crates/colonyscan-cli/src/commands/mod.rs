pub mod batch;
pub mod detect;
pub mod import;
pub mod info;

use std::path::Path;

use anyhow::{Context, Result};
use colonyscan_core::pipeline::PipelineConfig;

/// Load a pipeline config from a TOML file, or fall back to the default.
pub fn load_pipeline_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading pipeline config {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("parsing pipeline config {}", path.display()))
        }
        None => Ok(PipelineConfig::default()),
    }
}
