//! Pipeline loading
//!
//! Reads a compiled pipeline from a JSON file and rejects configs a backend
//! could not run safely.

use anyhow::{Context, Result};
use keel_core::Config;
use std::path::Path;
use tracing::debug;

/// Loads and validates a pipeline file
pub async fn load_pipeline(path: &Path) -> Result<Config> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;

    let config = parse_pipeline(&source)
        .with_context(|| format!("Invalid pipeline file {}", path.display()))?;

    debug!(
        "Loaded pipeline from {}: {} stage(s), {} volume(s), {} network(s)",
        path.display(),
        config.stages.len(),
        config.volumes.len(),
        config.networks.len()
    );

    Ok(config)
}

fn parse_pipeline(source: &str) -> Result<Config> {
    let config: Config = serde_json::from_str(source).context("Failed to parse pipeline JSON")?;
    config.validate()?;
    Ok(config)
}
