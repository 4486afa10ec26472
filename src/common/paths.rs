use anyhow::{Context, Result};
use std::path::PathBuf;

/// Centralized path management for captiongen

/// Get the captiongen config directory
pub fn captiongen_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("captiongen");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Get the captiongen data directory
pub fn captiongen_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("captiongen");

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory at {}", data_dir.display()))?;

    Ok(data_dir)
}

/// Default root for captioned videos, subtitles and the job ledger
pub fn captiongen_output_dir() -> Result<PathBuf> {
    let output_dir = captiongen_data_dir()?.join("output");
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory at {}", output_dir.display()))?;
    Ok(output_dir)
}
