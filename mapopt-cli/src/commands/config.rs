//! Config command - print the example or effective configuration

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::CliError;

pub fn execute(config: &Config, example: bool, show: bool, output: Option<PathBuf>) -> Result<()> {
    if !example && !show {
        return Err(CliError::invalid_argument("config", "pass --example or --show").into());
    }

    match output {
        Some(path) if show => {
            config.save_to_file(&path)?;
            log::info!("Wrote {}", path.display());
        }
        Some(path) => {
            std::fs::write(&path, Config::example_toml()?)
                .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None if show => print!("{}", config.to_toml()?),
        None => print!("{}", Config::example_toml()?),
    }
    Ok(())
}
