//! Configuration handling for the MapOpt CLI
//!
//! Loads `mapopt.toml` (or the file given with `--config`); command-line flags
//! override individual values afterwards.

use anyhow::{Context, Result};
use mapopt_render::OptimizerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CliError;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "mapopt.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub simulation: SimulationConfig,
    pub optimizer: OptimizerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Worker threads for parallel culling; all cores when unset
    pub threads: Option<usize>,

    /// Omit wall-clock timestamps from reports
    pub deterministic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Synthetic frame interval
    pub frame_ms: u64,

    /// Seed for the synthetic feature generator
    pub seed: u64,

    /// Simulated render cost per feature, in microseconds
    pub render_cost_us: u64,

    /// Features per queued render task
    pub render_chunk: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_ms: 16,
            seed: 42,
            render_cost_us: 4,
            render_chunk: 250,
        }
    }
}

impl Config {
    /// Load configuration from `path`, `./mapopt.toml`, or defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::file_not_found(path.to_path_buf()).into());
                }
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                    Self::load_from_file(&default_path)?
                } else {
                    log::debug!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .map_err(CliError::from)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CliError> {
        self.optimizer.validate()?;
        if self.simulation.frame_ms == 0 {
            return Err(CliError::config("simulation.frame_ms must be > 0"));
        }
        if self.simulation.render_chunk == 0 {
            return Err(CliError::config("simulation.render_chunk must be > 0"));
        }
        if self.general.threads == Some(0) {
            return Err(CliError::config("general.threads must be > 0"));
        }
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Annotated example configuration
    pub fn example_toml() -> Result<String, CliError> {
        let body = Self::default().to_toml()?;
        Ok(format!(
            "# MapOpt configuration\n\
             #\n\
             # Every key is optional; missing keys take the values shown here.\n\
             # Level budgets (max_features) and quality factors must decrease\n\
             # from ultra to minimal. Quality >= 0.8 samples by priority,\n\
             # >= 0.5 by uniform stride, anything lower truncates.\n\n{}",
            body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapopt_render::QualityLevel;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.simulation.frame_ms, 16);
        assert_eq!(config.optimizer.adaptive.cooldown_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let mut config = Config::default();
        config.optimizer.adaptive.initial_level = QualityLevel::Low;
        config.general.threads = Some(2);
        let temp_file = NamedTempFile::new()?;

        config.save_to_file(temp_file.path())?;
        let loaded = Config::load_from_file(temp_file.path())?;

        assert_eq!(loaded.optimizer, config.optimizer);
        assert_eq!(loaded.general.threads, Some(2));
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        std::fs::write(
            temp_file.path(),
            "[optimizer.culling]\nbuffer_ratio = 0.3\n\n[optimizer.lod.levels.minimal]\nzoom_floor = 0.0\nmax_features = 50\nquality_factor = 0.1\n",
        )?;
        let config = Config::load_from_file(temp_file.path())?;
        assert_eq!(config.optimizer.culling.buffer_ratio, 0.3);
        assert_eq!(config.optimizer.lod.levels.minimal.max_features, 50);
        assert_eq!(config.optimizer.lod.levels.high.max_features, 1000);
        assert_eq!(config.simulation.seed, 42);
        Ok(())
    }

    #[test]
    fn test_invalid_file_is_rejected() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        std::fs::write(temp_file.path(), "[optimizer.scheduler]\nframe_budget_ms = 0.0\n")?;
        assert!(Config::load_from_file(temp_file.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_example_toml_generation() -> Result<()> {
        let example = Config::example_toml()?;
        assert!(example.starts_with("# MapOpt configuration"));
        assert!(example.contains("[optimizer.culling]"));
        assert!(example.contains("[simulation]"));

        let parsed: Config = toml::from_str(&example)?;
        assert_eq!(parsed.optimizer, OptimizerConfig::default());
        Ok(())
    }
}
