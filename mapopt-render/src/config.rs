//! Optimizer configuration
//!
//! Every section deserializes with defaults for missing keys, so a partial
//! TOML or JSON document is a valid configuration.

use crate::error::{OptimizerError, OptimizerResult};
use crate::lod::LodConfig;
use crate::scheduler::SchedulerConfig;
use crate::stats::DEFAULT_HISTORY_CAPACITY;
use crate::thresholds::{AdaptiveConfig, PerformanceThresholds};
use mapopt_core::cull::DEFAULT_PARALLEL_THRESHOLD;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub lod: LodConfig,
    pub culling: CullingConfig,
    pub thresholds: PerformanceThresholds,
    pub adaptive: AdaptiveConfig,
    pub scheduler: SchedulerConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    pub enabled: bool,
    /// Fraction of the viewport span added on each side
    pub buffer_ratio: f64,
    /// Collections at or above this size are culled on the rayon pool
    pub parallel_threshold: usize,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_ratio: 0.1,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl CullingConfig {
    pub fn validate(&self) -> OptimizerResult<()> {
        if !self.buffer_ratio.is_finite() || self.buffer_ratio < 0.0 {
            return Err(OptimizerError::invalid_config(format!(
                "culling.buffer_ratio must be finite and >= 0, got {}",
                self.buffer_ratio
            )));
        }
        Ok(())
    }

    /// Shallow merge; the result is validated before it is returned
    pub fn merged(&self, patch: &CullingConfigPatch) -> OptimizerResult<Self> {
        let merged = Self {
            enabled: patch.enabled.unwrap_or(self.enabled),
            buffer_ratio: patch.buffer_ratio.unwrap_or(self.buffer_ratio),
            parallel_threshold: patch.parallel_threshold.unwrap_or(self.parallel_threshold),
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// Partial update for [`CullingConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfigPatch {
    pub enabled: Option<bool>,
    pub buffer_ratio: Option<f64>,
    pub parallel_threshold: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Samples kept for rolling averages
    pub sample_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            sample_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> OptimizerResult<()> {
        self.lod.levels.validate()?;
        self.culling.validate()?;

        let t = &self.thresholds;
        if !t.fps_warning.is_finite() || t.fps_warning <= 0.0 {
            return Err(OptimizerError::invalid_config("thresholds.fps_warning must be > 0"));
        }
        if !(0.0..=1.0).contains(&t.memory_warning) {
            return Err(OptimizerError::invalid_config("thresholds.memory_warning must be within [0, 1]"));
        }
        if !t.render_time_warning_ms.is_finite() || t.render_time_warning_ms <= 0.0 {
            return Err(OptimizerError::invalid_config("thresholds.render_time_warning_ms must be > 0"));
        }

        if self.adaptive.breach_ticks == 0 {
            return Err(OptimizerError::invalid_config("adaptive.breach_ticks must be > 0"));
        }
        if !self.scheduler.frame_budget_ms.is_finite() || self.scheduler.frame_budget_ms <= 0.0 {
            return Err(OptimizerError::invalid_config(format!(
                "scheduler.frame_budget_ms must be > 0, got {}",
                self.scheduler.frame_budget_ms
            )));
        }
        if self.history.sample_capacity == 0 {
            return Err(OptimizerError::invalid_config("history.sample_capacity must be > 0"));
        }
        Ok(())
    }
}
