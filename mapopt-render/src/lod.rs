/*!
# Level of Detail (LOD) Management

Five ordered quality levels control how many features reach the renderer:

- Ultra / High: priority-stratified sampling with large budgets
- Medium: uniform stride sampling
- Low / Minimal: plain truncation with small budgets

The controller either follows the adaptive state (escalated or de-escalated by
the threshold evaluator) or, with adaptive mode off, maps the map zoom straight
to a level through each level's zoom floor.
*/

use crate::error::{OptimizerError, OptimizerResult};
use crate::thresholds::Decision;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Quality level, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Ultra,
    High,
    Medium,
    Low,
    Minimal,
}

impl QualityLevel {
    /// All levels, best first
    pub const ALL: [QualityLevel; 5] = [
        QualityLevel::Ultra,
        QualityLevel::High,
        QualityLevel::Medium,
        QualityLevel::Low,
        QualityLevel::Minimal,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Next level toward Ultra
    pub fn better(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Next level toward Minimal
    pub fn worse(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            QualityLevel::Ultra => "ultra",
            QualityLevel::High => "high",
            QualityLevel::Medium => "medium",
            QualityLevel::Low => "low",
            QualityLevel::Minimal => "minimal",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-level rendering budget
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSpec {
    /// Lowest zoom at which this level is chosen when adaptive mode is off
    pub zoom_floor: f64,
    pub max_features: usize,
    /// Drives the sampling strategy, in `[0, 1]`
    pub quality_factor: f64,
}

impl LevelSpec {
    pub const fn new(zoom_floor: f64, max_features: usize, quality_factor: f64) -> Self {
        Self {
            zoom_floor,
            max_features,
            quality_factor,
        }
    }
}

/// Budgets for every level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelTable {
    pub ultra: LevelSpec,
    pub high: LevelSpec,
    pub medium: LevelSpec,
    pub low: LevelSpec,
    pub minimal: LevelSpec,
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            ultra: LevelSpec::new(15.0, 2000, 1.0),
            high: LevelSpec::new(12.0, 1000, 0.85),
            medium: LevelSpec::new(9.0, 500, 0.7),
            low: LevelSpec::new(6.0, 200, 0.4),
            minimal: LevelSpec::new(0.0, 100, 0.2),
        }
    }
}

impl LevelTable {
    pub fn get(&self, level: QualityLevel) -> &LevelSpec {
        match level {
            QualityLevel::Ultra => &self.ultra,
            QualityLevel::High => &self.high,
            QualityLevel::Medium => &self.medium,
            QualityLevel::Low => &self.low,
            QualityLevel::Minimal => &self.minimal,
        }
    }

    /// Budgets and quality must strictly decrease from Ultra to Minimal
    pub fn validate(&self) -> OptimizerResult<()> {
        for level in QualityLevel::ALL {
            let spec = self.get(level);
            if spec.max_features == 0 {
                return Err(OptimizerError::invalid_levels(format!("{level}: max_features must be > 0")));
            }
            if !(0.0..=1.0).contains(&spec.quality_factor) {
                return Err(OptimizerError::invalid_levels(format!(
                    "{level}: quality_factor {} outside [0, 1]",
                    spec.quality_factor
                )));
            }
            if !spec.zoom_floor.is_finite() {
                return Err(OptimizerError::invalid_levels(format!("{level}: zoom_floor must be finite")));
            }
        }

        for pair in QualityLevel::ALL.windows(2) {
            let (better, worse) = (self.get(pair[0]), self.get(pair[1]));
            if worse.max_features >= better.max_features {
                return Err(OptimizerError::invalid_levels(format!(
                    "max_features must decrease from {} to {}",
                    pair[0], pair[1]
                )));
            }
            if worse.quality_factor >= better.quality_factor {
                return Err(OptimizerError::invalid_levels(format!(
                    "quality_factor must decrease from {} to {}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(())
    }
}

/// LOD configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// When off, over-budget collections are passed through unsampled
    pub enabled: bool,
    pub levels: LevelTable,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            levels: LevelTable::default(),
        }
    }
}

/// Shallow update for [`LodConfig`]; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfigPatch {
    pub enabled: Option<bool>,
    pub levels: Option<LevelTable>,
}

/// Mutable adaptive state, owned by the controller
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveState {
    pub current_level: QualityLevel,
    pub consecutive_low_fps_ticks: u32,
    pub consecutive_high_memory_ticks: u32,
    /// `None` until the first adjustment
    pub last_adjustment: Option<Duration>,
    pub adjustment_count: u64,
    pub adaptive_mode_enabled: bool,
}

impl AdaptiveState {
    pub fn new(initial_level: QualityLevel, adaptive_mode_enabled: bool) -> Self {
        Self {
            current_level: initial_level,
            consecutive_low_fps_ticks: 0,
            consecutive_high_memory_ticks: 0,
            last_adjustment: None,
            adjustment_count: 0,
            adaptive_mode_enabled,
        }
    }
}

/// Owns the quality-level state machine
#[derive(Debug, Clone)]
pub struct LodController {
    config: LodConfig,
    state: AdaptiveState,
}

impl LodController {
    pub fn new(config: LodConfig, initial_level: QualityLevel, adaptive_mode: bool) -> OptimizerResult<Self> {
        config.levels.validate()?;
        Ok(Self {
            config,
            state: AdaptiveState::new(initial_level, adaptive_mode),
        })
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn state(&self) -> &AdaptiveState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AdaptiveState {
        &mut self.state
    }

    pub fn current_level(&self) -> QualityLevel {
        self.state.current_level
    }

    pub fn spec(&self, level: QualityLevel) -> &LevelSpec {
        self.config.levels.get(level)
    }

    /// Turning adaptive mode on starts the breach streaks from zero
    pub fn set_adaptive_mode(&mut self, enabled: bool) {
        if self.state.adaptive_mode_enabled != enabled {
            log::info!("Adaptive LOD mode {}", if enabled { "enabled" } else { "disabled" });
            if enabled {
                self.state.consecutive_low_fps_ticks = 0;
                self.state.consecutive_high_memory_ticks = 0;
            }
        }
        self.state.adaptive_mode_enabled = enabled;
    }

    /// Level for the next optimisation pass
    pub fn resolve_level(&self, zoom: f64) -> QualityLevel {
        if self.state.adaptive_mode_enabled {
            self.state.current_level
        } else {
            self.level_for_zoom(zoom)
        }
    }

    /// First level, best to worst, whose zoom floor is at or below `zoom`
    pub fn level_for_zoom(&self, zoom: f64) -> QualityLevel {
        QualityLevel::ALL
            .into_iter()
            .find(|&level| self.spec(level).zoom_floor <= zoom)
            .unwrap_or(QualityLevel::Minimal)
    }

    /// Apply an evaluator decision. Returns the new level when it changed.
    pub fn apply(&mut self, decision: Decision, now: Duration) -> Option<QualityLevel> {
        let current = self.state.current_level;
        let next = match decision {
            Decision::Hold => return None,
            Decision::Escalate => current.better(),
            Decision::Deescalate => current.worse(),
        }?;

        self.state.current_level = next;
        self.state.last_adjustment = Some(now);
        self.state.adjustment_count += 1;
        log::info!("LOD level {} -> {} ({:?})", current, next, decision);
        Some(next)
    }

    pub fn update_config(&mut self, patch: LodConfigPatch) -> OptimizerResult<()> {
        if let Some(levels) = &patch.levels {
            levels.validate()?;
        }
        if let Some(enabled) = patch.enabled {
            self.config.enabled = enabled;
        }
        if let Some(levels) = patch.levels {
            self.config.levels = levels;
        }
        log::debug!("LOD config updated: {:?}", self.config);
        Ok(())
    }
}
