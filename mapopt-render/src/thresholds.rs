//! Threshold evaluation for adaptive quality control
//!
//! Each tick's [`PerformanceSample`] updates the breach streaks held in
//! [`AdaptiveState`] and yields a [`Decision`]. Any decision other than `Hold`
//! is suppressed while the cooldown since the last adjustment is running.

use crate::lod::{AdaptiveState, QualityLevel};
use crate::stats::PerformanceSample;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Warning levels for live telemetry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    pub fps_warning: f64,
    /// Memory usage ratio in `[0, 1]`
    pub memory_warning: f64,
    pub render_time_warning_ms: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            fps_warning: 45.0,
            memory_warning: 0.8,
            render_time_warning_ms: 16.0,
        }
    }
}

/// Adaptive loop settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    pub cooldown_ms: u64,
    /// Consecutive breaching ticks before a streak forces a de-escalation
    pub breach_ticks: u32,
    pub initial_level: QualityLevel,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_ms: 1000,
            breach_ticks: 3,
            initial_level: QualityLevel::High,
        }
    }
}

impl AdaptiveConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Escalate,
    Deescalate,
    Hold,
}

// Escalation requires comfortable headroom on every axis
const ESCALATE_FPS_FACTOR: f64 = 1.2;
const ESCALATE_MEMORY_FACTOR: f64 = 0.8;
const ESCALATE_RENDER_FACTOR: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    thresholds: PerformanceThresholds,
    cooldown: Duration,
    breach_ticks: u32,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: PerformanceThresholds, adaptive: &AdaptiveConfig) -> Self {
        Self {
            thresholds,
            cooldown: adaptive.cooldown(),
            breach_ticks: adaptive.breach_ticks.max(1),
        }
    }

    pub fn thresholds(&self) -> &PerformanceThresholds {
        &self.thresholds
    }

    /// Whether `now` is still inside the cooldown started by the last adjustment
    pub fn in_cooldown(&self, state: &AdaptiveState, now: Duration) -> bool {
        match state.last_adjustment {
            Some(last) => now.saturating_sub(last) < self.cooldown,
            None => false,
        }
    }

    /// Update the breach streaks and decide on a level change
    pub fn evaluate(&self, sample: &PerformanceSample, state: &mut AdaptiveState, now: Duration) -> Decision {
        let t = &self.thresholds;
        let low_fps = sample.fps < t.fps_warning;
        let high_memory = sample.memory_usage_ratio > t.memory_warning;
        let slow_render = sample.render_time_ms > t.render_time_warning_ms;

        state.consecutive_low_fps_ticks = if low_fps {
            state.consecutive_low_fps_ticks.saturating_add(1)
        } else {
            0
        };
        state.consecutive_high_memory_ticks = if high_memory {
            state.consecutive_high_memory_ticks.saturating_add(1)
        } else {
            0
        };

        let level = state.current_level;
        let breached = state.consecutive_low_fps_ticks >= self.breach_ticks
            || state.consecutive_high_memory_ticks >= self.breach_ticks
            || slow_render;

        let decision = if breached && level != QualityLevel::Minimal {
            Decision::Deescalate
        } else if !breached
            && sample.fps > t.fps_warning * ESCALATE_FPS_FACTOR
            && sample.memory_usage_ratio < t.memory_warning * ESCALATE_MEMORY_FACTOR
            && sample.render_time_ms < t.render_time_warning_ms * ESCALATE_RENDER_FACTOR
            && state.consecutive_low_fps_ticks == 0
            && state.consecutive_high_memory_ticks == 0
            && level != QualityLevel::Ultra
        {
            Decision::Escalate
        } else {
            Decision::Hold
        };

        if decision != Decision::Hold && self.in_cooldown(state, now) {
            log::trace!("{:?} suppressed by cooldown", decision);
            return Decision::Hold;
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lod::{LodConfig, LodController};

    fn evaluator() -> ThresholdEvaluator {
        ThresholdEvaluator::new(PerformanceThresholds::default(), &AdaptiveConfig::default())
    }

    fn sample(fps: f64, memory: f64, render_ms: f64) -> PerformanceSample {
        PerformanceSample::new(Duration::ZERO, fps, memory, render_ms, 0, 0)
    }

    #[test]
    fn test_low_fps_streak_deescalates_on_third_tick() {
        let eval = evaluator();
        let mut state = AdaptiveState::new(QualityLevel::High, true);
        let now = Duration::from_secs(10);

        assert_eq!(eval.evaluate(&sample(20.0, 0.3, 4.0), &mut state, now), Decision::Hold);
        assert_eq!(eval.evaluate(&sample(20.0, 0.3, 4.0), &mut state, now), Decision::Hold);
        assert_eq!(eval.evaluate(&sample(20.0, 0.3, 4.0), &mut state, now), Decision::Deescalate);
        assert_eq!(state.consecutive_low_fps_ticks, 3);
    }

    #[test]
    fn test_streak_resets_on_recovery() {
        let eval = evaluator();
        let mut state = AdaptiveState::new(QualityLevel::High, true);
        let now = Duration::from_secs(10);

        eval.evaluate(&sample(20.0, 0.3, 4.0), &mut state, now);
        eval.evaluate(&sample(20.0, 0.3, 4.0), &mut state, now);
        eval.evaluate(&sample(50.0, 0.3, 4.0), &mut state, now);
        assert_eq!(state.consecutive_low_fps_ticks, 0);
        assert_eq!(eval.evaluate(&sample(20.0, 0.3, 4.0), &mut state, now), Decision::Hold);
    }

    #[test]
    fn test_high_memory_streak() {
        let eval = evaluator();
        let mut state = AdaptiveState::new(QualityLevel::Medium, true);
        let now = Duration::from_secs(10);
        for _ in 0..2 {
            assert_eq!(eval.evaluate(&sample(60.0, 0.95, 4.0), &mut state, now), Decision::Hold);
        }
        assert_eq!(eval.evaluate(&sample(60.0, 0.95, 4.0), &mut state, now), Decision::Deescalate);
    }

    #[test]
    fn test_slow_render_deescalates_immediately() {
        let eval = evaluator();
        let mut state = AdaptiveState::new(QualityLevel::Ultra, true);
        let decision = eval.evaluate(&sample(60.0, 0.3, 20.0), &mut state, Duration::from_secs(2));
        assert_eq!(decision, Decision::Deescalate);
    }

    #[test]
    fn test_no_deescalation_below_minimal() {
        let eval = evaluator();
        let mut state = AdaptiveState::new(QualityLevel::Minimal, true);
        let decision = eval.evaluate(&sample(60.0, 0.3, 30.0), &mut state, Duration::from_secs(2));
        assert_eq!(decision, Decision::Hold);
    }

    #[test]
    fn test_escalation_needs_headroom_on_every_axis() {
        let eval = evaluator();
        let now = Duration::from_secs(2);

        let mut state = AdaptiveState::new(QualityLevel::Medium, true);
        assert_eq!(eval.evaluate(&sample(60.0, 0.3, 4.0), &mut state, now), Decision::Escalate);

        // 54 fps is exactly 1.2 x 45 and does not qualify
        let mut state = AdaptiveState::new(QualityLevel::Medium, true);
        assert_eq!(eval.evaluate(&sample(54.0, 0.3, 4.0), &mut state, now), Decision::Hold);

        let mut state = AdaptiveState::new(QualityLevel::Medium, true);
        assert_eq!(eval.evaluate(&sample(60.0, 0.7, 4.0), &mut state, now), Decision::Hold);

        let mut state = AdaptiveState::new(QualityLevel::Medium, true);
        assert_eq!(eval.evaluate(&sample(60.0, 0.3, 9.0), &mut state, now), Decision::Hold);

        let mut state = AdaptiveState::new(QualityLevel::Ultra, true);
        assert_eq!(eval.evaluate(&sample(60.0, 0.3, 4.0), &mut state, now), Decision::Hold);
    }

    #[test]
    fn test_cooldown_suppresses_but_counts() {
        let eval = evaluator();
        let mut state = AdaptiveState::new(QualityLevel::High, true);
        state.last_adjustment = Some(Duration::from_millis(1000));

        let inside = Duration::from_millis(1500);
        for _ in 0..4 {
            assert_eq!(eval.evaluate(&sample(20.0, 0.3, 4.0), &mut state, inside), Decision::Hold);
        }
        assert_eq!(state.consecutive_low_fps_ticks, 4);

        let after = Duration::from_millis(2000);
        assert_eq!(eval.evaluate(&sample(20.0, 0.3, 4.0), &mut state, after), Decision::Deescalate);
    }

    #[test]
    fn test_repeated_breaches_within_cooldown_step_once() {
        let eval = evaluator();
        let mut lod = LodController::new(LodConfig::default(), QualityLevel::High, true).unwrap();

        let mut now = Duration::from_secs(5);
        for _ in 0..10 {
            let decision = eval.evaluate(&sample(20.0, 0.3, 4.0), lod.state_mut(), now);
            lod.apply(decision, now);
            now += Duration::from_millis(16);
        }
        assert_eq!(lod.current_level(), QualityLevel::Medium);
        assert_eq!(lod.state().adjustment_count, 1);
    }
}
