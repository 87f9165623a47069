//! Rolling performance statistics

use crate::telemetry::{DEFAULT_FPS, DEFAULT_MEMORY_RATIO};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Number of samples retained by default
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// One tick's worth of performance data
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceSample {
    #[serde(serialize_with = "serialize_millis")]
    pub timestamp: Duration,
    pub fps: f64,
    pub memory_usage_ratio: f64,
    pub render_time_ms: f64,
    pub visible_feature_count: usize,
    pub culled_feature_count: usize,
}

impl PerformanceSample {
    /// Build a sample, clamping readings into their valid ranges
    pub fn new(
        timestamp: Duration,
        fps: f64,
        memory_usage_ratio: f64,
        render_time_ms: f64,
        visible_feature_count: usize,
        culled_feature_count: usize,
    ) -> Self {
        Self {
            timestamp,
            fps: non_negative(fps),
            memory_usage_ratio: if memory_usage_ratio.is_finite() {
                memory_usage_ratio.clamp(0.0, 1.0)
            } else {
                DEFAULT_MEMORY_RATIO
            },
            render_time_ms: non_negative(render_time_ms),
            visible_feature_count,
            culled_feature_count,
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

/// Bounded ring buffer with a running mean
#[derive(Debug, Clone)]
struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// Keeps the recent fps, render-time and memory history plus the raw samples
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    fps: RollingWindow,
    render_times: RollingWindow,
    memory: RollingWindow,
    samples: VecDeque<PerformanceSample>,
    capacity: usize,
}

impl StatsAggregator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            fps: RollingWindow::new(capacity),
            render_times: RollingWindow::new(capacity),
            memory: RollingWindow::new(capacity),
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record the duration of one render drain
    pub fn record_render_time(&mut self, render_time_ms: f64) {
        self.render_times.push(non_negative(render_time_ms));
    }

    /// Record one tick's sample; fps and memory feed their rolling averages
    pub fn record_sample(&mut self, sample: PerformanceSample) {
        self.fps.push(sample.fps);
        self.memory.push(sample.memory_usage_ratio);
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn average_fps(&self) -> f64 {
        self.fps.mean().unwrap_or(DEFAULT_FPS)
    }

    pub fn average_render_time(&self) -> f64 {
        self.render_times.mean().unwrap_or(0.0)
    }

    pub fn memory_usage(&self) -> f64 {
        self.memory.mean().unwrap_or(DEFAULT_MEMORY_RATIO)
    }

    pub fn latest(&self) -> Option<&PerformanceSample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.samples.iter()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.fps.clear();
        self.render_times.clear();
        self.memory.clear();
        self.samples.clear();
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
