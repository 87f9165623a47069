//! The adaptive render optimizer
//!
//! [`RenderOptimizer`] ties the pieces together. `optimize_features` culls and
//! samples a collection with the current level's budget; `tick` runs once per
//! frame to drain deferred render work, sample telemetry and let the threshold
//! evaluator move the quality level.

use crate::clock::{Clock, FrameClock, FrameSubscription, SystemClock};
use crate::config::{CullingConfigPatch, OptimizerConfig};
use crate::error::{OptimizerError, OptimizerResult};
use crate::lod::{LodConfigPatch, LodController, QualityLevel};
use crate::scheduler::{DrainReport, RenderPriority, RenderScheduler};
use crate::stats::{PerformanceSample, StatsAggregator};
use crate::telemetry::{TelemetrySource, DEFAULT_FPS, DEFAULT_MEMORY_RATIO};
use crate::thresholds::{Decision, ThresholdEvaluator};
use mapopt_core::{BoundingBox, Feature, FeatureSampler, SamplingStrategy, ViewportCuller};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Optimizer shared between the host and its frame-clock subscription
pub type SharedOptimizer = Arc<Mutex<RenderOptimizer>>;

/// Statistics for one `optimize_features` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationStats {
    pub original_count: usize,
    pub optimized_count: usize,
    pub culled_count: usize,
    pub lod_level: QualityLevel,
    /// `None` when the visible set already fit the budget
    pub sampling_strategy: Option<SamplingStrategy>,
    pub processing_time_ms: f64,
    pub estimated_bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub optimized_features: Vec<Feature>,
    pub stats: OptimizationStats,
}

/// What happened during one frame tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub sample: PerformanceSample,
    pub drain: DrainReport,
    /// `None` when adaptive mode is off
    pub decision: Option<Decision>,
    pub level: QualityLevel,
    /// Set when this tick moved the level
    pub level_changed: bool,
}

/// Snapshot returned by [`RenderOptimizer::performance_stats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub last_optimization: Option<OptimizationStats>,
    pub current_level: QualityLevel,
    pub average_fps: f64,
    pub average_render_time_ms: f64,
    pub memory_usage: f64,
    pub render_queue_size: usize,
    pub adaptive_adjustments: u64,
    pub is_adaptive_mode: bool,
    pub sample_count: usize,
}

pub struct RenderOptimizer {
    config: OptimizerConfig,
    lod: LodController,
    evaluator: ThresholdEvaluator,
    culler: ViewportCuller,
    sampler: FeatureSampler,
    stats: StatsAggregator,
    scheduler: RenderScheduler,
    clock: Arc<dyn Clock>,
    telemetry: Option<Box<dyn TelemetrySource>>,
    last_optimization: Option<OptimizationStats>,
    /// Time spent in `optimize_features` since the previous tick
    pending_processing: Duration,
    subscription: Option<FrameSubscription>,
    destroyed: bool,
}

impl RenderOptimizer {
    pub fn new(config: OptimizerConfig) -> OptimizerResult<Self> {
        config.validate()?;
        let lod = LodController::new(config.lod.clone(), config.adaptive.initial_level, config.adaptive.enabled)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

        log::debug!(
            "Render optimizer created at level {} (adaptive: {})",
            lod.current_level(),
            config.adaptive.enabled
        );

        Ok(Self {
            evaluator: ThresholdEvaluator::new(config.thresholds, &config.adaptive),
            culler: ViewportCuller::new(config.culling.parallel_threshold),
            sampler: FeatureSampler::new(),
            stats: StatsAggregator::new(config.history.sample_capacity),
            scheduler: RenderScheduler::with_clock(clock.clone()),
            clock,
            telemetry: None,
            last_optimization: None,
            pending_processing: Duration::ZERO,
            subscription: None,
            destroyed: false,
            lod,
            config,
        })
    }

    /// Replace the time source. Call before handing out scheduler handles;
    /// the render queue is rebuilt on the new clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.scheduler = RenderScheduler::with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_telemetry<T: TelemetrySource + 'static>(mut self, telemetry: T) -> Self {
        self.telemetry = Some(Box::new(telemetry));
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn current_level(&self) -> QualityLevel {
        self.lod.current_level()
    }

    pub fn lod(&self) -> &LodController {
        &self.lod
    }

    /// Cull against `bounds` and sample down to the active level's budget.
    ///
    /// Never fails: features without usable geometry are culled and an empty
    /// input yields an empty result.
    pub fn optimize_features(&mut self, features: &[Feature], zoom: f64, bounds: Option<&BoundingBox>) -> OptimizationResult {
        let start = self.clock.now();
        let level = self.lod.resolve_level(zoom);
        let spec = *self.lod.spec(level);

        let (visible, culled_count) = match bounds {
            Some(bounds) if self.config.culling.enabled => {
                let result = self.culler.cull(features, bounds, self.config.culling.buffer_ratio);
                let culled = result.culled.len();
                (result.visible, culled)
            }
            _ => (features.iter().collect::<Vec<_>>(), 0),
        };

        let (kept, sampling_strategy) = if self.config.lod.enabled && visible.len() > spec.max_features {
            let strategy = SamplingStrategy::for_quality(spec.quality_factor);
            (self.sampler.sample_with(strategy, &visible, spec.max_features), Some(strategy))
        } else {
            (visible, None)
        };

        let optimized_features: Vec<Feature> = kept.into_iter().cloned().collect();
        let estimated_bytes = optimized_features.iter().map(Feature::estimated_bytes).sum();

        let elapsed = self.clock.now().saturating_sub(start);
        let processing_time_ms = elapsed.as_secs_f64() * 1000.0;
        self.pending_processing += elapsed;

        let stats = OptimizationStats {
            original_count: features.len(),
            optimized_count: optimized_features.len(),
            culled_count,
            lod_level: level,
            sampling_strategy,
            processing_time_ms,
            estimated_bytes,
        };
        log::debug!(
            "Optimized {} -> {} features at {} ({} culled, strategy {:?})",
            stats.original_count,
            stats.optimized_count,
            level,
            culled_count,
            sampling_strategy
        );
        self.last_optimization = Some(stats.clone());

        OptimizationResult {
            optimized_features,
            stats,
        }
    }

    /// Run one frame of the control loop. Returns `None` once destroyed.
    pub fn tick(&mut self) -> Option<TickReport> {
        if self.destroyed {
            return None;
        }

        let drain = self.scheduler.drain(self.config.scheduler.frame_budget());
        // One render-time entry per frame, however often the host optimised in it
        let render_time = drain.elapsed + std::mem::take(&mut self.pending_processing);
        let render_time_ms = render_time.as_secs_f64() * 1000.0;
        self.stats.record_render_time(render_time_ms);

        let (fps, memory) = self.read_telemetry();
        let (visible, culled) = self
            .last_optimization
            .as_ref()
            .map_or((0, 0), |s| (s.optimized_count, s.culled_count));

        let now = self.clock.now();
        let sample = PerformanceSample::new(now, fps, memory, render_time_ms, visible, culled);
        self.stats.record_sample(sample);

        let level_before = self.lod.current_level();
        let decision = if self.lod.state().adaptive_mode_enabled {
            let decision = self.evaluator.evaluate(&sample, self.lod.state_mut(), now);
            self.lod.apply(decision, now);
            Some(decision)
        } else {
            None
        };
        let level = self.lod.current_level();

        log::trace!(
            "Tick at {:?}: fps {:.1}, memory {:.2}, render {:.2} ms, {:?}",
            now,
            sample.fps,
            sample.memory_usage_ratio,
            sample.render_time_ms,
            decision
        );

        Some(TickReport {
            sample,
            drain,
            decision,
            level,
            level_changed: level != level_before,
        })
    }

    fn read_telemetry(&mut self) -> (f64, f64) {
        let Some(source) = self.telemetry.as_mut() else {
            return (DEFAULT_FPS, DEFAULT_MEMORY_RATIO);
        };
        match source.read() {
            Ok(reading) => (
                reading.fps.filter(|fps| fps.is_finite() && *fps >= 0.0).unwrap_or(DEFAULT_FPS),
                reading.memory.and_then(|m| m.ratio()).unwrap_or(DEFAULT_MEMORY_RATIO),
            ),
            Err(err) => {
                log::warn!("Telemetry read failed, using defaults: {}", err);
                (DEFAULT_FPS, DEFAULT_MEMORY_RATIO)
            }
        }
    }

    /// Defer render work to the next frame's drain
    pub fn queue_render<F>(&self, task: F, priority: RenderPriority)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        if self.destroyed {
            log::warn!("Render task dropped: optimizer destroyed");
            return;
        }
        self.scheduler.enqueue(task, priority);
    }

    /// Handle for queueing work from inside render tasks without locking the optimizer
    pub fn scheduler_handle(&self) -> RenderScheduler {
        self.scheduler.clone()
    }

    pub fn set_adaptive_mode(&mut self, enabled: bool) {
        self.lod.set_adaptive_mode(enabled);
    }

    pub fn update_lod_config(&mut self, patch: LodConfigPatch) -> OptimizerResult<()> {
        self.lod.update_config(patch)?;
        self.config.lod = self.lod.config().clone();
        Ok(())
    }

    pub fn update_culling_config(&mut self, patch: CullingConfigPatch) -> OptimizerResult<()> {
        let culling = self.config.culling.merged(&patch)?;
        if culling.parallel_threshold != self.config.culling.parallel_threshold {
            self.culler = ViewportCuller::new(culling.parallel_threshold);
        }
        self.config.culling = culling;
        log::debug!("Culling config updated: {:?}", culling);
        Ok(())
    }

    pub fn performance_stats(&self) -> PerformanceReport {
        let state = self.lod.state();
        PerformanceReport {
            last_optimization: self.last_optimization.clone(),
            current_level: state.current_level,
            average_fps: self.stats.average_fps(),
            average_render_time_ms: self.stats.average_render_time(),
            memory_usage: self.stats.memory_usage(),
            render_queue_size: self.scheduler.len(),
            adaptive_adjustments: state.adjustment_count,
            is_adaptive_mode: state.adaptive_mode_enabled,
            sample_count: self.stats.sample_count(),
        }
    }

    pub fn average_fps(&self) -> f64 {
        self.stats.average_fps()
    }

    pub fn average_render_time(&self) -> f64 {
        self.stats.average_render_time()
    }

    pub fn memory_usage(&self) -> f64 {
        self.stats.memory_usage()
    }

    /// Stop ticking, discard queued work and release history. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        let pending = self.scheduler.len();
        self.scheduler.clear();
        self.stats.clear();
        self.telemetry = None;
        self.last_optimization = None;
        self.pending_processing = Duration::ZERO;
        log::info!("Render optimizer destroyed ({} queued tasks discarded)", pending);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }
}

impl std::fmt::Debug for RenderOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOptimizer")
            .field("level", &self.lod.current_level())
            .field("adaptive", &self.lod.state().adaptive_mode_enabled)
            .field("scheduler", &self.scheduler)
            .field("attached", &self.subscription.is_some())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

/// Wrap an optimizer for sharing with a frame clock
pub fn shared(optimizer: RenderOptimizer) -> SharedOptimizer {
    Arc::new(Mutex::new(optimizer))
}

/// Subscribe the optimizer's `tick` to `frames`.
///
/// The subscription holds a weak reference, so dropping every
/// [`SharedOptimizer`] handle stops the ticks. Render tasks run under the
/// optimizer lock during a tick and must not lock it again; they should queue
/// follow-up work through [`RenderOptimizer::scheduler_handle`].
pub fn attach(optimizer: &SharedOptimizer, frames: &dyn FrameClock) -> OptimizerResult<()> {
    {
        let guard = optimizer.lock();
        if guard.destroyed {
            return Err(OptimizerError::Destroyed);
        }
        if guard.subscription.is_some() {
            log::debug!("Optimizer already attached to a frame clock");
            return Ok(());
        }
    }

    let weak = Arc::downgrade(optimizer);
    let subscription = frames.subscribe(Box::new(move || {
        if let Some(optimizer) = weak.upgrade() {
            optimizer.lock().tick();
        }
    }));
    optimizer.lock().subscription = Some(subscription);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::telemetry::{ManualTelemetry, TelemetryReading};

    fn optimizer() -> (RenderOptimizer, ManualClock, ManualTelemetry) {
        let clock = ManualClock::starting_at(Duration::from_secs(10));
        let telemetry = ManualTelemetry::new(TelemetryReading::new(60.0, 0.4));
        let optimizer = RenderOptimizer::new(OptimizerConfig::default())
            .unwrap()
            .with_clock(Arc::new(clock.clone()))
            .with_telemetry(telemetry.clone());
        (optimizer, clock, telemetry)
    }

    fn grid(n: usize) -> Vec<Feature> {
        (0..n)
            .map(|i| Feature::point((i % 100) as f64 * 0.001, (i / 100) as f64 * 0.001).with_id(i as u64))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let (mut opt, _, _) = optimizer();
        let result = opt.optimize_features(&[], 12.0, None);
        assert!(result.optimized_features.is_empty());
        assert_eq!(result.stats.original_count, 0);
        assert_eq!(result.stats.sampling_strategy, None);
    }

    #[test]
    fn test_samples_to_level_budget() {
        let (mut opt, _, _) = optimizer();
        let features = grid(2500);
        let result = opt.optimize_features(&features, 12.0, None);
        assert_eq!(result.stats.lod_level, QualityLevel::High);
        assert_eq!(result.optimized_features.len(), 1000);
        assert_eq!(result.stats.sampling_strategy, Some(SamplingStrategy::PriorityStratified));
        assert!(result.stats.estimated_bytes > 0);
    }

    #[test]
    fn test_lod_disabled_passes_visible_through() {
        let (mut opt, _, _) = optimizer();
        opt.update_lod_config(LodConfigPatch {
            enabled: Some(false),
            levels: None,
        })
        .unwrap();
        let result = opt.optimize_features(&grid(2500), 12.0, None);
        assert_eq!(result.optimized_features.len(), 2500);
    }

    #[test]
    fn test_culling_respects_config() {
        let (mut opt, _, _) = optimizer();
        let features = vec![Feature::point(0.5, 0.5), Feature::point(10.0, 10.0)];
        let bounds = BoundingBox::new(1.0, 0.0, 1.0, 0.0).unwrap();

        let result = opt.optimize_features(&features, 12.0, Some(&bounds));
        assert_eq!(result.stats.culled_count, 1);
        assert_eq!(result.optimized_features.len(), 1);

        opt.update_culling_config(CullingConfigPatch {
            enabled: Some(false),
            ..Default::default()
        })
        .unwrap();
        let result = opt.optimize_features(&features, 12.0, Some(&bounds));
        assert_eq!(result.stats.culled_count, 0);
        assert_eq!(result.optimized_features.len(), 2);
    }

    #[test]
    fn test_invalid_patch_leaves_config() {
        let (mut opt, _, _) = optimizer();
        let err = opt.update_culling_config(CullingConfigPatch {
            buffer_ratio: Some(-0.5),
            ..Default::default()
        });
        assert!(err.is_err());
        assert_eq!(opt.config().culling.buffer_ratio, 0.1);
    }

    #[test]
    fn test_low_fps_ticks_deescalate() {
        let (mut opt, clock, telemetry) = optimizer();
        telemetry.set_fps(20.0);
        let mut changes = 0;
        for _ in 0..3 {
            clock.advance_ms(16);
            let report = opt.tick().unwrap();
            changes += report.level_changed as usize;
        }
        assert_eq!(changes, 1);
        assert_eq!(opt.current_level(), QualityLevel::Medium);
        assert_eq!(opt.performance_stats().adaptive_adjustments, 1);
    }

    #[test]
    fn test_render_time_recorded_once_per_tick() {
        let (mut opt, clock, _) = optimizer();
        let task_clock = clock.clone();
        opt.queue_render(
            move || {
                task_clock.advance_ms(4);
                Ok(())
            },
            RenderPriority::Normal,
        );
        for _ in 0..3 {
            opt.optimize_features(&grid(10), 12.0, None);
        }
        assert_eq!(opt.average_render_time(), 0.0);

        let report = opt.tick().unwrap();
        assert!((report.sample.render_time_ms - 4.0).abs() < 1e-9);
        assert!((opt.average_render_time() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_adaptive_off_skips_evaluation() {
        let (mut opt, clock, telemetry) = optimizer();
        opt.set_adaptive_mode(false);
        telemetry.set_fps(10.0);
        for _ in 0..5 {
            clock.advance_ms(16);
            assert_eq!(opt.tick().unwrap().decision, None);
        }
        assert_eq!(opt.lod().state().consecutive_low_fps_ticks, 0);
        assert_eq!(opt.optimize_features(&grid(10), 3.0, None).stats.lod_level, QualityLevel::Minimal);
    }

    #[test]
    fn test_stale_streak_does_not_survive_adaptive_toggle() {
        let (mut opt, clock, telemetry) = optimizer();
        telemetry.set_fps(20.0);
        for _ in 0..2 {
            clock.advance_ms(16);
            opt.tick();
        }
        opt.set_adaptive_mode(false);
        opt.set_adaptive_mode(true);

        clock.advance_ms(16);
        assert!(!opt.tick().unwrap().level_changed);
        assert_eq!(opt.current_level(), QualityLevel::High);
    }

    #[test]
    fn test_queue_render_runs_on_tick() {
        let (mut opt, _, _) = optimizer();
        let ran = Arc::new(Mutex::new(0));
        let counter = ran.clone();
        opt.queue_render(
            move || {
                *counter.lock() += 1;
                Ok(())
            },
            RenderPriority::Normal,
        );
        assert_eq!(opt.performance_stats().render_queue_size, 1);
        let report = opt.tick().unwrap();
        assert_eq!(report.drain.executed, 1);
        assert_eq!(*ran.lock(), 1);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (mut opt, _, _) = optimizer();
        opt.queue_render(|| Ok(()), RenderPriority::High);
        opt.optimize_features(&grid(5), 12.0, None);
        opt.destroy();
        opt.destroy();
        assert!(opt.is_destroyed());
        assert!(opt.tick().is_none());
        let report = opt.performance_stats();
        assert_eq!(report.render_queue_size, 0);
        assert_eq!(report.last_optimization, None);
        assert_eq!(report.average_fps, 60.0);
    }
}
