/*!
# MapOpt Render Control

Adaptive level-of-detail control for dense map feature layers.

## Architecture

Each frame the control loop:
1. Drains deferred render work within a fixed budget ([`RenderScheduler`])
2. Records render time, fps and memory pressure ([`StatsAggregator`])
3. Evaluates the sample against warning thresholds ([`ThresholdEvaluator`])
4. Moves the quality level one step when a streak or headroom warrants it ([`LodController`])

[`RenderOptimizer::optimize_features`] then culls and samples with the budget of
the current [`QualityLevel`].
*/

pub mod clock;
pub mod config;
pub mod error;
pub mod lod;
pub mod optimizer;
pub mod scheduler;
pub mod stats;
pub mod telemetry;
pub mod thresholds;

pub use clock::{Clock, FrameCallback, FrameClock, FrameSubscription, ManualClock, ManualFrameClock, SystemClock};
pub use config::{CullingConfig, CullingConfigPatch, HistoryConfig, OptimizerConfig};
pub use error::{OptimizerError, OptimizerResult};
pub use lod::{AdaptiveState, LevelSpec, LevelTable, LodConfig, LodConfigPatch, LodController, QualityLevel};
pub use optimizer::{
    attach, shared, OptimizationResult, OptimizationStats, PerformanceReport, RenderOptimizer, SharedOptimizer,
    TickReport,
};
pub use scheduler::{DrainOutcome, DrainReport, RenderPriority, RenderScheduler, RenderTask, SchedulerConfig};
pub use stats::{PerformanceSample, StatsAggregator};
pub use telemetry::{
    ManualTelemetry, MemoryReading, ScriptedTelemetry, TelemetryError, TelemetryReading, TelemetrySource,
};
pub use thresholds::{AdaptiveConfig, Decision, PerformanceThresholds, ThresholdEvaluator};
