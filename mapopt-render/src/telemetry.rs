//! Performance telemetry providers
//!
//! The optimizer asks its provider for a reading once per tick. Providers may
//! report only part of a reading or fail outright; the optimizer substitutes
//! [`DEFAULT_FPS`] and [`DEFAULT_MEMORY_RATIO`] for anything missing.

use parking_lot::Mutex;
use std::sync::Arc;

/// Frame rate assumed when nothing better is known
pub const DEFAULT_FPS: f64 = 60.0;
/// Memory pressure assumed when the host exposes no memory API
pub const DEFAULT_MEMORY_RATIO: f64 = 0.5;

/// Errors a telemetry provider can report
#[derive(Debug, Clone, thiserror::Error)]
pub enum TelemetryError {
    #[error("Telemetry unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid telemetry reading: {0}")]
    Invalid(String),
}

/// Memory usage as reported by the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemoryReading {
    /// Fraction of the available budget in use
    Ratio(f64),
    /// Absolute heap figures
    Bytes { used: u64, limit: u64 },
}

impl MemoryReading {
    /// Usage as a ratio in `[0, 1]`, or `None` when it cannot be derived
    pub fn ratio(&self) -> Option<f64> {
        let ratio = match *self {
            MemoryReading::Ratio(r) => r,
            MemoryReading::Bytes { limit: 0, .. } => return None,
            MemoryReading::Bytes { used, limit } => used as f64 / limit as f64,
        };
        ratio.is_finite().then(|| ratio.clamp(0.0, 1.0))
    }
}

/// A single telemetry reading; absent fields fall back to defaults
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryReading {
    pub fps: Option<f64>,
    pub memory: Option<MemoryReading>,
}

impl TelemetryReading {
    pub fn new(fps: f64, memory_ratio: f64) -> Self {
        Self {
            fps: Some(fps),
            memory: Some(MemoryReading::Ratio(memory_ratio)),
        }
    }

    pub fn fps_only(fps: f64) -> Self {
        Self {
            fps: Some(fps),
            memory: None,
        }
    }
}

/// Source of live performance readings
pub trait TelemetrySource: Send {
    fn read(&mut self) -> Result<TelemetryReading, TelemetryError>;
}

/// Telemetry whose reading is set from outside; clones share state
#[derive(Debug, Clone)]
pub struct ManualTelemetry {
    state: Arc<Mutex<Result<TelemetryReading, TelemetryError>>>,
}

impl ManualTelemetry {
    pub fn new(reading: TelemetryReading) -> Self {
        Self {
            state: Arc::new(Mutex::new(Ok(reading))),
        }
    }

    pub fn set(&self, reading: TelemetryReading) {
        *self.state.lock() = Ok(reading);
    }

    pub fn set_fps(&self, fps: f64) {
        let mut state = self.state.lock();
        let mut reading = state.as_ref().copied().unwrap_or_default();
        reading.fps = Some(fps);
        *state = Ok(reading);
    }

    /// Make subsequent reads fail until the next `set`
    pub fn fail_with(&self, error: TelemetryError) {
        *self.state.lock() = Err(error);
    }
}

impl Default for ManualTelemetry {
    fn default() -> Self {
        Self::new(TelemetryReading::default())
    }
}

impl TelemetrySource for ManualTelemetry {
    fn read(&mut self) -> Result<TelemetryReading, TelemetryError> {
        self.state.lock().clone()
    }
}

/// Replays a fixed sequence of readings, repeating the last one once exhausted
#[derive(Debug, Clone)]
pub struct ScriptedTelemetry {
    readings: Vec<TelemetryReading>,
    cursor: usize,
}

impl ScriptedTelemetry {
    pub fn new(readings: Vec<TelemetryReading>) -> Self {
        Self { readings, cursor: 0 }
    }

    /// Script with fps values only; memory is left to the default
    pub fn from_fps(trace: &[f64]) -> Self {
        Self::new(trace.iter().map(|&fps| TelemetryReading::fps_only(fps)).collect())
    }

    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl TelemetrySource for ScriptedTelemetry {
    fn read(&mut self) -> Result<TelemetryReading, TelemetryError> {
        let last = self
            .readings
            .len()
            .checked_sub(1)
            .ok_or_else(|| TelemetryError::Unavailable("empty telemetry script".into()))?;
        let reading = self.readings[self.cursor.min(last)];
        self.cursor += 1;
        Ok(reading)
    }
}
