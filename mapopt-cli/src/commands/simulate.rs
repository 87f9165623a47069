//! Simulate command - drive the adaptive loop on a synthetic clock
//!
//! Every simulated frame optimises the synthetic layer, queues chunked render
//! work whose cost advances the clock, then fires one frame tick. The fps
//! trace stands in for the host's telemetry.

use anyhow::Result;
use mapopt_core::BoundingBox;
use mapopt_render::{
    attach, shared, Clock, ManualClock, ManualFrameClock, MemoryReading, PerformanceReport, QualityLevel,
    RenderOptimizer, RenderPriority, ScriptedTelemetry, TelemetryReading,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::CliError;
use crate::synth::FeatureGenerator;

pub struct SimulateArgs {
    pub features: usize,
    pub ticks: usize,
    pub fps: String,
    pub memory: Option<f64>,
    pub zoom: f64,
    pub bounds: String,
    pub seed: Option<u64>,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub tick: usize,
    pub at_ms: u64,
    pub from: QualityLevel,
    pub to: QualityLevel,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub features: usize,
    pub ticks: usize,
    pub seed: u64,
    pub transitions: Vec<Transition>,
    pub frames_per_level: BTreeMap<QualityLevel, usize>,
    pub final_level: QualityLevel,
    pub performance: PerformanceReport,
}

/// Parse `60,45x10,20` into a per-frame fps trace
pub fn parse_fps_trace(input: &str) -> Result<Vec<f64>, CliError> {
    let invalid = |message: String| CliError::invalid_argument("--fps", message);
    let mut trace = Vec::new();

    for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (value, repeat) = match entry.split_once('x') {
            Some((value, count)) => {
                let count: usize = count
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("bad repeat count in '{}'", entry)))?;
                (value, count)
            }
            None => (entry, 1),
        };
        let fps: f64 = value
            .trim()
            .parse()
            .map_err(|_| invalid(format!("bad fps value in '{}'", entry)))?;
        if !fps.is_finite() || fps < 0.0 {
            return Err(invalid(format!("fps must be finite and >= 0, got {}", fps)));
        }
        trace.extend(std::iter::repeat(fps).take(repeat));
    }

    if trace.is_empty() {
        return Err(invalid("trace is empty".into()));
    }
    Ok(trace)
}

pub fn run_simulation(config: &Config, args: &SimulateArgs) -> Result<SimulationReport> {
    let bounds: BoundingBox = args.bounds.parse().map_err(CliError::from)?;
    let trace = parse_fps_trace(&args.fps)?;
    if let Some(memory) = args.memory {
        if !(0.0..=1.0).contains(&memory) {
            return Err(CliError::invalid_argument("--memory", format!("{} is outside [0, 1]", memory)).into());
        }
    }
    let seed = args.seed.unwrap_or(config.simulation.seed);
    let sim = &config.simulation;

    let readings = trace
        .iter()
        .map(|&fps| TelemetryReading {
            fps: Some(fps),
            memory: args.memory.map(MemoryReading::Ratio),
        })
        .collect();

    let clock = ManualClock::new();
    let frames = ManualFrameClock::new();
    let optimizer = RenderOptimizer::new(config.optimizer.clone())
        .map_err(CliError::from)?
        .with_clock(Arc::new(clock.clone()))
        .with_telemetry(ScriptedTelemetry::new(readings));
    let optimizer = shared(optimizer);
    attach(&optimizer, &frames).map_err(CliError::from)?;
    let scheduler = optimizer.lock().scheduler_handle();

    let features = FeatureGenerator::new(seed, bounds).generate(args.features);
    log::info!("Simulating {} frames over {} synthetic features", args.ticks, features.len());

    let mut level = optimizer.lock().current_level();
    let mut transitions = Vec::new();
    let mut frames_per_level = BTreeMap::new();

    for tick in 0..args.ticks {
        let kept = optimizer
            .lock()
            .optimize_features(&features, args.zoom, Some(&bounds))
            .stats
            .optimized_count;
        *frames_per_level.entry(level).or_insert(0) += 1;

        let mut start = 0;
        while start < kept {
            let len = sim.render_chunk.min(kept - start);
            let cost = Duration::from_micros(len as u64 * sim.render_cost_us);
            let clock = clock.clone();
            scheduler.enqueue(
                move || {
                    clock.advance(cost);
                    Ok(())
                },
                RenderPriority::Normal,
            );
            start += len;
        }

        clock.advance_ms(sim.frame_ms);
        frames.fire();

        let current = optimizer.lock().current_level();
        if current != level {
            let at_ms = clock.now().as_millis() as u64;
            log::info!("Frame {}: {} -> {} at {} ms", tick, level, current, at_ms);
            transitions.push(Transition {
                tick,
                at_ms,
                from: level,
                to: current,
            });
            level = current;
        }
    }

    let performance = optimizer.lock().performance_stats();
    optimizer.lock().destroy();

    Ok(SimulationReport {
        features: args.features,
        ticks: args.ticks,
        seed,
        transitions,
        frames_per_level,
        final_level: level,
        performance,
    })
}

pub fn execute(config: &Config, args: SimulateArgs) -> Result<()> {
    let report = run_simulation(config, &args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Simulated {} frames, {} features (seed {})", report.ticks, report.features, report.seed);
    println!("Final level: {}", report.final_level);
    if report.transitions.is_empty() {
        println!("No level changes");
    } else {
        println!("Level changes:");
        for t in &report.transitions {
            println!("  frame {:>5} ({:>7} ms): {} -> {}", t.tick, t.at_ms, t.from, t.to);
        }
    }
    println!("Frames per level:");
    for (level, frames) in &report.frames_per_level {
        println!("  {:<8} {}", level.name(), frames);
    }
    let perf = &report.performance;
    println!(
        "Average fps {:.1}, render time {:.2} ms, memory {:.2}, {} tasks still queued",
        perf.average_fps, perf.average_render_time_ms, perf.memory_usage, perf.render_queue_size
    );
    Ok(())
}
