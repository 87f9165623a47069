//! Optimize command - cull and sample a GeoJSON layer for one viewport

use anyhow::{Context, Result};
use mapopt_core::{BoundingBox, FeatureCollection};
use mapopt_render::{OptimizationStats, QualityLevel, RenderOptimizer};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::CliError;

pub struct OptimizeArgs {
    pub input: PathBuf,
    pub zoom: f64,
    pub bounds: Option<String>,
    pub level: Option<QualityLevel>,
    pub output: Option<PathBuf>,
    pub pretty: bool,
}

#[derive(Debug, Serialize)]
struct OptimizeReport {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    zoom: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundingBox>,
    stats: OptimizationStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated_at: Option<String>,
}

pub fn execute(config: &Config, args: OptimizeArgs) -> Result<()> {
    log::info!("Optimizing {}", args.input.display());

    if !args.input.exists() {
        return Err(CliError::file_not_found(args.input).into());
    }
    if !args.zoom.is_finite() {
        return Err(CliError::invalid_argument("--zoom", format!("{} is not a finite zoom", args.zoom)).into());
    }

    let bounds = args
        .bounds
        .as_deref()
        .map(str::parse::<BoundingBox>)
        .transpose()
        .map_err(CliError::from)?;

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input file: {}", args.input.display()))?;
    let collection = FeatureCollection::from_json(&content)
        .map_err(|err| CliError::invalid_input(args.input.display().to_string(), err.to_string()))?;
    log::info!("Loaded {} features", collection.len());

    let mut optimizer_config = config.optimizer.clone();
    // Offline runs have no telemetry; the level comes from the zoom or --level
    optimizer_config.adaptive.enabled = args.level.is_some();
    if let Some(level) = args.level {
        optimizer_config.adaptive.initial_level = level;
    }
    let mut optimizer = RenderOptimizer::new(optimizer_config).map_err(CliError::from)?;

    let result = optimizer.optimize_features(&collection.features, args.zoom, bounds.as_ref());
    log::info!(
        "Kept {} of {} features at {} ({} culled)",
        result.stats.optimized_count,
        result.stats.original_count,
        result.stats.lod_level,
        result.stats.culled_count
    );

    if let Some(output) = &args.output {
        let optimized = FeatureCollection::new(result.optimized_features);
        let json = optimized.to_json().map_err(CliError::from)?;
        std::fs::write(output, json)
            .with_context(|| format!("Failed to write output file: {}", output.display()))?;
        log::info!("Wrote {}", output.display());
    }

    let report = OptimizeReport {
        input: args.input.display().to_string(),
        output: args.output.as_ref().map(|p| p.display().to_string()),
        zoom: args.zoom,
        bounds,
        stats: result.stats,
        generated_at: (!config.general.deterministic).then(|| chrono::Utc::now().to_rfc3339()),
    };
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize statistics")?;
    println!("{}", rendered);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapopt_core::Feature;
    use tempfile::tempdir;

    fn write_layer(dir: &std::path::Path, n: usize) -> PathBuf {
        let features: Vec<Feature> = (0..n)
            .map(|i| Feature::point(-0.2 + (i % 40) as f64 * 0.005, 51.45 + (i / 40) as f64 * 0.005).with_id(i as u64))
            .collect();
        let path = dir.join("layer.geojson");
        std::fs::write(&path, FeatureCollection::new(features).to_json().unwrap()).unwrap();
        path
    }

    #[test]
    fn test_optimize_writes_reduced_layer() -> Result<()> {
        let dir = tempdir()?;
        let input = write_layer(dir.path(), 1200);
        let output = dir.path().join("out.geojson");

        execute(
            &Config::default(),
            OptimizeArgs {
                input,
                zoom: 4.0,
                bounds: None,
                level: None,
                output: Some(output.clone()),
                pretty: false,
            },
        )?;

        let written = FeatureCollection::from_json(&std::fs::read_to_string(&output)?)?;
        assert_eq!(written.len(), 100);
        Ok(())
    }

    #[test]
    fn test_missing_input_is_reported() {
        let err = execute(
            &Config::default(),
            OptimizeArgs {
                input: PathBuf::from("/nonexistent/layer.geojson"),
                zoom: 12.0,
                bounds: None,
                level: None,
                output: None,
                pretty: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::FileNotFound { .. })));
    }

    #[test]
    fn test_bad_bounds_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let input = write_layer(dir.path(), 10);
        let err = execute(
            &Config::default(),
            OptimizeArgs {
                input,
                zoom: 12.0,
                bounds: Some("51.4,51.6,0.1".into()),
                level: None,
                output: None,
                pretty: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Core(_))));
        Ok(())
    }
}
