use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod config;
mod error;
mod synth;

use config::Config;
use error::{format_error_with_suggestions, CliError};
use mapopt_render::QualityLevel;

#[derive(Parser)]
#[command(name = "mapopt")]
#[command(about = "MapOpt - adaptive rendering optimisation for dense map layers")]
#[command(version)]
#[command(long_about = "
MapOpt culls and samples dense GeoJSON feature layers to a frame-rate aware
budget, and simulates the adaptive quality loop against scripted telemetry.

Examples:
  mapopt optimize --input sensors.geojson --zoom 13 --bounds 51.6,51.4,0.1,-0.3
  mapopt optimize --input sensors.geojson --zoom 9 --output reduced.geojson
  mapopt simulate --features 20000 --ticks 300 --fps 60x30,25x120,60
  mapopt config --example > mapopt.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads used for parallel culling
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cull and sample a GeoJSON layer for one viewport
    Optimize {
        /// Input GeoJSON (FeatureCollection, Feature or array of Features)
        #[arg(short, long)]
        input: PathBuf,

        /// Map zoom used to pick the quality level
        #[arg(short, long)]
        zoom: f64,

        /// Viewport as north,south,east,west
        #[arg(long)]
        bounds: Option<String>,

        /// Use this level instead of the zoom mapping
        #[arg(long)]
        level: Option<LevelArg>,

        /// Write the optimised collection here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the statistics
        #[arg(long)]
        pretty: bool,
    },

    /// Run the adaptive loop on a synthetic clock against an fps trace
    Simulate {
        /// Number of synthetic features
        #[arg(long, default_value = "10000")]
        features: usize,

        /// Frames to simulate
        #[arg(long, default_value = "240")]
        ticks: usize,

        /// Comma-separated fps trace; `VALUExN` repeats a value N times.
        /// The last value holds once the trace runs out.
        #[arg(long, default_value = "60")]
        fps: String,

        /// Constant memory usage ratio reported alongside the trace
        #[arg(long)]
        memory: Option<f64>,

        /// Map zoom handed to each optimisation pass
        #[arg(long, default_value = "14")]
        zoom: f64,

        /// Viewport as north,south,east,west
        #[arg(long, default_value = "51.6,51.4,0.1,-0.3")]
        bounds: String,

        /// Generator seed (overrides the configuration)
        #[arg(long)]
        seed: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the example or effective configuration
    Config {
        /// Print an annotated example configuration
        #[arg(long, conflicts_with = "show")]
        example: bool,

        /// Print the configuration after loading files and defaults
        #[arg(long)]
        show: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LevelArg {
    Ultra,
    High,
    Medium,
    Low,
    Minimal,
}

impl From<LevelArg> for QualityLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Ultra => QualityLevel::Ultra,
            LevelArg::High => QualityLevel::High,
            LevelArg::Medium => QualityLevel::Medium,
            LevelArg::Low => QualityLevel::Low,
            LevelArg::Minimal => QualityLevel::Minimal,
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(threads) = cli.threads {
        config.general.threads = Some(threads);
    }

    if let Some(threads) = config.general.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to set thread count")?;
    }

    match cli.command {
        Commands::Optimize {
            input,
            zoom,
            bounds,
            level,
            output,
            pretty,
        } => commands::optimize::execute(
            &config,
            commands::optimize::OptimizeArgs {
                input,
                zoom,
                bounds,
                level: level.map(QualityLevel::from),
                output,
                pretty,
            },
        ),

        Commands::Simulate {
            features,
            ticks,
            fps,
            memory,
            zoom,
            bounds,
            seed,
            json,
        } => commands::simulate::execute(
            &config,
            commands::simulate::SimulateArgs {
                features,
                ticks,
                fps,
                memory,
                zoom,
                bounds,
                seed,
                json,
            },
        ),

        Commands::Config { example, show, output } => commands::config::execute(&config, example, show, output),
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    if let Err(err) = run(cli) {
        match err.downcast_ref::<CliError>() {
            Some(cli_err) => eprintln!("Error: {}", format_error_with_suggestions(cli_err)),
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}
