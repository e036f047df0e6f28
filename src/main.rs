// src/main.rs - encoder-sim command line front end
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use encoder_sim::config::{self, Config};
use encoder_sim::engine::Engine;
use encoder_sim::export;
use encoder_sim::simulator::clock::SimClock;
use encoder_sim::simulator::{SessionHistory, Simulation};

/// Encoder-driven linear stage simulator
#[derive(Parser, Debug)]
#[command(name = "encoder-sim", about = "Simulate a linear stage with backlash and closed-loop correction.")]
struct Cli {
    /// Path to a TOML config file (defaults to the reference setup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run in real time until the duration elapses or Ctrl-C
    Run(RunArgs),
    /// Run in simulated time, as fast as possible
    Batch(RunArgs),
    /// Print the reference configuration as TOML
    DefaultConfig,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Seconds to run (real or simulated); unbounded for `run` when omitted
    #[arg(short, long, value_parser = parse_seconds)]
    duration: Option<Duration>,

    /// Seed for step and backlash draws
    #[arg(long)]
    seed: Option<u64>,

    /// Write the sample table as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write samples as JSON lines
    #[arg(long)]
    jsonl: Option<PathBuf>,

    /// Write reached/correction events as CSV
    #[arg(long)]
    events_csv: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_string_lossy();
            tracing::info!("Loading configuration from: {}", path);
            config::load_config(&path).map_err(|e| {
                tracing::error!("Failed to load config from '{}': {}", path, e);
                e
            })?
        }
        None => Config::default(),
    };

    match cli.command {
        Commands::DefaultConfig => {
            print!("{}", Config::default().to_toml_string()?);
        }
        Commands::Run(args) => {
            apply_overrides(&mut config, &args);
            let history = run_realtime(config, args.duration).await?;
            write_exports(&args, &history)?;
        }
        Commands::Batch(args) => {
            apply_overrides(&mut config, &args);
            let duration = args.duration.unwrap_or(Duration::from_secs(60));
            let history = run_batch(config, duration)?;
            write_exports(&args, &history)?;
        }
    }
    Ok(())
}

/// Parse a non-negative, finite number of seconds.
fn parse_seconds(arg: &str) -> Result<Duration, String> {
    let secs: f64 = arg.parse().map_err(|e| format!("invalid number of seconds: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {secs}: {e}"))
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if args.seed.is_some() {
        config.simulation.seed = args.seed;
    }
}

async fn run_realtime(
    config: Config,
    duration: Option<Duration>,
) -> Result<SessionHistory, Box<dyn std::error::Error + Send + Sync + 'static>> {
    log_config(&config);
    let mut engine = Engine::new(config)?;

    let _sample_log = engine.on_sample(|sample| {
        tracing::info!(
            "t={:.2}s pos={:.2} mm vel={:.2} mm/s err={:.2} mm{}",
            sample.elapsed_time,
            sample.position,
            sample.velocity,
            sample.absolute_error,
            if sample.correction_flag {
                format!(" corr={:+.3} mm", sample.correction_magnitude)
            } else {
                String::new()
            }
        );
        Ok(())
    });
    let _event_log = engine.on_event(|event| {
        tracing::info!("{:?} at {:.2}s ({:.2} mm)", event.kind, event.elapsed_time, event.value);
        Ok(())
    });

    engine.start()?;
    match duration {
        Some(limit) => {
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupted");
        }
    }

    let report = engine.shutdown().await?;
    tracing::info!(
        "Stopped after {} ticks: position {:.2} mm, cumulative {:.2} mm, {} corrections",
        report.ticks,
        report.state.position,
        report.state.cumulative_distance,
        report.state.correction_count
    );
    Ok(report.history)
}

fn run_batch(
    config: Config,
    duration: Duration,
) -> Result<SessionHistory, Box<dyn std::error::Error + Send + Sync + 'static>> {
    log_config(&config);
    let mut simulation = Simulation::new(config)?;
    let mut clock = SimClock::new();
    let ticks = simulation.run_batch(&mut clock, duration, |tick, _| {
        if let Some(sample) = tick.sample() {
            tracing::debug!(
                "t={:.2}s pos={:.2} mm err={:.2} mm",
                sample.elapsed_time,
                sample.position,
                sample.absolute_error
            );
        }
    });
    let state = simulation.state();
    tracing::info!(
        "Simulated {:.1}s in {} ticks: position {:.2} mm, cumulative {:.2} mm, {} corrections",
        duration.as_secs_f64(),
        ticks,
        state.position,
        state.cumulative_distance,
        state.correction_count
    );
    let (_, history) = simulation.into_parts();
    Ok(history)
}

fn log_config(config: &Config) {
    let sim = &config.simulation;
    tracing::info!(
        "Interval {}s, session {}, {} PPR, backlash {}, correction {}",
        sim.sampling_interval,
        if sim.is_bounded() {
            format!("{}s", sim.session_duration)
        } else {
            "unbounded".to_string()
        },
        sim.pulses_per_revolution,
        if sim.backlash_enabled { "on" } else { "off" },
        if sim.correction_enabled { "on" } else { "off" }
    );
    tracing::info!("Waypoints: {:?}", config.waypoints.targets());
}

fn write_exports(args: &RunArgs, history: &SessionHistory) -> Result<(), export::ExportError> {
    let exports: [(&Option<PathBuf>, fn(&Path, &SessionHistory) -> Result<(), export::ExportError>); 3] = [
        (&args.csv, export::export_samples_csv),
        (&args.jsonl, export::export_samples_jsonl),
        (&args.events_csv, export::export_events_csv),
    ];
    for (path, write) in exports {
        if let Some(path) = path {
            write(path, history)?;
        }
    }
    Ok(())
}
