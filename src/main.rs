//! rde_wave_tracker - command line runner for the detonation front analysis.
//!
//! `analyze` reads a recorded case, `demo` runs the labelled synthetic
//! demonstration, and `request` answers a JSON tool request. Logs go to stderr so
//! stdout carries only the JSON result or the markdown summary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rde_wave_tracker::config::AnalysisConfig;
use rde_wave_tracker::core_modules::case_reader::FoamCase;
use rde_wave_tracker::core_modules::geometry::DomainKind;
use rde_wave_tracker::core_modules::synthetic::SyntheticConfig;
use rde_wave_tracker::pipeline::{AnalysisResult, CancelHandle, analyze, analyze_synthetic};
use rde_wave_tracker::report::summarize;
use rde_wave_tracker::tool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rde_wave_tracker")]
#[command(about = "Detect, track and classify detonation fronts in annular combustor snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse a recorded simulation case directory
    Analyze {
        /// Case directory containing system/controlDict and time directories
        case: PathBuf,

        /// JSON configuration file; missing keys keep their defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the JSON result here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Analyse at most this many steps
        #[arg(long)]
        max_steps: Option<usize>,

        /// Stop after this many milliseconds and keep the completed steps
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print only the markdown summary
        #[arg(long)]
        summary_only: bool,
    },

    /// Run the synthetic rotating-front demonstration (not simulation data)
    Demo {
        /// Number of fronts
        #[arg(long, default_value = "2")]
        fronts: usize,

        /// Number of snapshots to generate
        #[arg(long, default_value = "60")]
        steps: usize,

        /// Alternate the rotation direction so fronts collide
        #[arg(long)]
        counter_rotating: bool,

        /// Axial cells; more than one analyses a 3D cylinder
        #[arg(long, default_value = "1")]
        axial_cells: usize,
    },

    /// Answer a JSON analysis request read from a file
    Request {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rde_wave_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Analyze { case, config, output, max_steps, timeout_ms, summary_only } => {
            let mut config = match config {
                Some(path) => AnalysisConfig::from_json_file(&path)?,
                None => AnalysisConfig::default(),
            };
            if max_steps.is_some() {
                config.budget.max_steps = max_steps;
            }
            if timeout_ms.is_some() {
                config.budget.wall_clock_ms = timeout_ms;
            }
            config.validate()?;

            let source = FoamCase::open(&case)?;
            let cancel = CancelHandle::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, finishing with the steps completed so far");
                    on_interrupt.cancel();
                }
            });

            let result = analyze(Arc::new(source), &config, &cancel).await?;
            emit(&result, output, summary_only)
        }
        Command::Demo { fronts, steps, counter_rotating, axial_cells } => {
            let synthetic = SyntheticConfig {
                front_count: fronts,
                steps,
                counter_rotating,
                axial_cells,
                ..SyntheticConfig::default()
            };
            let mut config = AnalysisConfig::demonstration();
            if synthetic.is_axial() {
                config.domain = DomainKind::Cylindrical3d;
            }
            let result = analyze_synthetic(synthetic, &config).await?;
            emit(&result, None, true)
        }
        Command::Request { file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read request {}", file.display()))?;
            println!("{}", tool::handle_json(&body).await);
            Ok(())
        }
    }
}

fn emit(result: &AnalysisResult, output: Option<PathBuf>, summary_only: bool) -> Result<()> {
    let summary = summarize(result);
    if summary_only {
        println!("{summary}");
        return Ok(());
    }

    let json = serde_json::to_string_pretty(result).context("cannot encode analysis result")?;
    match output {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
            info!(path = %path.display(), "result written");
            println!("{summary}");
        }
        None => println!("{json}"),
    }
    Ok(())
}
