//! Common utilities for the runner binaries
//!
//! Shared CLI parsing, logging setup, config assembly and report output.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tickfan_core::config::PipelineConfig;
use tickfan_core::core::EngineSpeed;
use tickfan_core::pipeline::PipelineReport;
use tickfan_core::utils::init_logger;

/// Common CLI arguments for all binaries
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// JSON config file (overrides the profile)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Named profile: demo, burst or chaos
    #[arg(short, long, default_value = "demo")]
    pub profile: String,

    /// Run deadline in milliseconds
    #[arg(short, long)]
    pub deadline_ms: Option<u64>,

    /// RNG seed
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Capacity of each priority lane
    #[arg(long)]
    pub priority_capacity: Option<usize>,

    /// Capacity of each engine's broadcast buffer
    #[arg(long)]
    pub broadcast_capacity: Option<usize>,

    /// Stop the source after this many ticks
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Engines to run, comma separated (fast,medium,slow)
    #[arg(long, value_delimiter = ',')]
    pub speeds: Vec<String>,

    /// Do not log every processed tick
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json_report: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

/// Initialize tracing/logging through the core logger
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    init_logger(level, json).context("Failed to install tracing subscriber")
}

/// Profile or file, then CLI overrides, then validation
pub fn build_config(args: &CommonArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::from_profile(&args.profile)?,
    };

    if let Some(deadline_ms) = args.deadline_ms {
        config.deadline_ms = deadline_ms;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(capacity) = args.priority_capacity {
        config.queues.priority_capacity = capacity;
    }
    if let Some(capacity) = args.broadcast_capacity {
        config.queues.broadcast_capacity = capacity;
    }
    if args.max_ticks.is_some() {
        config.source.max_ticks = args.max_ticks;
    }
    if !args.speeds.is_empty() {
        config.engines.speeds = parse_speeds(&args.speeds)?;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn parse_speeds(names: &[String]) -> Result<Vec<EngineSpeed>> {
    names
        .iter()
        .map(|name| match EngineSpeed::parse(name.trim()) {
            Some(speed) => Ok(speed),
            None => bail!("Unknown engine speed '{}' (expected fast, medium or slow)", name),
        })
        .collect()
}

/// Print the final report
pub fn print_report(report: &PipelineReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{report}");
    for engine in &report.engines {
        println!(
            "  {:<6} processed={} replayed={} filtered={} dropped={} restarts={} buffered={} state={:?}",
            engine.speed.as_str(),
            engine.processed,
            engine.replayed,
            engine.filtered,
            engine.dropped,
            engine.restarts,
            engine.buffered_at_shutdown,
            engine.final_state
        );
    }
    Ok(())
}
