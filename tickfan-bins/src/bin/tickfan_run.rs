//! Tick fan-out pipeline runner
//!
//! Runs the full pipeline:
//! - Seeded tick source → priority splitter → fair arbiter
//! - Broadcast to FAST / MEDIUM / SLOW engines under supervision
//! - Ctrl-C stops the source; engines drain, then the report is printed

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tickfan_bins::common::{build_config, init_logging, print_report, CommonArgs};
use tickfan_core::monitoring::{NoopObserver, TickObserver, TracingObserver};
use tickfan_core::pipeline::Pipeline;
use tickfan_core::resilience::install_panic_handler;

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = CommonArgs::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    // Engine panics are caught and restarted; the hook only logs them
    install_panic_handler();

    let config = build_config(&args)?;
    tracing::info!("=== Tickfan: {} ===", args.profile);
    tracing::info!(
        "Engines: {:?}, deadline {}ms, seed {}",
        config.engines.speeds,
        config.deadline_ms,
        config.seed
    );

    let observer: Arc<dyn TickObserver> = if args.quiet {
        Arc::new(NoopObserver)
    } else {
        Arc::new(TracingObserver)
    };
    let pipeline = Pipeline::new(config)?.with_observer(observer);

    // Ctrl-C requests a graceful stop
    let stop = pipeline.stop_handle();
    ctrlc::set_handler(move || {
        tracing::warn!("Received Ctrl-C, stopping source");
        stop.stop();
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tickfan-worker")
        .build()?;

    let report = runtime.block_on(pipeline.run())?;

    print_report(&report, args.json_report)?;
    Ok(())
}
