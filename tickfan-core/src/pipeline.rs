//! Pipeline orchestrator
//!
//! Wires every stage together and owns the cancellation tree:
//!
//! ```text
//!   abort (root: upstream failure)
//!     ├── shutdown  ── stops the source (deadline or StopHandle)
//!     └── halt      ── stops the engines (after drain grace + stream close)
//!
//!   source ─mpsc─► splitter ─► [high|low] ─► arbiter ─► stream ─► engines
//!                                                                 (supervised)
//! ```
//!
//! Shutdown cascades downstream: the source stops, the splitter closes both
//! lanes, the arbiter drains them and closes the stream, engines drain their
//! buffers until `halt`. An upstream failure cancels `abort` and is returned
//! once every task has finished.

use crate::config::PipelineConfig;
use crate::core::{ConfigError, EngineSpeed, PipelineError, Stage, Tick};
use crate::data::TickSource;
use crate::engine::{EngineReport, EngineSupervisor, SupervisorSettings};
use crate::monitoring::{TickObserver, TracingObserver};
use crate::perf::{MetricsSnapshot, PipelineMetrics};
use crate::queue::{BroadcastStream, DropOldestQueue};
use crate::router::{FairArbiter, PrioritySplitter};
use crate::utils::seed::{derive_seed, ARBITER_STREAM, SOURCE_STREAM};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Why the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The source reached `max_ticks` and everything drained
    SourceExhausted,
    /// The run deadline elapsed
    Deadline,
    /// A `StopHandle` requested shutdown
    Stopped,
}

/// Final, consistent view of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub metrics: MetricsSnapshot,
    /// Ticks emitted by the source
    pub generated: u64,
    /// Ticks the arbiter published to the stream
    pub published: u64,
    /// Original deliveries left in engine buffers at shutdown
    pub buffered_at_shutdown: u64,
    pub engines: Vec<EngineReport>,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn engine(&self, speed: EngineSpeed) -> Option<&EngineReport> {
        self.engines.iter().find(|r| r.speed == speed)
    }

    /// Replayed copies processed across all engines
    pub fn replayed(&self) -> u64 {
        self.engines.iter().map(|r| r.replayed).sum()
    }
}

impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Processed: {}  Restarted: {}  Dropped: {}",
            self.metrics.processed, self.metrics.restarted, self.metrics.dropped
        )?;
        write!(
            f,
            "Generated: {}  Published: {}  Buffered at shutdown: {}  Stop: {:?}  Elapsed: {:.3}s",
            self.generated,
            self.published,
            self.buffered_at_shutdown,
            self.stop_reason,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Requests a graceful stop from outside the pipeline
#[derive(Debug, Clone)]
pub struct StopHandle {
    shutdown: CancellationToken,
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// Stop the source; engines drain and halt as on deadline
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
    observer: Arc<dyn TickObserver>,
    abort: CancellationToken,
    shutdown: CancellationToken,
    halt: CancellationToken,
    stop_requested: Arc<AtomicBool>,
}

impl Pipeline {
    /// Validate `config` and prepare a run
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let abort = CancellationToken::new();
        Ok(Self {
            config,
            metrics: Arc::new(PipelineMetrics::new()),
            observer: Arc::new(TracingObserver),
            shutdown: abort.child_token(),
            halt: abort.child_token(),
            abort,
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the default (tracing) observation sink
    pub fn with_observer(mut self, observer: Arc<dyn TickObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shutdown: self.shutdown.clone(),
            requested: Arc::clone(&self.stop_requested),
        }
    }

    /// Live counters (readable while the pipeline runs)
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run to completion
    pub async fn run(self) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let cfg = &self.config;
        info!(
            seed = cfg.seed,
            deadline_ms = cfg.deadline_ms,
            engines = ?cfg.engines.speeds,
            priority_capacity = cfg.queues.priority_capacity,
            broadcast_capacity = cfg.queues.broadcast_capacity,
            "Pipeline starting"
        );

        let high = Arc::new(DropOldestQueue::<Tick>::new(cfg.queues.priority_capacity));
        let low = Arc::new(DropOldestQueue::<Tick>::new(cfg.queues.priority_capacity));
        let stream = BroadcastStream::<Tick>::new(cfg.queues.broadcast_capacity);

        let supervisor = EngineSupervisor::new(
            stream.clone(),
            SupervisorSettings::from_config(&cfg.engines, cfg.seed),
            Arc::clone(&self.metrics),
            Arc::clone(&self.observer),
        );
        // every engine is subscribed before the first publish
        let supervised = supervisor.attach(&cfg.engines.speeds)?;

        let (tx, rx) = mpsc::channel::<Tick>(1);
        let source = tokio::spawn(
            TickSource::new(&cfg.source, derive_seed(cfg.seed, SOURCE_STREAM))
                .run(tx, self.shutdown.clone()),
        );
        let splitter = tokio::spawn(
            PrioritySplitter::new(Arc::clone(&high), Arc::clone(&low), Arc::clone(&self.metrics))
                .run(rx, self.abort.clone()),
        );
        let arbiter = tokio::spawn(
            FairArbiter::new(
                Arc::clone(&high),
                Arc::clone(&low),
                stream.clone(),
                Arc::clone(&self.metrics),
                derive_seed(cfg.seed, ARBITER_STREAM),
            )
            .run(self.abort.clone()),
        );

        let done = CancellationToken::new();
        let watcher = tokio::spawn(watch_deadline(
            Watch {
                deadline: cfg.deadline(),
                drain_grace: cfg.drain_grace(),
                stream: stream.clone(),
                shutdown: self.shutdown.clone(),
                halt: self.halt.clone(),
                abort: self.abort.clone(),
                done: done.clone(),
                stop_requested: Arc::clone(&self.stop_requested),
            },
        ));
        let engines = tokio::spawn(supervised.run(self.halt.clone()));

        let (source, splitter, arbiter, engines) = tokio::join!(
            settle(Stage::Source, source, &self.abort),
            settle(Stage::Splitter, splitter, &self.abort),
            settle(Stage::Arbiter, arbiter, &self.abort),
            async {
                engines
                    .await
                    .map_err(|e| PipelineError::TaskAborted {
                        stage: Stage::Supervisor,
                        source: e,
                    })
            },
        );

        done.cancel();
        let triggered = watcher.await.ok().flatten();

        let source = source?;
        splitter?;
        let arbiter = arbiter?;
        let engines = engines?;

        let stop_reason = match triggered {
            Some(reason) => reason,
            None if source.exhausted => StopReason::SourceExhausted,
            None => StopReason::Stopped,
        };

        let report = PipelineReport {
            metrics: self.metrics.snapshot(),
            generated: source.generated,
            published: arbiter.published,
            buffered_at_shutdown: engines.buffered_at_shutdown(),
            engines: engines.engines,
            stop_reason,
            elapsed: started.elapsed(),
        };
        info!(
            processed = report.metrics.processed,
            dropped = report.metrics.dropped,
            restarted = report.metrics.restarted,
            generated = report.generated,
            reason = ?report.stop_reason,
            "Pipeline finished"
        );
        Ok(report)
    }
}

/// Await an upstream stage, cancelling the whole pipeline if it failed
async fn settle<T>(
    stage: Stage,
    handle: JoinHandle<Result<T, PipelineError>>,
    abort: &CancellationToken,
) -> Result<T, PipelineError> {
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(PipelineError::TaskAborted { stage, source: e }),
    };
    if let Err(e) = &result {
        error!(stage = %stage, error = %e, "Upstream stage failed, aborting pipeline");
        abort.cancel();
    }
    result
}

struct Watch {
    deadline: Duration,
    drain_grace: Duration,
    stream: BroadcastStream<Tick>,
    shutdown: CancellationToken,
    halt: CancellationToken,
    abort: CancellationToken,
    done: CancellationToken,
    stop_requested: Arc<AtomicBool>,
}

/// Turn the deadline (or an explicit stop) into shutdown, then halt
///
/// Returns what triggered the shutdown, or `None` if the run finished first.
async fn watch_deadline(w: Watch) -> Option<StopReason> {
    let reason = tokio::select! {
        biased;
        _ = w.done.cancelled() => return None,
        _ = w.abort.cancelled() => return None,
        _ = w.shutdown.cancelled() => StopReason::Stopped,
        _ = tokio::time::sleep(w.deadline) => StopReason::Deadline,
    };
    // a stop racing the deadline still counts as a stop
    let reason = if w.stop_requested.load(Ordering::SeqCst) {
        StopReason::Stopped
    } else {
        reason
    };

    info!(reason = ?reason, grace_ms = w.drain_grace.as_millis() as u64, "Stopping source");
    w.shutdown.cancel();

    tokio::select! {
        biased;
        _ = w.done.cancelled() => return Some(reason),
        _ = w.abort.cancelled() => return Some(reason),
        _ = tokio::time::sleep(w.drain_grace) => {}
    }
    tokio::select! {
        biased;
        _ = w.done.cancelled() => return Some(reason),
        _ = w.abort.cancelled() => return Some(reason),
        _ = w.stream.closed() => {}
    }

    info!("Halting engines");
    w.halt.cancel();
    Some(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::NoopObserver;

    fn quick_config() -> PipelineConfig {
        let mut config = PipelineConfig {
            seed: 5,
            deadline_ms: 60_000,
            drain_grace_ms: 0,
            ..PipelineConfig::default()
        };
        config.source.max_ticks = Some(20);
        config.engines.speeds = vec![EngineSpeed::Slow];
        config.engines.slow = crate::config::SpeedProfile::latency(0, 0);
        config
    }

    #[test]
    fn test_new_validates() {
        let mut config = quick_config();
        config.queues.priority_capacity = 0;
        assert!(Pipeline::new(config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_source_finishes_cleanly() {
        let pipeline = Pipeline::new(quick_config())
            .unwrap()
            .with_observer(Arc::new(NoopObserver));
        let report = pipeline.run().await.unwrap();
        assert_eq!(report.stop_reason, StopReason::SourceExhausted);
        assert_eq!(report.generated, 20);
        assert_eq!(report.metrics.processed, 20);
        assert_eq!(report.metrics.dropped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_handle_stops_run() {
        let mut config = quick_config();
        config.source.max_ticks = None;
        let pipeline = Pipeline::new(config)
            .unwrap()
            .with_observer(Arc::new(NoopObserver));
        let stop = pipeline.stop_handle();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.stop_reason, StopReason::Stopped);
        assert!(stop.is_stopped());
        assert!(report.generated > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_run() {
        let mut config = quick_config();
        config.source.max_ticks = None;
        config.deadline_ms = 100;
        let report = Pipeline::new(config)
            .unwrap()
            .with_observer(Arc::new(NoopObserver))
            .run()
            .await
            .unwrap();
        assert_eq!(report.stop_reason, StopReason::Deadline);
        assert!(report.elapsed >= Duration::from_millis(100));
    }

    #[test]
    fn test_report_display_has_counters() {
        let report = PipelineReport {
            metrics: MetricsSnapshot {
                processed: 10,
                dropped: 2,
                restarted: 1,
            },
            generated: 12,
            published: 12,
            buffered_at_shutdown: 0,
            engines: Vec::new(),
            stop_reason: StopReason::Deadline,
            elapsed: Duration::from_millis(1500),
        };
        let text = report.to_string();
        assert!(text.starts_with("Processed: 10  Restarted: 1  Dropped: 2"));
        assert!(text.contains("Stop: Deadline"));
    }
}
