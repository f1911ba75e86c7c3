//! Engine Supervisor
//!
//! Owns one child task per speed tier and reacts to each child's result in
//! isolation: a fault in one engine never cancels, delays or restarts any
//! other.
//!
//! ```text
//!                   ┌──────────── JoinSet ────────────┐
//!   attach() ──►    │ child(FAST)  child(MEDIUM)  child(SLOW) │
//!                   └───────┬─────────────────────────┘
//!                           │ EngineRun
//!                           ▼
//!                  ┌─────────────────┐   Ok(exit)   ──► unsubscribe, Stopped
//!                  │  supervise loop │   Err(fault) ──► Crashed → Restarting
//!                  └─────────────────┘                  resubscribe (replay)
//!                                                       relaunch → Running
//! ```
//!
//! Children are observed through their join results. An engine catches its
//! own panics and still returns its subscription, so a panic is handled
//! exactly like an injected fault: same resubscribe, same loss accounting.
//!
//! ## Loss accounting
//!
//! On a restart the tick in flight (if it was an original delivery) and the
//! original deliveries left in the torn-down buffer are added to `dropped`.
//! Anything still buffered when an engine stops normally is reported as
//! `buffered_at_shutdown` instead.

use super::worker::{Engine, EngineCounters, EngineExit, EngineProfile, EngineRun, TickFilter};
use crate::config::EngineConfig;
use crate::core::{ConfigError, EngineFault, EngineLifecycle, EngineSpeed, EngineState, Tick};
use crate::monitoring::TickObserver;
use crate::perf::PipelineMetrics;
use crate::queue::{BroadcastStream, Resubscribed, Subscription};
use crate::resilience::{RestartBudget, RestartDecision, RestartPolicy};
use crate::utils::seed::{derive_seed, BACKOFF_STREAM, ENGINE_STREAM};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Static engine parameters used for every (re)launch
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub medium_symbol: String,
    pub fast: EngineProfile,
    pub medium: EngineProfile,
    pub slow: EngineProfile,
    pub restart: RestartPolicy,
    pub seed: u64,
}

impl SupervisorSettings {
    pub fn from_config(config: &EngineConfig, seed: u64) -> Self {
        Self {
            medium_symbol: config.medium_symbol.clone(),
            fast: EngineProfile::from(&config.fast),
            medium: EngineProfile::from(&config.medium),
            slow: EngineProfile::from(&config.slow),
            restart: config.restart.to_policy(),
            seed,
        }
    }

    pub fn profile(&self, speed: EngineSpeed) -> &EngineProfile {
        match speed {
            EngineSpeed::Fast => &self.fast,
            EngineSpeed::Medium => &self.medium,
            EngineSpeed::Slow => &self.slow,
        }
    }
}

/// Final accounting for one engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineReport {
    pub speed: EngineSpeed,
    /// Ticks completed, replayed copies included
    pub processed: u64,
    /// Of `processed`, replayed copies
    pub replayed: u64,
    /// Deliveries rejected by the engine's filter
    pub filtered: u64,
    /// Ticks lost to this engine's faults (in-flight and discarded buffer)
    pub dropped: u64,
    pub restarts: u32,
    /// Original deliveries still buffered when the engine stopped
    pub buffered_at_shutdown: u64,
    pub history: Vec<EngineState>,
    pub final_state: EngineState,
}

/// Reports for every supervised engine, in launch order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SupervisorReport {
    pub engines: Vec<EngineReport>,
}

impl SupervisorReport {
    pub fn engine(&self, speed: EngineSpeed) -> Option<&EngineReport> {
        self.engines.iter().find(|r| r.speed == speed)
    }

    /// Sum of `buffered_at_shutdown` over all engines
    pub fn buffered_at_shutdown(&self) -> u64 {
        self.engines.iter().map(|r| r.buffered_at_shutdown).sum()
    }

    pub fn all_stopped(&self) -> bool {
        self.engines
            .iter()
            .all(|r| r.final_state == EngineState::Stopped)
    }
}

/// Launches and restarts engines against one broadcast stream
#[derive(Clone)]
pub struct EngineSupervisor {
    stream: BroadcastStream<Tick>,
    settings: Arc<SupervisorSettings>,
    metrics: Arc<PipelineMetrics>,
    observer: Arc<dyn TickObserver>,
}

impl EngineSupervisor {
    pub fn new(
        stream: BroadcastStream<Tick>,
        settings: SupervisorSettings,
        metrics: Arc<PipelineMetrics>,
        observer: Arc<dyn TickObserver>,
    ) -> Self {
        Self {
            stream,
            settings: Arc::new(settings),
            metrics,
            observer,
        }
    }

    /// Subscribe every engine now, before anything is published
    pub fn attach(&self, speeds: &[EngineSpeed]) -> Result<Supervised, ConfigError> {
        if speeds.is_empty() {
            return Err(ConfigError::NoEngines);
        }
        let mut slots: Vec<Slot> = Vec::with_capacity(speeds.len());
        for &speed in speeds {
            if slots.iter().any(|s| s.speed() == speed) {
                return Err(ConfigError::DuplicateEngine(speed));
            }
            let subscription = self.stream.subscribe();
            let engine = self.build_engine(speed, 0, EngineCounters::default());
            let backoff_seed = derive_seed(self.settings.seed, BACKOFF_STREAM + speed.index());
            slots.push(Slot {
                lifecycle: EngineLifecycle::new(speed),
                budget: self.settings.restart.budget(backoff_seed),
                counters: EngineCounters::default(),
                dropped: 0,
                buffered_at_shutdown: 0,
                incarnation: 0,
                pending: Some((engine, subscription)),
            });
        }
        Ok(Supervised {
            supervisor: self.clone(),
            slots,
        })
    }

    /// Attach and supervise until every engine has stopped
    pub async fn start(
        &self,
        speeds: &[EngineSpeed],
        halt: CancellationToken,
    ) -> Result<SupervisorReport, ConfigError> {
        Ok(self.attach(speeds)?.run(halt).await)
    }

    fn build_engine(&self, speed: EngineSpeed, incarnation: u32, counters: EngineCounters) -> Engine {
        let stream = ENGINE_STREAM + speed.index() * 1_000_000 + incarnation as u64;
        Engine::new(
            speed,
            TickFilter::for_speed(speed, &self.settings.medium_symbol),
            self.settings.profile(speed).clone(),
            derive_seed(self.settings.seed, stream),
            Arc::clone(&self.metrics),
            Arc::clone(&self.observer),
        )
        .with_counters(counters)
    }
}

struct Slot {
    lifecycle: EngineLifecycle,
    budget: RestartBudget,
    /// Counters as of the last incarnation that returned
    counters: EngineCounters,
    dropped: u64,
    buffered_at_shutdown: u64,
    incarnation: u32,
    pending: Option<(Engine, Subscription<Tick>)>,
}


impl Slot {
    fn speed(&self) -> EngineSpeed {
        self.lifecycle.speed()
    }

    fn advance(&mut self, next: EngineState) {
        if let Err(e) = self.lifecycle.transition(next) {
            error!(error = %e, "Rejected engine state transition");
        }
    }

    fn report(&self) -> EngineReport {
        EngineReport {
            speed: self.speed(),
            processed: self.counters.processed,
            replayed: self.counters.replayed,
            filtered: self.counters.filtered,
            dropped: self.dropped,
            restarts: self.budget.used(),
            buffered_at_shutdown: self.buffered_at_shutdown,
            history: self.lifecycle.history().to_vec(),
            final_state: self.lifecycle.state(),
        }
    }
}

/// Engines attached to the stream, ready to run
pub struct Supervised {
    supervisor: EngineSupervisor,
    slots: Vec<Slot>,
}

impl Supervised {
    pub fn speeds(&self) -> Vec<EngineSpeed> {
        self.slots.iter().map(|s| s.speed()).collect()
    }

    /// Supervise until every engine has stopped
    ///
    /// Engines stop when the stream closes and their buffer drains, when
    /// `halt` fires, or when their restart budget runs out.
    pub async fn run(mut self, halt: CancellationToken) -> SupervisorReport {
        let mut children: JoinSet<EngineRun> = JoinSet::new();

        for slot in self.slots.iter_mut() {
            if let Some((engine, subscription)) = slot.pending.take() {
                slot.advance(EngineState::Running);
                info!(engine = %slot.speed(), "Engine started");
                children.spawn(child(engine, subscription, halt.clone(), Duration::ZERO));
            }
        }

        while let Some(joined) = children.join_next().await {
            let EngineRun {
                engine,
                subscription,
                outcome,
            } = match joined {
                Ok(run) => run,
                Err(e) => {
                    error!(error = %e, "Engine task aborted outside supervision");
                    continue;
                }
            };
            let speed = engine.speed();
            let Some(index) = self.slots.iter().position(|s| s.speed() == speed) else {
                continue;
            };
            self.slots[index].counters = engine.counters();

            match outcome {
                Ok(exit) => {
                    let slot = &mut self.slots[index];
                    slot.buffered_at_shutdown = self.supervisor.stream.unsubscribe(subscription) as u64;
                    slot.lifecycle.stop();
                    info!(
                        engine = %speed,
                        reason = ?exit,
                        processed = slot.counters.processed,
                        buffered = slot.buffered_at_shutdown,
                        "Engine stopped"
                    );
                }
                Err(fault) => {
                    if let Some(relaunch) = self.on_fault(index, fault, subscription, &halt) {
                        children.spawn(relaunch);
                    }
                }
            }
        }

        for slot in self.slots.iter_mut() {
            slot.lifecycle.stop();
        }
        SupervisorReport {
            engines: self.slots.iter().map(Slot::report).collect(),
        }
    }

    /// Record a fault and build the relaunched child, if any
    fn on_fault(
        &mut self,
        index: usize,
        fault: EngineFault,
        subscription: Subscription<Tick>,
        halt: &CancellationToken,
    ) -> Option<impl std::future::Future<Output = EngineRun>> {
        let supervisor = &self.supervisor;
        let slot = &mut self.slots[index];
        let speed = slot.speed();
        let lost = fault.lost_tick() as u64;
        let uptime = slot.lifecycle.time_in_state();
        slot.advance(EngineState::Crashed);

        let decision = if halt.is_cancelled() {
            None
        } else {
            Some(slot.budget.next())
        };

        let delay = match decision {
            Some(RestartDecision::Restart { delay }) => delay,
            Some(RestartDecision::GiveUp) | None => {
                let leftover = supervisor.stream.unsubscribe(subscription) as u64;
                if decision.is_some() {
                    // budget exhausted: nothing will ever drain the buffer
                    slot.dropped += lost + leftover;
                    supervisor.metrics.add_dropped(lost + leftover);
                    warn!(engine = %speed, error = %fault, restarts = slot.budget.used(), "Restart budget exhausted");
                } else {
                    slot.dropped += lost;
                    supervisor.metrics.add_dropped(lost);
                    slot.buffered_at_shutdown = leftover;
                    info!(engine = %speed, error = %fault, "Engine faulted during halt, not restarting");
                }
                slot.lifecycle.stop();
                return None;
            }
        };

        let Resubscribed {
            subscription,
            discarded,
        } = supervisor.stream.resubscribe(subscription);
        let discarded = discarded as u64;

        supervisor.metrics.inc_restarted();
        supervisor.metrics.add_dropped(lost + discarded);
        slot.dropped += lost + discarded;
        slot.incarnation += 1;
        slot.advance(EngineState::Restarting);

        warn!(
            engine = %speed,
            error = %fault,
            tick = ?fault.in_flight(),
            uptime_ms = uptime.as_millis() as u64,
            restart = slot.budget.used(),
            discarded,
            delay_ms = delay.as_millis() as u64,
            "Restarting engine"
        );

        let engine = supervisor.build_engine(speed, slot.incarnation, slot.counters);
        slot.advance(EngineState::Running);
        Some(child(engine, subscription, halt.clone(), delay))
    }
}

/// One engine incarnation, preceded by its backoff delay
async fn child(
    engine: Engine,
    subscription: Subscription<Tick>,
    halt: CancellationToken,
    delay: Duration,
) -> EngineRun {
    if !delay.is_zero() {
        tokio::select! {
            biased;
            _ = halt.cancelled() => {
                return EngineRun {
                    engine,
                    subscription,
                    outcome: Ok(EngineExit::Halted),
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
    engine.run(subscription, halt).await
}
