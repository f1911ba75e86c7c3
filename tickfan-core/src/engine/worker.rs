//! Simulated processing engine
//!
//! One engine consumes one broadcast subscription:
//!
//! ```text
//!   recv ──► filter ──► sleep(latency) ──► fault? ──► processed += 1
//!             │                              │          observe()
//!          filtered                     Err(fault)
//! ```
//!
//! The halt signal is only checked while waiting for the next delivery, so a
//! tick that has been admitted is always either completed or faulted, never
//! abandoned half-way.
//!
//! An engine never restarts itself. On a fault, panics included, it returns
//! its state, its subscription and the fault; the supervisor decides what
//! happens next.

use crate::config::SpeedProfile;
use crate::core::{EngineFault, EngineSpeed, Symbol, Tick};
use crate::monitoring::{TickObservation, TickObserver};
use crate::perf::PipelineMetrics;
use crate::queue::{Delivery, Subscription};
use crate::resilience::panic_message;
use futures_util::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Which ticks an engine admits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickFilter {
    /// BUY ticks only
    BuysOnly,
    /// One designated symbol
    Symbol(Symbol),
    /// Everything
    All,
}

impl TickFilter {
    /// Standard filter for a speed tier
    pub fn for_speed(speed: EngineSpeed, medium_symbol: &str) -> Self {
        match speed {
            EngineSpeed::Fast => TickFilter::BuysOnly,
            EngineSpeed::Medium => TickFilter::Symbol(Symbol::new(medium_symbol)),
            EngineSpeed::Slow => TickFilter::All,
        }
    }

    #[inline(always)]
    pub fn admits(&self, tick: &Tick) -> bool {
        match self {
            TickFilter::BuysOnly => tick.side == crate::core::Side::Buy,
            TickFilter::Symbol(symbol) => tick.symbol == *symbol,
            TickFilter::All => true,
        }
    }
}

/// Latency and fault behavior
#[derive(Debug, Clone, PartialEq)]
pub struct EngineProfile {
    pub latency: RangeInclusive<Duration>,
    pub fault_probability: f64,
    /// Lifetime admission ordinals (1-based) that always fault
    pub scripted_faults: Vec<u64>,
}

impl EngineProfile {
    /// Zero latency, no faults
    pub fn instant() -> Self {
        Self {
            latency: Duration::ZERO..=Duration::ZERO,
            fault_probability: 0.0,
            scripted_faults: Vec::new(),
        }
    }
}

impl From<&SpeedProfile> for EngineProfile {
    fn from(profile: &SpeedProfile) -> Self {
        Self {
            latency: profile.latency_range(),
            fault_probability: profile.fault_probability,
            scripted_faults: profile.scripted_faults.clone(),
        }
    }
}

/// Lifetime counters of one engine (survive restarts)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    /// Deliveries received from the subscription
    pub delivered: u64,
    /// Deliveries rejected by the filter
    pub filtered: u64,
    /// Deliveries that passed the filter
    pub admitted: u64,
    /// Ticks completed
    pub processed: u64,
    /// Of `processed`, ticks that were replayed copies
    pub replayed: u64,
}

/// Why an engine returned without a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    /// Stream closed and subscription drained
    StreamClosed,
    /// Halt requested
    Halted,
}

/// Everything an engine hands back to its supervisor
pub struct EngineRun {
    pub engine: Engine,
    pub subscription: Subscription<Tick>,
    pub outcome: Result<EngineExit, EngineFault>,
}

pub struct Engine {
    speed: EngineSpeed,
    filter: TickFilter,
    profile: EngineProfile,
    rng: StdRng,
    metrics: Arc<PipelineMetrics>,
    observer: Arc<dyn TickObserver>,
    counters: EngineCounters,
}

impl Engine {
    pub fn new(
        speed: EngineSpeed,
        filter: TickFilter,
        profile: EngineProfile,
        seed: u64,
        metrics: Arc<PipelineMetrics>,
        observer: Arc<dyn TickObserver>,
    ) -> Self {
        Self {
            speed,
            filter,
            profile,
            rng: StdRng::seed_from_u64(seed),
            metrics,
            observer,
            counters: EngineCounters::default(),
        }
    }

    /// Carry lifetime counters over from a previous incarnation
    pub fn with_counters(mut self, counters: EngineCounters) -> Self {
        self.counters = counters;
        self
    }

    #[inline(always)]
    pub fn speed(&self) -> EngineSpeed {
        self.speed
    }

    #[inline(always)]
    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    pub fn filter(&self) -> &TickFilter {
        &self.filter
    }

    /// Consume `subscription` until the stream ends, halt fires, or a fault
    ///
    /// A panic while processing is caught here and reported as
    /// `EngineFault::Panicked`. The subscription and the counters accumulated
    /// up to the panic are handed back either way.
    pub async fn run(mut self, subscription: Subscription<Tick>, halt: CancellationToken) -> EngineRun {
        let speed = self.speed;
        let outcome = AssertUnwindSafe(self.consume(&subscription, &halt))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(EngineFault::Panicked {
                    speed,
                    message: panic_message(payload.as_ref()),
                })
            });
        EngineRun {
            engine: self,
            subscription,
            outcome,
        }
    }

    async fn consume(
        &mut self,
        subscription: &Subscription<Tick>,
        halt: &CancellationToken,
    ) -> Result<EngineExit, EngineFault> {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = halt.cancelled() => return Ok(EngineExit::Halted),
                delivery = subscription.recv() => delivery,
            };
            let Some(Delivery { item: tick, replayed }) = delivery else {
                return Ok(EngineExit::StreamClosed);
            };

            self.counters.delivered += 1;
            if !self.filter.admits(&tick) {
                self.counters.filtered += 1;
                continue;
            }
            self.counters.admitted += 1;
            let admission = self.counters.admitted;

            let latency = self.draw_latency();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            if self.draw_fault(admission) {
                warn!(
                    engine = %self.speed,
                    tick = %tick.id,
                    admission,
                    replayed,
                    "Engine fault while processing tick"
                );
                return Err(EngineFault::Injected {
                    speed: self.speed,
                    tick_id: tick.id,
                    admission,
                    replayed,
                });
            }

            self.counters.processed += 1;
            if replayed {
                self.counters.replayed += 1;
                debug!(engine = %self.speed, tick = %tick.id, "Processed replayed tick");
            }
            self.metrics.inc_processed();
            self.observer.observe(TickObservation {
                speed: self.speed,
                tick_id: tick.id,
                side: tick.side,
                symbol: tick.symbol,
                price: tick.price,
                latency,
                replayed,
            });
        }
    }

    fn draw_latency(&mut self) -> Duration {
        let (min, max) = (*self.profile.latency.start(), *self.profile.latency.end());
        if min == max {
            min
        } else {
            self.rng.gen_range(min..=max)
        }
    }

    fn draw_fault(&mut self, admission: u64) -> bool {
        if self.profile.scripted_faults.contains(&admission) {
            return true;
        }
        self.profile.fault_probability > 0.0 && self.rng.gen_bool(self.profile.fault_probability)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("speed", &self.speed)
            .field("filter", &self.filter)
            .field("counters", &self.counters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Side, TickId};
    use crate::monitoring::RecordingObserver;
    use crate::queue::BroadcastStream;
    use tokio::time::Instant;

    fn tick(id: u64, side: Side, symbol: &str) -> Tick {
        Tick::new(TickId::new(id), Symbol::new(symbol), 150.0, side, Instant::now())
    }

    fn engine(
        speed: EngineSpeed,
        profile: EngineProfile,
        observer: Arc<RecordingObserver>,
    ) -> (Engine, Arc<PipelineMetrics>) {
        let metrics = Arc::new(PipelineMetrics::new());
        let engine = Engine::new(
            speed,
            TickFilter::for_speed(speed, "MSFT"),
            profile,
            11,
            Arc::clone(&metrics),
            observer,
        );
        (engine, metrics)
    }

    #[test]
    fn test_filters_per_speed() {
        let buy = tick(1, Side::Buy, "AAPL");
        let sell_msft = tick(2, Side::Sell, "MSFT");

        let fast = TickFilter::for_speed(EngineSpeed::Fast, "MSFT");
        assert!(fast.admits(&buy));
        assert!(!fast.admits(&sell_msft));

        let medium = TickFilter::for_speed(EngineSpeed::Medium, "MSFT");
        assert!(!medium.admits(&buy));
        assert!(medium.admits(&sell_msft));

        let slow = TickFilter::for_speed(EngineSpeed::Slow, "MSFT");
        assert!(slow.admits(&buy) && slow.admits(&sell_msft));
    }

    #[tokio::test(start_paused = true)]
    async fn test_processes_until_stream_closed() {
        let stream = BroadcastStream::new(16);
        let sub = stream.subscribe();
        let rec = Arc::new(RecordingObserver::new());
        let (engine, metrics) = engine(EngineSpeed::Fast, EngineProfile::instant(), rec.clone());

        stream.publish(tick(1, Side::Buy, "AAPL")).unwrap();
        stream.publish(tick(2, Side::Sell, "AAPL")).unwrap();
        stream.publish(tick(3, Side::Buy, "NVDA")).unwrap();
        stream.close();

        let run = engine.run(sub, CancellationToken::new()).await;
        assert_eq!(run.outcome, Ok(EngineExit::StreamClosed));
        let counters = run.engine.counters();
        assert_eq!(counters.delivered, 3);
        assert_eq!(counters.filtered, 1);
        assert_eq!(counters.processed, 2);
        assert_eq!(metrics.processed(), 2);

        let ids: Vec<u64> = rec.records().iter().map(|o| o.tick_id.as_u64()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_within_range() {
        let stream = BroadcastStream::new(16);
        let sub = stream.subscribe();
        let rec = Arc::new(RecordingObserver::new());
        let profile = EngineProfile {
            latency: Duration::from_millis(50)..=Duration::from_millis(150),
            ..EngineProfile::instant()
        };
        let (engine, _) = engine(EngineSpeed::Slow, profile, rec.clone());

        for id in 1..=10 {
            stream.publish(tick(id, Side::Sell, "GOOGL")).unwrap();
        }
        stream.close();

        let start = Instant::now();
        engine.run(sub, CancellationToken::new()).await;
        let total: Duration = rec.records().iter().map(|o| o.latency).sum();
        for o in rec.records() {
            assert!(o.latency >= Duration::from_millis(50) && o.latency <= Duration::from_millis(150));
        }
        assert!(start.elapsed() >= total);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_fault_returns_in_flight_tick() {
        let stream = BroadcastStream::new(16);
        let sub = stream.subscribe();
        let rec = Arc::new(RecordingObserver::new());
        let profile = EngineProfile {
            scripted_faults: vec![2],
            ..EngineProfile::instant()
        };
        let (engine, metrics) = engine(EngineSpeed::Slow, profile, rec.clone());

        for id in 1..=3 {
            stream.publish(tick(id, Side::Buy, "AAPL")).unwrap();
        }

        let run = engine.run(sub, CancellationToken::new()).await;
        match run.outcome {
            Err(EngineFault::Injected { tick_id, admission, replayed, .. }) => {
                assert_eq!(tick_id, TickId::new(2));
                assert_eq!(admission, 2);
                assert!(!replayed);
            }
            other => panic!("expected injected fault, got {other:?}"),
        }
        assert_eq!(metrics.processed(), 1);
        // tick 3 still waiting in the subscription
        assert_eq!(run.subscription.buffered(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halt_checked_between_ticks() {
        let stream = BroadcastStream::new(16);
        let sub = stream.subscribe();
        let rec = Arc::new(RecordingObserver::new());
        let profile = EngineProfile {
            latency: Duration::from_millis(100)..=Duration::from_millis(100),
            ..EngineProfile::instant()
        };
        let (engine, _) = engine(EngineSpeed::Slow, profile, rec.clone());
        for id in 1..=5 {
            stream.publish(tick(id, Side::Buy, "AAPL")).unwrap();
        }

        let halt = CancellationToken::new();
        let handle = tokio::spawn(engine.run(sub, halt.clone()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        halt.cancel();

        let run = handle.await.unwrap();
        assert_eq!(run.outcome, Ok(EngineExit::Halted));
        // tick 2 was admitted before halt and completed
        assert_eq!(run.engine.counters().processed, 2);
        assert_eq!(run.subscription.buffered(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counters_carry_over() {
        let stream = BroadcastStream::<Tick>::new(4);
        let sub = stream.subscribe();
        stream.close();
        let carried = EngineCounters {
            admitted: 5,
            processed: 4,
            ..EngineCounters::default()
        };
        let (engine, _) = engine(
            EngineSpeed::Slow,
            EngineProfile::instant(),
            Arc::new(RecordingObserver::new()),
        );
        let run = engine.with_counters(carried).run(sub, CancellationToken::new()).await;
        assert_eq!(run.engine.counters(), carried);
    }
}
