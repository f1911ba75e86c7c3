//! Tick source task
//!
//! Emits generated ticks into the splitter channel, pausing `emit_interval`
//! between ticks, until shutdown or until `max_ticks` have been accepted.
//! `fault_after_ticks` turns the source into a failing upstream stage.

use super::generator::TickGenerator;
use crate::config::SourceConfig;
use crate::core::{PipelineError, Stage, Tick};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What the source did before stopping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSummary {
    /// Ticks accepted by the splitter
    pub generated: u64,
    /// True when `max_ticks` was reached (as opposed to shutdown)
    pub exhausted: bool,
}

pub struct TickSource {
    generator: TickGenerator,
    emit_interval: Duration,
    max_ticks: Option<u64>,
    fault_after: Option<u64>,
}

impl TickSource {
    pub fn new(config: &SourceConfig, seed: u64) -> Self {
        Self {
            generator: TickGenerator::new(config, seed),
            emit_interval: config.emit_interval(),
            max_ticks: config.max_ticks,
            fault_after: config.fault_after_ticks,
        }
    }

    /// Run until shutdown or exhaustion
    ///
    /// Dropping `tx` on return is what tells the splitter the source ended.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<Tick>,
        shutdown: CancellationToken,
    ) -> Result<SourceSummary, PipelineError> {
        let mut summary = SourceSummary::default();
        info!(
            interval_us = self.emit_interval.as_micros() as u64,
            max_ticks = ?self.max_ticks,
            "Tick source started"
        );

        loop {
            if self.max_ticks.is_some_and(|max| summary.generated >= max) {
                summary.exhausted = true;
                break;
            }

            let tick = self.generator.next_tick();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = tx.send(tick) => {
                    if sent.is_err() {
                        if shutdown.is_cancelled() {
                            break;
                        }
                        return Err(PipelineError::upstream(
                            Stage::Source,
                            "splitter channel closed while source was live",
                        ));
                    }
                    summary.generated += 1;
                }
            }

            if self.fault_after.is_some_and(|after| summary.generated >= after) {
                error!(generated = summary.generated, "Tick source fault injected");
                return Err(PipelineError::upstream(
                    Stage::Source,
                    format!("source faulted after {} ticks", summary.generated),
                ));
            }

            if self.emit_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.emit_interval) => {}
                }
            }
        }

        debug!(next_id = %self.generator.peek_id(), "Tick source loop exited");
        info!(
            generated = summary.generated,
            exhausted = summary.exhausted,
            "Tick source stopped"
        );
        Ok(summary)
    }
}
