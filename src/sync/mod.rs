//! Poll, detect and publish.
//!
//! Each cycle takes one snapshot, reads every entity from it in registry
//! order and publishes the values the change gate lets through. The loop
//! only waits between cycles; a stop request is honoured at that point and
//! never interrupts a cycle.

use crate::device::DataSource;
use crate::error::{BridgeError, BridgeResult};
use crate::mqtt::{Topics, Transport};
use crate::state::Engine;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// What one cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub published: usize,
    pub suppressed: usize,
    /// Publish attempts the transport rejected
    pub failed: usize,
    /// Entities whose value could not be derived this cycle
    pub skipped: usize,
}

pub struct SyncLoop {
    engine: Arc<Engine>,
    source: Arc<dyn DataSource>,
    transport: Arc<dyn Transport>,
    topics: Topics,
    interval: Duration,
}

impl SyncLoop {
    pub fn new(
        engine: Arc<Engine>,
        source: Arc<dyn DataSource>,
        transport: Arc<dyn Transport>,
        topics: Topics,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            source,
            transport,
            topics,
            interval,
        }
    }

    /// Run one poll cycle.
    ///
    /// Fails only when the snapshot or an entity read fails; the caller is
    /// expected to treat that as fatal. Publish failures are logged and the
    /// remaining entities are still evaluated.
    pub async fn run_cycle(&self, now: Instant) -> BridgeResult<CycleReport> {
        let snapshot = self.source.fetch_snapshot().await?;
        let mut report = CycleReport::default();

        for entity in self.engine.registry.iter() {
            let value = match entity.read(&snapshot) {
                Ok(value) => value,
                Err(BridgeError::UnknownStatusCode(code)) => {
                    warn!(key = %entity.key, code, "Unknown status code, skipping entity");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let gate = &self.engine.gate;
            let previous = gate.last_published(&entity.key);
            if !gate.should_publish(&entity.key, &value, now) {
                report.suppressed += 1;
                continue;
            }

            let topic = self.topics.state(&entity.key);
            let payload = value.to_string();
            match self
                .transport
                .publish(&topic, payload.clone().into_bytes(), true)
                .await
            {
                Ok(()) => {
                    debug!(key = %entity.key, value = %payload, "Published state");
                    report.published += 1;
                }
                Err(e) => {
                    warn!(key = %entity.key, error = %e, "State publish failed");
                    // Offer the value again next cycle
                    gate.revert(&entity.key, previous);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Drive cycles on the polling interval, or sooner when a command asks
    /// for it, until `stop` resolves or a cycle fails.
    ///
    /// `stop` yields `Ok(())` for an orderly shutdown and an error for a
    /// fatal condition detected elsewhere, such as losing the broker.
    pub async fn run<F>(&self, stop: F) -> BridgeResult<()>
    where
        F: Future<Output = BridgeResult<()>>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop);

        info!(interval_secs = self.interval.as_secs(), "Sync loop started");
        loop {
            tokio::select! {
                biased;
                result = &mut stop => {
                    info!("Sync loop stopping");
                    return result;
                }
                _ = ticker.tick() => {}
                _ = self.engine.poll_requested() => {
                    debug!("Running early poll cycle");
                }
            }

            if let Err(e) = self.run_cycle(Instant::now()).await {
                error!(error = %e, "Poll cycle failed");
                return Err(e);
            }
        }
    }
}
