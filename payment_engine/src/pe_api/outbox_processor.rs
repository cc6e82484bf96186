use log::*;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Duration, MissedTickBehavior},
};

use crate::{
    events::IntegrationEventPublisher,
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// How often the processor wakes up to look for unprocessed messages.
    pub interval: Duration,
    /// How many messages one cycle will take on at most.
    pub batch_size: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(10), batch_size: 20 }
    }
}

/// What one processing cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub fetched: usize,
    pub published: usize,
}

/// The background half of the outbox: a periodic loop that drains unprocessed messages to the
/// integration sink, at-least-once.
///
/// A message whose publish fails has its retry count and error recorded and stays unprocessed for the
/// next cycle — one poisoned message never stops the loop, and neither does an unexpected cycle error.
/// There is no retry cap or dead-letter path: a permanently failing message retries on every cycle.
///
/// The host owns the task and its shutdown signal:
///
/// ```ignore
/// let processor = OutboxProcessor::new(db, publisher, config);
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = OutboxProcessorHandle::new(shutdown_tx, tokio::spawn(processor.run(shutdown_rx)));
/// // ... later, on host shutdown:
/// handle.shutdown().await;
/// ```
pub struct OutboxProcessor<B, P> {
    db: B,
    publisher: P,
    config: OutboxConfig,
}

impl<B, P> OutboxProcessor<B, P>
where
    B: PaymentGatewayDatabase,
    P: IntegrationEventPublisher,
{
    pub fn new(db: B, publisher: P, config: OutboxConfig) -> Self {
        Self { db, publisher, config }
    }

    /// The processing loop: one [`Self::process_batch`] per timer tick until the shutdown signal fires.
    /// Spawn this on the runtime and keep the [`watch::Sender`] — dropping it also stops the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("📬️ Outbox processor started (interval {}ms)", self.config.interval.as_millis());
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match self.process_batch().await {
                        Ok(stats) if stats.fetched > 0 => {
                            debug!("📬️ Outbox cycle complete: {}/{} messages published", stats.published, stats.fetched);
                        },
                        Ok(_) => trace!("📬️ Outbox cycle complete: nothing to publish"),
                        Err(e) => error!("📬️ Unexpected error in outbox processing cycle: {e}"),
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("📬️ Outbox processor shut down");
    }

    /// One processing cycle: fetch a batch of unprocessed messages, publish each, and persist the whole
    /// batch's bookkeeping in one write. Also callable directly, which is how tests drive cycles
    /// deterministically.
    pub async fn process_batch(&self) -> Result<BatchStats, PaymentGatewayError> {
        let mut batch = self.db.fetch_unprocessed_outbox_messages(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(BatchStats::default());
        }
        let mut published = 0;
        for message in batch.iter_mut() {
            match self.publisher.publish(&message.event_type, &message.content).await {
                Ok(()) => {
                    message.mark_processed();
                    published += 1;
                },
                Err(e) => {
                    message.mark_failed(&e.to_string());
                    error!(
                        "📬️ Failed to publish outbox message {} (retry {}): {e}",
                        message.id, message.retry_count
                    );
                },
            }
        }
        let fetched = batch.len();
        self.db.persist_outbox_results(&batch).await?;
        Ok(BatchStats { fetched, published })
    }
}

/// Pairs a spawned processor task with its shutdown sender so the host can stop it cleanly.
pub struct OutboxProcessorHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl OutboxProcessorHandle {
    pub fn new(shutdown: watch::Sender<bool>, handle: JoinHandle<()>) -> Self {
        Self { shutdown, handle }
    }

    /// Signals the loop to stop and waits for it to finish the cycle it may be in.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!("📬️ Outbox processor task failed during shutdown: {e}");
        }
    }
}
