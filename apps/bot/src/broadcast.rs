use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serenity::futures::{StreamExt, stream};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use tracing_futures::Instrument;

use crypto::{
    MarketError, PriceSource, SubscriberPatch, SubscriberRecord, SubscriberStore, collect_metrics,
    format_digest,
};

use crate::delivery::{CleanupPolicy, Delivery, DeliveryError};

const SUBSCRIBER_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("subscription store update failed: {0}")]
    Store(anyhow::Error),

    #[error("refresh cycle exceeded {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Delivered,
    /// A previous cycle for this subscriber is still running; skipped, not queued.
    Busy,
    /// Nothing worth sending (no watch list, or every symbol was skipped).
    NothingToSend,
}

/// Runs refresh cycles: fetch metrics, format, replace the previous digest,
/// persist the new message identity.
pub struct Broadcaster {
    store: Arc<dyn SubscriberStore>,
    source: Arc<dyn PriceSource>,
    delivery: Delivery,
    in_flight: Arc<Mutex<HashSet<u64>>>,
    cycle_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        source: Arc<dyn PriceSource>,
        delivery: Delivery,
        cycle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            source,
            delivery,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            cycle_timeout,
        }
    }

    /// One pass over every subscriber with a non-empty watch list. Failures
    /// are contained per subscriber; nothing escapes this method.
    #[instrument(name = "broadcast_tick", skip(self))]
    pub async fn run_tick(&self) {
        let records = match self.store.get_all().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "failed to load subscribers; tick aborted");
                return;
            }
        };
        info!(total_subscribers = records.len(), "loaded subscribers");

        let mut cycles = stream::iter(
            records
                .into_iter()
                .filter(|record| !record.watch_list.is_empty()),
        )
        .map(|record| {
            let subscriber_id = record.subscriber_id;
            let span = tracing::info_span!("refresh_cycle", subscriber_id);

            async move { (subscriber_id, self.refresh(record).await) }.instrument(span)
        })
        .buffer_unordered(SUBSCRIBER_CONCURRENCY);

        let mut delivered: usize = 0;
        let mut skipped: usize = 0;
        let mut failed: usize = 0;

        while let Some((subscriber_id, result)) = cycles.next().await {
            match result {
                Ok(RefreshOutcome::Delivered) => delivered += 1,
                Ok(RefreshOutcome::Busy) => {
                    debug!(subscriber_id, "previous cycle still running; skipped");
                    skipped += 1;
                }
                Ok(RefreshOutcome::NothingToSend) => skipped += 1,
                Err(e) => {
                    failed += 1;
                    error!(subscriber_id, error = %e, "refresh cycle failed");
                }
            }
        }

        info!(delivered, skipped, failed, "broadcast tick complete");
    }

    /// Immediate single-subscriber refresh, for the command layer.
    pub async fn trigger_refresh(&self, subscriber_id: u64) -> Result<RefreshOutcome, RefreshError> {
        let Some(record) = self
            .store
            .get(subscriber_id)
            .await
            .map_err(RefreshError::Store)?
        else {
            return Ok(RefreshOutcome::NothingToSend);
        };
        if record.watch_list.is_empty() {
            return Ok(RefreshOutcome::NothingToSend);
        }
        self.refresh(record).await
    }

    /// Remove a subscriber's digest message once their watch list empties.
    /// The stored reference is cleared only when the delete went through.
    pub async fn retire_digest(&self, subscriber_id: u64) -> Result<(), RefreshError> {
        let Some(record) = self
            .store
            .get(subscriber_id)
            .await
            .map_err(RefreshError::Store)?
        else {
            return Ok(());
        };
        let Some(last) = record.last_message else {
            return Ok(());
        };

        if self.delivery.retract(subscriber_id, last.id).await {
            self.store
                .merge(
                    subscriber_id,
                    SubscriberPatch {
                        last_message: Some(None),
                        ..Default::default()
                    },
                )
                .await
                .map_err(RefreshError::Store)?;
        }
        Ok(())
    }

    async fn refresh(&self, record: SubscriberRecord) -> Result<RefreshOutcome, RefreshError> {
        let Some(_guard) = self.try_claim(record.subscriber_id) else {
            return Ok(RefreshOutcome::Busy);
        };

        match tokio::time::timeout(self.cycle_timeout, self.run_cycle(record)).await {
            Ok(result) => result,
            Err(_) => Err(RefreshError::Timeout(self.cycle_timeout)),
        }
    }

    // The ordered pipeline: metrics -> format -> replace -> persist.
    async fn run_cycle(&self, record: SubscriberRecord) -> Result<RefreshOutcome, RefreshError> {
        let subscriber_id = record.subscriber_id;

        let metrics = collect_metrics(self.source.as_ref(), &record.watch_list).await?;
        if metrics.is_empty() {
            warn!(subscriber_id, "every symbol skipped; digest not sent");
            return Ok(RefreshOutcome::NothingToSend);
        }

        let text = format_digest(&metrics);
        let sent = self
            .delivery
            .replace(
                subscriber_id,
                record.last_message.as_ref(),
                &text,
                CleanupPolicy::Always,
            )
            .await?;

        self.store
            .merge(
                subscriber_id,
                SubscriberPatch {
                    last_message: Some(Some(sent)),
                    ..Default::default()
                },
            )
            .await
            .map_err(RefreshError::Store)?;

        Ok(RefreshOutcome::Delivered)
    }

    fn try_claim(&self, subscriber_id: u64) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.insert(subscriber_id) {
            Some(InFlightGuard {
                set: Arc::clone(&self.in_flight),
                subscriber_id,
            })
        } else {
            None
        }
    }
}

struct InFlightGuard {
    set: Arc<Mutex<HashSet<u64>>>,
    subscriber_id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.subscriber_id);
    }
}

/// Owns the repeating timer. The first tick fires immediately and doubles
/// as the startup sweep over existing subscribers.
pub struct BroadcastScheduler {
    broadcaster: Arc<Broadcaster>,
    running: tokio::sync::Mutex<Option<TimerLoop>>,
}

struct TimerLoop {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BroadcastScheduler {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            broadcaster,
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Arm the timer. A previous loop is cancelled and drained first, so
    /// two periodic loops never overlap. `period` must be non-zero.
    pub async fn start(&self, period: Duration) {
        let mut slot = self.running.lock().await;
        if let Some(previous) = slot.take() {
            Self::halt(previous).await;
        }

        let (cancel, mut cancelled) = watch::channel(false);
        let broadcaster = Arc::clone(&self.broadcaster);

        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = timer.tick() => broadcaster.run_tick().await,
                }
            }
        });

        *slot = Some(TimerLoop { cancel, handle });
    }

    /// No tick fires after this returns; an in-flight tick finishes first.
    pub async fn stop(&self) {
        let mut slot = self.running.lock().await;
        if let Some(previous) = slot.take() {
            Self::halt(previous).await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn halt(timer: TimerLoop) {
        let _ = timer.cancel.send(true);
        if let Err(e) = timer.handle.await {
            error!(error = %e, "broadcast loop join failed");
        }
    }
}
