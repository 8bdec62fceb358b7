//! Status Poller
//!
//! Samples `/api/services/status` on an interval and publishes the result
//! through a `watch` channel.
//!
//! # Design Philosophy
//!
//! - A failed poll never propagates: the previous map stays published and
//!   the failure is logged.
//! - Polls never overlap. A tick that arrives while a poll is still
//!   outstanding is skipped and counted, not queued.
//! - The periodic task stops when its [`PollerHandle`] is stopped or dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::ServiceStatusMap;
use crate::api::ChatApi;

/// Result of one poll attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// A fresh map was published
    Updated,
    /// The request failed; the previous map is unchanged
    Failed,
    /// Another poll was still in flight
    Skipped,
}

/// Counters since the poller was created
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Successful polls
    pub updated: u64,
    /// Failed polls
    pub failed: u64,
    /// Ticks skipped because a poll was in flight
    pub skipped: u64,
}

/// Periodic service-health sampler
pub struct StatusPoller {
    api: Arc<dyn ChatApi>,
    tx: watch::Sender<ServiceStatusMap>,
    in_flight: AtomicBool,
    updated: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Releases the in-flight flag on every exit path
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl StatusPoller {
    /// Create a poller with an empty map
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        let (tx, _rx) = watch::channel(ServiceStatusMap::new());
        Self {
            api,
            tx,
            in_flight: AtomicBool::new(false),
            updated: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Receive every published map
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ServiceStatusMap> {
        self.tx.subscribe()
    }

    /// Last published map
    #[must_use]
    pub fn current(&self) -> ServiceStatusMap {
        self.tx.borrow().clone()
    }

    /// Whether a poll is outstanding
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Counters snapshot
    #[must_use]
    pub fn stats(&self) -> PollerStats {
        PollerStats {
            updated: self.updated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Issue one health request
    ///
    /// On success the whole map is replaced and published. On failure the
    /// previous map stays and the error is logged.
    pub async fn poll_once(&self) -> PollOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Status poll still in flight, skipping tick");
            return PollOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        match self.api.service_status().await {
            Ok(map) => {
                tracing::debug!(
                    services = map.len(),
                    online = map.online_count(),
                    "Service status updated"
                );
                self.tx.send_replace(map);
                self.updated.fetch_add(1, Ordering::Relaxed);
                PollOutcome::Updated
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error checking services");
                self.failed.fetch_add(1, Ordering::Relaxed);
                PollOutcome::Failed
            }
        }
    }

    /// Poll now and then every `interval` until the handle is stopped
    pub fn start(self: Arc<Self>, interval: Duration) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                "Starting service status poller"
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut polls = JoinSet::new();

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let poller = Arc::clone(&self);
                        polls.spawn(async move { poller.poll_once().await });
                    }
                    Some(_) = polls.join_next(), if !polls.is_empty() => {}
                }
            }

            polls.abort_all();
            tracing::info!("Service status poller stopped");
        });

        PollerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Stops a running [`StatusPoller`] task
///
/// Dropping the handle stops the task as well.
#[derive(Debug)]
pub struct PollerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Whether the periodic task is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
