// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Offline queue sync engine
//
// A flush replays every queued submission against the backend, one at a
// time, and removes the ones the backend accepted. Failures stay queued
// for the next flush; there is no backoff and no retry limit.
//
// Flushes are triggered by a fixed timer, by connectivity coming back, and
// manually. Whether two flushes may overlap is set by OverlapPolicy.
//
// Connectivity is observed through a watch channel, which only keeps the
// latest value. An offline, online, offline flap between two polls of the
// watcher yields no restoration flush; the next timer tick covers it.

use crate::backend::Backend;
use crate::connectivity::ConnectivityMonitor;
use crate::task::BackgroundTask;
use chrono::Utc;
use offfire_core::{
    AppError, ErrorKind, ErrorLog, LocalId, NewOrder, OfflineQueue, OverlapPolicy, SyncReport,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

/// Owned handle of the background sync loop
pub type SyncHandle = BackgroundTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncTrigger {
    Startup,
    Timer,
    ConnectivityRestored,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    Offline,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped { reason: SkipReason },
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped { .. } => None,
        }
    }

    pub fn synced(&self) -> usize {
        self.report().map_or(0, |r| r.synced)
    }
}

/// Progress of flushes, for observers of the background loop
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    #[serde(rename_all = "camelCase")]
    Started { trigger: SyncTrigger, pending: usize },
    #[serde(rename_all = "camelCase")]
    Submitted { local_id: LocalId, order_id: i64 },
    #[serde(rename_all = "camelCase")]
    Failed {
        local_id: LocalId,
        kind: ErrorKind,
        error: String,
    },
    Completed {
        trigger: SyncTrigger,
        report: SyncReport,
    },
    Skipped {
        trigger: SyncTrigger,
        reason: SkipReason,
    },
}

/// Decrements the active flush counter when a flush ends
struct ActiveFlush<'a>(&'a AtomicUsize);

impl Drop for ActiveFlush<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SyncEngine {
    queue: Arc<OfflineQueue>,
    backend: Arc<dyn Backend>,
    connectivity: ConnectivityMonitor,
    policy: OverlapPolicy,
    active_flushes: AtomicUsize,
    event_tx: broadcast::Sender<SyncEvent>,
    error_log: Option<Arc<ErrorLog>>,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<OfflineQueue>,
        backend: Arc<dyn Backend>,
        connectivity: ConnectivityMonitor,
        policy: OverlapPolicy,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            queue,
            backend,
            connectivity,
            policy,
            active_flushes: AtomicUsize::new(0),
            event_tx,
            error_log: None,
        }
    }

    /// Record failed submissions in the persistent error log
    pub fn with_error_log(mut self, error_log: Arc<ErrorLog>) -> Self {
        self.error_log = Some(error_log);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.active_flushes.load(Ordering::SeqCst) > 0
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn skip(&self, trigger: SyncTrigger, reason: SkipReason) -> SyncOutcome {
        tracing::debug!("Sync ({:?}) skipped: {:?}", trigger, reason);
        self.emit(SyncEvent::Skipped { trigger, reason });
        SyncOutcome::Skipped { reason }
    }

    /// Replay the offline queue against the backend
    pub async fn flush(&self, trigger: SyncTrigger) -> SyncOutcome {
        let previously_active = self.active_flushes.fetch_add(1, Ordering::SeqCst);
        let _active = ActiveFlush(&self.active_flushes);

        if previously_active > 0 && self.policy == OverlapPolicy::SkipWhenBusy {
            return self.skip(trigger, SkipReason::Busy);
        }

        if !self.connectivity.is_online() {
            return self.skip(trigger, SkipReason::Offline);
        }

        let pending = self.queue.list_all().await;
        let mut report = SyncReport {
            total: pending.len(),
            ..Default::default()
        };

        if !pending.is_empty() {
            tracing::info!("Syncing {} offline submission(s) ({:?})", pending.len(), trigger);
        }
        self.emit(SyncEvent::Started {
            trigger,
            pending: pending.len(),
        });

        for submission in &pending {
            if !self.connectivity.is_online() {
                tracing::info!("Connectivity lost, stopping sync with records left");
                report.interrupted = true;
                break;
            }

            let order = NewOrder::replayed(submission, Utc::now());
            match self.backend.create_order(&order).await {
                Ok(record) => {
                    report.synced += 1;
                    if let Err(e) = self.queue.remove(submission.local_id).await {
                        // The backend has the order; it will be sent again next flush
                        tracing::error!(
                            "Order #{} accepted but submission {} could not be dequeued: {}",
                            record.id,
                            submission.local_id,
                            e
                        );
                        self.log_error("sync.dequeue", &e).await;
                    }
                    self.emit(SyncEvent::Submitted {
                        local_id: submission.local_id,
                        order_id: record.id,
                    });
                }
                Err(e) => {
                    tracing::warn!("Sync failed for submission {}: {}", submission.local_id, e);
                    self.log_error("sync.submit", &e).await;
                    self.emit(SyncEvent::Failed {
                        local_id: submission.local_id,
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.failed = report.total - report.synced;
        if report.synced > 0 {
            tracing::info!("Synced {} of {} offline submission(s)", report.synced, report.total);
        }
        self.emit(SyncEvent::Completed { trigger, report });
        SyncOutcome::Completed(report)
    }

    async fn log_error(&self, context: &str, error: &AppError) {
        if let Some(log) = &self.error_log {
            log.record_quietly(context, error).await;
        }
    }

    /// Start the background loop: an initial flush, then one per timer tick
    /// and one each time connectivity comes back.
    pub fn start(self: &Arc<Self>, interval: Duration) -> SyncHandle {
        let engine = Arc::clone(self);
        let mut watcher = self.connectivity.subscribe();

        BackgroundTask::spawn("sync", move |mut shutdown| async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!("Auto sync started, every {:?}", interval);
            engine.flush(SyncTrigger::Startup).await;

            loop {
                let trigger = tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => SyncTrigger::Timer,
                    changed = watcher.changed() => match changed {
                        Some(state) if state.is_online() => SyncTrigger::ConnectivityRestored,
                        Some(_) => continue,
                        None => break,
                    },
                };

                engine.flush(trigger).await;
            }

            tracing::info!("Auto sync stopped");
        })
    }
}
