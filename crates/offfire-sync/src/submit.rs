// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Quote submission entry point

use crate::backend::{Backend, SessionSlot};
use crate::connectivity::ConnectivityMonitor;
use crate::notify::{DispatchReport, NotificationDispatcher, NotificationEvent};
use offfire_core::{AppResult, ErrorLog, LocalId, NewOrder, OfflineQueue, OrderPayload, OrderRecord};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Stored locally, the sync engine will send it later
    Queued { local_id: LocalId },
    /// Accepted by the backend
    Submitted {
        order: OrderRecord,
        notification: DispatchReport,
    },
}

pub struct QuoteSubmitter {
    connectivity: ConnectivityMonitor,
    queue: Arc<OfflineQueue>,
    backend: Arc<dyn Backend>,
    dispatcher: Arc<NotificationDispatcher>,
    error_log: Option<Arc<ErrorLog>>,
    session: Option<SessionSlot>,
}

impl QuoteSubmitter {
    pub fn new(
        connectivity: ConnectivityMonitor,
        queue: Arc<OfflineQueue>,
        backend: Arc<dyn Backend>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            connectivity,
            queue,
            backend,
            dispatcher,
            error_log: None,
            session: None,
        }
    }

    pub fn with_error_log(mut self, error_log: Arc<ErrorLog>) -> Self {
        self.error_log = Some(error_log);
        self
    }

    /// Attribute submissions to whoever is signed in through `session`
    pub fn with_session(mut self, session: SessionSlot) -> Self {
        self.session = Some(session);
        self
    }

    /// Send a quote request now, or queue it when offline
    pub async fn submit(&self, mut payload: OrderPayload) -> AppResult<SubmitOutcome> {
        payload.validate()?;

        // Stamped before queueing so a replay keeps the submitter's account
        if let Some(user_id) = self.session.as_ref().and_then(SessionSlot::user_id) {
            payload.user_id = Some(user_id);
        }

        if !self.connectivity.is_online() {
            let local_id = self.queue.enqueue(payload).await?;
            tracing::info!("Offline, queued submission {}", local_id);
            return Ok(SubmitOutcome::Queued { local_id });
        }

        let event_client = payload.client_name.clone();
        let event_service = payload.service_name.clone();

        let order = match self.backend.create_order(&NewOrder::direct(payload)).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!("Direct submission failed: {}", e);
                if let Some(log) = &self.error_log {
                    log.record_quietly("submit.create_order", &e).await;
                }
                return Err(e);
            }
        };
        tracing::info!("Submitted order {}", order.id);

        let notification = self
            .dispatcher
            .dispatch(NotificationEvent::NewOrder {
                order_id: order.id,
                client_name: event_client,
                service_name: event_service,
            })
            .await;

        Ok(SubmitOutcome::Submitted {
            order,
            notification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Role, Session};
    use crate::connectivity::NetworkState;
    use crate::testing::{FakeBackend, RecordingNotifier};
    use offfire_core::{AppError, MemoryKeyValueStore};

    struct Fixture {
        monitor: ConnectivityMonitor,
        queue: Arc<OfflineQueue>,
        backend: Arc<FakeBackend>,
        notifier: Arc<RecordingNotifier>,
        submitter: QuoteSubmitter,
    }

    fn fixture(initial: NetworkState) -> Fixture {
        let monitor = ConnectivityMonitor::new(initial);
        let queue = Arc::new(OfflineQueue::new(Arc::new(MemoryKeyValueStore::new())));
        let backend = Arc::new(FakeBackend::new());
        *backend.admin_token.lock().unwrap() = Some("ExponentPushToken[admin]".to_string());
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            notifier.clone(),
            notifier.clone(),
            backend.clone(),
        ));
        let submitter =
            QuoteSubmitter::new(monitor.clone(), queue.clone(), backend.clone(), dispatcher);

        Fixture {
            monitor,
            queue,
            backend,
            notifier,
            submitter,
        }
    }

    #[tokio::test]
    async fn test_offline_submission_is_queued() {
        let f = fixture(NetworkState::offline());

        let outcome = f
            .submitter
            .submit(OrderPayload::new("Ali", "0500000000", 3))
            .await
            .unwrap();

        let SubmitOutcome::Queued { local_id } = outcome else {
            panic!("expected queued outcome, got {:?}", outcome);
        };
        let records = f.queue.list_all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].local_id, local_id);
        assert_eq!(f.backend.order_count(), 0);
        assert!(f.notifier.pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_online_submission_goes_direct_and_notifies() {
        let f = fixture(NetworkState::online());

        let outcome = f
            .submitter
            .submit(OrderPayload::new("Ali", "+966500000000", 3))
            .await
            .unwrap();

        let SubmitOutcome::Submitted { order, notification } = outcome else {
            panic!("expected submitted outcome, got {:?}", outcome);
        };
        assert_eq!(order.id, 100);
        assert!(notification.is_ok());
        assert!(f.queue.is_empty().await);

        let sent = f.backend.orders.lock().unwrap();
        assert!(!sent[0].was_offline);
        assert!(sent[0].synced_at.is_none());
        assert_eq!(f.notifier.pushed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_queue() {
        let f = fixture(NetworkState::offline());

        let result = f.submitter.submit(OrderPayload::new("  ", "0500000000", 3)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = f.submitter.submit(OrderPayload::new("Ali", "12ab", 3)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        assert!(f.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_signed_in_submissions_carry_user() {
        let slot = SessionSlot::new();
        let f = fixture(NetworkState::offline());
        let submitter = QuoteSubmitter::new(
            f.monitor.clone(),
            f.queue.clone(),
            f.backend.clone(),
            Arc::new(NotificationDispatcher::new(
                f.notifier.clone(),
                f.notifier.clone(),
                f.backend.clone(),
            )),
        )
        .with_session(slot.clone());

        // Guest submission stays anonymous
        submitter
            .submit(OrderPayload::new("Guest", "0500000000", 3))
            .await
            .unwrap();

        slot.set(Some(Session {
            access_token: "token".to_string(),
            user_id: "user-9".to_string(),
            email: "client@example.com".to_string(),
            role: Role::Customer,
        }));
        submitter
            .submit(OrderPayload::new("Ali", "0500000000", 3))
            .await
            .unwrap();

        let queued = f.queue.list_all().await;
        assert_eq!(queued[0].payload.user_id, None);
        assert_eq!(queued[1].payload.user_id.as_deref(), Some("user-9"));

        f.monitor.update(NetworkState::online());
        submitter
            .submit(OrderPayload::new("Sara", "0500000000", 3))
            .await
            .unwrap();
        let sent = f.backend.orders.lock().unwrap();
        assert_eq!(sent[0].payload.user_id.as_deref(), Some("user-9"));
    }

    #[tokio::test]
    async fn test_direct_failure_is_returned() {
        let f = fixture(NetworkState::online());
        f.backend.fail_for("Ali");

        let result = f.submitter.submit(OrderPayload::new("Ali", "0500000000", 3)).await;
        assert!(matches!(result, Err(AppError::Backend { .. })));
        assert!(f.queue.is_empty().await);
        assert!(f.notifier.shown.lock().unwrap().is_empty());

        // Going offline afterwards routes to the queue
        f.monitor.update(NetworkState::offline());
        let outcome = f
            .submitter
            .submit(OrderPayload::new("Ali", "0500000000", 3))
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
    }
}
