// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - In-process fakes for unit tests

use crate::backend::{Backend, Role, Session, SignUpProfile};
use crate::connectivity::{ConnectivityMonitor, NetworkState};
use crate::notify::{LocalNotifier, Notification, PushSender};
use async_trait::async_trait;
use offfire_core::{AppError, AppResult, NewOrder, OrderId, OrderRecord};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Backend that records every call and fails on demand
#[derive(Default)]
pub struct FakeBackend {
    pub orders: Mutex<Vec<NewOrder>>,
    pub admin_token: Mutex<Option<String>>,
    pub stored_admin_tokens: Mutex<Vec<String>>,
    pub linked_orders: Mutex<Vec<(String, OrderId)>>,
    pub password_resets: Mutex<Vec<String>>,
    pub password_updates: Mutex<Vec<(String, String)>>,
    order_ids: Mutex<Vec<OrderId>>,
    failing_clients: Mutex<HashSet<String>>,
    latency: Duration,
    next_id: AtomicI64,
    offline_after: Option<(usize, ConnectivityMonitor)>,
    fail_token_update: bool,
    health_error: Mutex<Option<AppError>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Flip the monitor offline once `calls` orders were accepted
    pub fn offline_after(mut self, calls: usize, monitor: ConnectivityMonitor) -> Self {
        self.offline_after = Some((calls, monitor));
        self
    }

    pub fn failing_token_update(mut self) -> Self {
        self.fail_token_update = true;
        self
    }

    pub fn fail_for(&self, client_name: &str) {
        self.failing_clients
            .lock()
            .unwrap()
            .insert(client_name.to_string());
    }

    pub fn recover(&self, client_name: &str) {
        self.failing_clients.lock().unwrap().remove(client_name);
    }

    /// Make health checks fail with `error` until called again with None
    pub fn set_health(&self, error: Option<AppError>) {
        *self.health_error.lock().unwrap() = error;
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn create_order(&self, order: &NewOrder) -> AppResult<OrderRecord> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self
            .failing_clients
            .lock()
            .unwrap()
            .contains(&order.payload.client_name)
        {
            return Err(AppError::Backend {
                code: "500".to_string(),
                message: "insert failed".to_string(),
            });
        }

        let (id, accepted) = {
            let mut orders = self.orders.lock().unwrap();
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            orders.push(order.clone());
            self.order_ids.lock().unwrap().push(id);
            (id, orders.len())
        };

        if let Some((calls, monitor)) = &self.offline_after {
            if accepted >= *calls {
                monitor.update(NetworkState::offline());
            }
        }

        Ok(OrderRecord {
            id,
            fields: Default::default(),
        })
    }

    async fn admin_push_token(&self) -> AppResult<Option<String>> {
        Ok(self.admin_token.lock().unwrap().clone())
    }

    async fn set_admin_push_token(&self, _session: &Session, token: &str) -> AppResult<()> {
        if self.fail_token_update {
            return Err(AppError::Backend {
                code: "42501".to_string(),
                message: "permission denied".to_string(),
            });
        }
        self.stored_admin_tokens
            .lock()
            .unwrap()
            .push(token.to_string());
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        if password != "secret" {
            return Err(AppError::Auth("Invalid login credentials".to_string()));
        }
        Ok(Session {
            access_token: "token".to_string(),
            user_id: "user-1".to_string(),
            email: email.to_string(),
            role: if email.starts_with("admin") {
                Role::Admin
            } else {
                Role::Customer
            },
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _profile: &SignUpProfile,
    ) -> AppResult<Option<Session>> {
        self.sign_in(email, password).await.map(Some)
    }

    async fn sign_out(&self, _session: &Session) -> AppResult<()> {
        Ok(())
    }

    async fn link_order_to_user(&self, session: &Session, order_id: OrderId) -> AppResult<()> {
        self.linked_orders
            .lock()
            .unwrap()
            .push((session.user_id.clone(), order_id));
        Ok(())
    }

    async fn list_orders(&self, session: &Session) -> AppResult<Vec<OrderRecord>> {
        let orders = self.orders.lock().unwrap();
        let ids = self.order_ids.lock().unwrap();
        Ok(ids
            .iter()
            .zip(orders.iter())
            .rev()
            .filter(|(_, order)| order.payload.user_id.as_deref() == Some(&session.user_id))
            .map(|(id, order)| OrderRecord {
                id: *id,
                fields: serde_json::to_value(order)
                    .ok()
                    .and_then(|v| v.as_object().cloned())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn reset_password(&self, email: &str, _redirect_to: &str) -> AppResult<()> {
        self.password_resets.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn update_password(&self, session: &Session, new_password: &str) -> AppResult<()> {
        self.password_updates
            .lock()
            .unwrap()
            .push((session.user_id.clone(), new_password.to_string()));
        Ok(())
    }

    async fn health(&self) -> AppResult<()> {
        match self.health_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Notifier that keeps what it was asked to show
#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<Notification>>,
    pub pushed: Mutex<Vec<(String, Notification)>>,
    pub fail_push: bool,
}

#[async_trait]
impl LocalNotifier for RecordingNotifier {
    async fn show(&self, notification: &Notification) -> AppResult<()> {
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[async_trait]
impl PushSender for RecordingNotifier {
    async fn push(&self, token: &str, notification: &Notification) -> AppResult<()> {
        if self.fail_push {
            return Err(AppError::Push("service unavailable".to_string()));
        }
        self.pushed
            .lock()
            .unwrap()
            .push((token.to_string(), notification.clone()));
        Ok(())
    }
}
