// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Remote backend contract

use async_trait::async_trait;
use offfire_core::{AppResult, NewOrder, OrderId, OrderRecord};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Role carried by the session, resolved once at sign-in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    /// Interpret the `role` claim from the session's app metadata
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim.map(|c| c.trim().to_ascii_lowercase()) {
            Some(c) if c == "admin" => Self::Admin,
            _ => Self::Customer,
        }
    }
}

/// Authenticated session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Current session shared by the services acting for the signed-in user
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Session> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, session: Option<Session>) {
        match self.inner.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    pub fn take(&self) -> Option<Session> {
        match self.inner.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.get().map(|s| s.user_id)
    }
}

/// Profile fields stored as user metadata on sign-up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignUpProfile {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Operations the engine needs from the hosted backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Insert an order and return the stored row
    async fn create_order(&self, order: &NewOrder) -> AppResult<OrderRecord>;

    /// Push token of the admin device from the shared settings record
    async fn admin_push_token(&self) -> AppResult<Option<String>>;

    /// Store this device's push token as the admin token
    async fn set_admin_push_token(&self, session: &Session, token: &str) -> AppResult<()>;

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session>;

    /// Returns no session when the account still needs email confirmation
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> AppResult<Option<Session>>;

    async fn sign_out(&self, session: &Session) -> AppResult<()>;

    /// Attribute an existing order to the session's user
    async fn link_order_to_user(&self, session: &Session, order_id: OrderId) -> AppResult<()>;

    /// Orders attributed to the session's user, newest first
    async fn list_orders(&self, session: &Session) -> AppResult<Vec<OrderRecord>>;

    /// Email a password reset link that opens `redirect_to`
    async fn reset_password(&self, email: &str, redirect_to: &str) -> AppResult<()>;

    async fn update_password(&self, session: &Session, new_password: &str) -> AppResult<()>;

    /// Cheap reachability check used by the connectivity probe
    async fn health(&self) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_claim() {
        assert_eq!(Role::from_claim(Some("admin")), Role::Admin);
        assert_eq!(Role::from_claim(Some(" Admin ")), Role::Admin);
        assert_eq!(Role::from_claim(Some("authenticated")), Role::Customer);
        assert_eq!(Role::from_claim(None), Role::Customer);
    }

    #[test]
    fn test_session_slot_is_shared_between_clones() {
        let slot = SessionSlot::new();
        let reader = slot.clone();
        assert!(reader.get().is_none());

        slot.set(Some(Session {
            access_token: "token".to_string(),
            user_id: "user-1".to_string(),
            email: "user@example.com".to_string(),
            role: Role::Customer,
        }));
        assert_eq!(reader.user_id().as_deref(), Some("user-1"));

        assert!(reader.take().is_some());
        assert!(slot.get().is_none());
    }
}
