// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Session handling
//
// Holds the current session in a SessionSlot shared with the REST backend
// and the submitter, so requests and new orders are made as the signed-in
// user. An admin signing in on a device with a registered push token
// publishes that token so new orders reach it.

use crate::backend::{Backend, Session, SessionSlot, SignUpProfile};
use offfire_core::{AppError, AppResult, ErrorLog, OrderId, OrderRecord, Preferences};
use std::sync::Arc;

/// Deep link opened by the password reset email
pub const PASSWORD_RESET_REDIRECT: &str = "offfire://profile/change-password";

const MIN_PASSWORD_LEN: usize = 6;

/// What happened to the admin push token during sign-in
#[derive(Debug, Clone, PartialEq)]
pub enum TokenSync {
    NotAdmin,
    NoDeviceToken,
    Updated,
    Failed(AppError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignInOutcome {
    pub session: Session,
    pub token_sync: TokenSync,
}

pub struct AuthService {
    backend: Arc<dyn Backend>,
    preferences: Arc<Preferences>,
    error_log: Option<Arc<ErrorLog>>,
    session: SessionSlot,
}

impl AuthService {
    pub fn new(backend: Arc<dyn Backend>, preferences: Arc<Preferences>) -> Self {
        Self {
            backend,
            preferences,
            error_log: None,
            session: SessionSlot::new(),
        }
    }

    pub fn with_error_log(mut self, error_log: Arc<ErrorLog>) -> Self {
        self.error_log = Some(error_log);
        self
    }

    /// Publish the session through `session` instead of a private slot
    pub fn with_session(mut self, session: SessionSlot) -> Self {
        self.session = session;
        self
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<SignInOutcome> {
        let session = match self.backend.sign_in(email.trim(), password).await {
            Ok(session) => session,
            Err(e) => {
                self.log_error("auth.sign_in", &e).await;
                return Err(e);
            }
        };
        tracing::info!(role = ?session.role, "Signed in as {}", session.email);

        let token_sync = self.sync_admin_token(&session).await;
        self.session.set(Some(session.clone()));

        Ok(SignInOutcome {
            session,
            token_sync,
        })
    }

    /// Register an account. A returned outcome means no confirmation step.
    ///
    /// `link_order` attributes an order placed before the account existed.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
        link_order: Option<OrderId>,
    ) -> AppResult<Option<SignInOutcome>> {
        if profile.full_name.trim().is_empty() {
            return Err(AppError::Validation("Full name is required".to_string()));
        }
        validate_password(password)?;

        let session = match self.backend.sign_up(email.trim(), password, profile).await {
            Ok(session) => session,
            Err(e) => {
                self.log_error("auth.sign_up", &e).await;
                return Err(e);
            }
        };

        let Some(session) = session else {
            tracing::info!("Signed up {}, awaiting email confirmation", email.trim());
            self.session.set(None);
            return Ok(None);
        };
        tracing::info!("Signed up and signed in as {}", session.email);

        let token_sync = self.sync_admin_token(&session).await;
        self.session.set(Some(session.clone()));

        if let Some(order_id) = link_order {
            // The account exists either way
            if let Err(e) = self.link_order(order_id).await {
                tracing::warn!("Failed to link order #{}: {}", order_id, e);
            }
        }

        Ok(Some(SignInOutcome {
            session,
            token_sync,
        }))
    }

    /// End the session. The local session is cleared even if the backend call fails.
    pub async fn sign_out(&self) -> AppResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        if let Err(e) = self.backend.sign_out(&session).await {
            tracing::warn!("Backend sign-out failed: {}", e);
            self.log_error("auth.sign_out", &e).await;
            return Err(e);
        }

        tracing::info!("Signed out {}", session.email);
        Ok(())
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.get()
    }

    pub async fn is_admin(&self) -> bool {
        self.session.get().as_ref().is_some_and(Session::is_admin)
    }

    /// Attribute an existing order to the signed-in user
    pub async fn link_order(&self, order_id: OrderId) -> AppResult<()> {
        let session = self.require_session()?;
        if let Err(e) = self.backend.link_order_to_user(&session, order_id).await {
            self.log_error("auth.link_order", &e).await;
            return Err(e);
        }
        Ok(())
    }

    /// Orders placed by the signed-in user, newest first
    pub async fn my_orders(&self) -> AppResult<Vec<OrderRecord>> {
        let session = self.require_session()?;
        match self.backend.list_orders(&session).await {
            Ok(orders) => Ok(orders),
            Err(e) => {
                self.log_error("auth.my_orders", &e).await;
                Err(e)
            }
        }
    }

    pub async fn reset_password(&self, email: &str) -> AppResult<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::Validation("Email is required".to_string()));
        }

        if let Err(e) = self.backend.reset_password(email, PASSWORD_RESET_REDIRECT).await {
            self.log_error("auth.reset_password", &e).await;
            return Err(e);
        }
        tracing::info!("Password reset requested for {}", email);
        Ok(())
    }

    pub async fn update_password(&self, new_password: &str) -> AppResult<()> {
        validate_password(new_password)?;
        let session = self.require_session()?;

        if let Err(e) = self.backend.update_password(&session, new_password).await {
            self.log_error("auth.update_password", &e).await;
            return Err(e);
        }
        tracing::info!("Password updated for {}", session.email);
        Ok(())
    }

    fn require_session(&self) -> AppResult<Session> {
        self.session
            .get()
            .ok_or_else(|| AppError::Auth("Not signed in".to_string()))
    }

    async fn sync_admin_token(&self, session: &Session) -> TokenSync {
        if !session.is_admin() {
            return TokenSync::NotAdmin;
        }

        let token = match self.preferences.push_token().await {
            Ok(Some(token)) => token,
            Ok(None) => return TokenSync::NoDeviceToken,
            Err(e) => {
                tracing::warn!("Could not read device push token: {}", e);
                self.log_error("auth.admin_token", &e).await;
                return TokenSync::Failed(e);
            }
        };

        match self.backend.set_admin_push_token(session, &token).await {
            Ok(()) => {
                tracing::info!("Admin push token updated");
                TokenSync::Updated
            }
            Err(e) => {
                tracing::warn!("Failed to update admin push token: {}", e);
                self.log_error("auth.admin_token", &e).await;
                TokenSync::Failed(e)
            }
        }
    }

    async fn log_error(&self, context: &str, error: &AppError) {
        if let Some(log) = &self.error_log {
            log.record_quietly(context, error).await;
        }
    }
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
