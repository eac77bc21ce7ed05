// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - REST backend client
//
// Talks to the hosted backend's REST gateway (tables under /rest/v1) and
// auth service (under /auth/v1). Every request carries the anon key; calls
// made on behalf of a user carry the user's bearer token instead.

use crate::backend::{Backend, Role, Session, SessionSlot, SignUpProfile};
use async_trait::async_trait;
use offfire_core::{AppError, AppResult, AppSettings, NewOrder, OrderId, OrderRecord};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Shared settings row holding the admin push token
const SETTINGS_ROW_FILTER: &str = "id=eq.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Rest,
    Auth,
}

/// Error payload of both the REST gateway and the auth service
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<Value>,
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct AppMetadata {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdminTokenRow {
    admin_token: Option<String>,
}

impl TokenResponse {
    fn into_session(self, fallback_email: &str) -> Session {
        Session {
            access_token: self.access_token,
            user_id: self.user.id,
            email: self
                .user
                .email
                .unwrap_or_else(|| fallback_email.to_string()),
            role: Role::from_claim(self.user.app_metadata.role.as_deref()),
        }
    }
}

/// Backend implementation over HTTPS
pub struct RestBackend {
    http_client: Client,
    base_url: String,
    anon_key: String,
    session: SessionSlot,
}

impl RestBackend {
    pub fn new(settings: &AppSettings) -> AppResult<Self> {
        settings.validate()?;

        let timeout = Duration::from_secs(settings.request_timeout_secs.max(1));
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AppError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: settings.backend_url.trim_end_matches('/').to_string(),
            anon_key: settings.anon_key.clone(),
            session: SessionSlot::new(),
        })
    }

    /// Act for the signed-in user whenever the slot holds a session
    pub fn with_session(mut self, session: SessionSlot) -> Self {
        self.session = session;
        self
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Attach the anon key and bearer token.
    /// Without an explicit bearer the current session's token is used, then the anon key.
    fn authorize(&self, builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        let builder = if self.anon_key.is_empty() {
            builder
        } else {
            builder.header("apikey", self.anon_key.as_str())
        };

        let session_token = match bearer {
            Some(_) => None,
            None => self.session.get().map(|s| s.access_token),
        };

        match bearer
            .or(session_token.as_deref())
            .or((!self.anon_key.is_empty()).then_some(self.anon_key.as_str()))
        {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and turn transport failures and error statuses into AppError
    async fn send(&self, builder: RequestBuilder, endpoint: Endpoint) -> AppResult<Response> {
        let response = builder.send().await.map_err(map_transport_error)?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response, endpoint).await)
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(e.to_string())
    } else if e.is_connect() {
        AppError::Network(format!("Cannot connect to backend: {}", e))
    } else if e.is_decode() {
        AppError::Serialization(format!("Failed to parse response: {}", e))
    } else {
        AppError::Network(format!("Request failed: {}", e))
    }
}

async fn error_from_response(response: Response, endpoint: Endpoint) -> AppError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

    let message = body
        .message
        .or(body.error_description)
        .or(body.msg)
        .or(body.error)
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.to_string()
            } else {
                text.clone()
            }
        });

    let code = match body.code {
        Some(Value::String(code)) => code,
        Some(Value::Number(code)) => code.to_string(),
        _ => status.as_u16().to_string(),
    };

    if status.is_server_error() {
        return AppError::Backend { code, message };
    }

    match endpoint {
        Endpoint::Auth => AppError::Auth(message),
        Endpoint::Rest if status.as_u16() == 401 => AppError::Auth(message),
        Endpoint::Rest => AppError::Backend { code, message },
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn create_order(&self, order: &NewOrder) -> AppResult<OrderRecord> {
        let request = self
            .authorize(self.http_client.post(self.rest_url("orders")), None)
            .header("Prefer", "return=representation")
            .json(&[order]);

        let rows: Vec<OrderRecord> = self
            .send(request, Endpoint::Rest)
            .await?
            .json()
            .await
            .map_err(map_transport_error)?;

        let record = rows.into_iter().next().ok_or_else(|| AppError::Backend {
            code: "empty_response".to_string(),
            message: "Insert returned no rows".to_string(),
        })?;

        tracing::info!("Created order #{} for {}", record.id, order.payload.client_name);
        Ok(record)
    }

    async fn admin_push_token(&self) -> AppResult<Option<String>> {
        let url = self.rest_url(&format!("app_settings?{}&select=admin_token", SETTINGS_ROW_FILTER));
        let request = self.authorize(self.http_client.get(url), None);

        let rows: Vec<AdminTokenRow> = self
            .send(request, Endpoint::Rest)
            .await?
            .json()
            .await
            .map_err(map_transport_error)?;

        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.admin_token)
            .filter(|token| !token.trim().is_empty()))
    }

    async fn set_admin_push_token(&self, session: &Session, token: &str) -> AppResult<()> {
        let url = self.rest_url(&format!("app_settings?{}", SETTINGS_ROW_FILTER));
        let request = self
            .authorize(self.http_client.patch(url), Some(&session.access_token))
            .json(&serde_json::json!({ "admin_token": token }));

        self.send(request, Endpoint::Rest).await?;
        tracing::info!("Updated admin push token");
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let request = self
            .authorize(self.http_client.post(self.auth_url("token?grant_type=password")), None)
            .json(&serde_json::json!({ "email": email, "password": password }));

        let token: TokenResponse = self
            .send(request, Endpoint::Auth)
            .await?
            .json()
            .await
            .map_err(map_transport_error)?;

        Ok(token.into_session(email))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> AppResult<Option<Session>> {
        let request = self
            .authorize(self.http_client.post(self.auth_url("signup")), None)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": profile,
            }));

        let body: Value = self
            .send(request, Endpoint::Auth)
            .await?
            .json()
            .await
            .map_err(map_transport_error)?;

        // Without auto-confirm the service answers with the bare user
        if body.get("access_token").is_none() {
            tracing::info!("Sign-up for {} awaits email confirmation", email);
            return Ok(None);
        }

        let token: TokenResponse = serde_json::from_value(body)?;
        Ok(Some(token.into_session(email)))
    }

    async fn sign_out(&self, session: &Session) -> AppResult<()> {
        let request = self.authorize(
            self.http_client.post(self.auth_url("logout")),
            Some(&session.access_token),
        );
        self.send(request, Endpoint::Auth).await?;
        Ok(())
    }

    async fn link_order_to_user(&self, session: &Session, order_id: OrderId) -> AppResult<()> {
        let url = self.rest_url(&format!("orders?id=eq.{}", order_id));
        let request = self
            .authorize(self.http_client.patch(url), Some(&session.access_token))
            .json(&serde_json::json!({ "user_id": session.user_id }));

        self.send(request, Endpoint::Rest).await?;
        tracing::info!("Linked order #{} to {}", order_id, session.email);
        Ok(())
    }

    async fn list_orders(&self, session: &Session) -> AppResult<Vec<OrderRecord>> {
        let request = self
            .authorize(
                self.http_client.get(self.rest_url("orders")),
                Some(&session.access_token),
            )
            .query(&[
                ("user_id", format!("eq.{}", session.user_id)),
                ("order", "created_at.desc".to_string()),
            ]);

        self.send(request, Endpoint::Rest)
            .await?
            .json()
            .await
            .map_err(map_transport_error)
    }

    async fn reset_password(&self, email: &str, redirect_to: &str) -> AppResult<()> {
        let request = self
            .authorize(self.http_client.post(self.auth_url("recover")), None)
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({ "email": email }));

        self.send(request, Endpoint::Auth).await?;
        Ok(())
    }

    async fn update_password(&self, session: &Session, new_password: &str) -> AppResult<()> {
        let request = self
            .authorize(
                self.http_client.put(self.auth_url("user")),
                Some(&session.access_token),
            )
            .json(&serde_json::json!({ "password": new_password }));

        self.send(request, Endpoint::Auth).await?;
        Ok(())
    }

    async fn health(&self) -> AppResult<()> {
        let request = self.authorize(self.http_client.get(self.auth_url("health")), None);
        self.send(request, Endpoint::Auth).await?;
        Ok(())
    }
}
