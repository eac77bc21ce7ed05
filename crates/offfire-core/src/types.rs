// SPDX-License-Identifier: AGPL-3.0
// Off Fire Core - Type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Locally generated identifier of a queued submission (milliseconds since epoch)
pub type LocalId = i64;

/// Backend-assigned order id
pub type OrderId = i64;

pub type AppResult<T> = Result<T, AppError>;

/// Fields of a quote request, in the shape accepted by the remote orders table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    #[serde(alias = "name")]
    pub client_name: String,
    pub phone: String,
    #[serde(default)]
    pub service_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Public URL of an attached plan or document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Account that placed the order, when signed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Fields this crate does not know about, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderPayload {
    pub fn new(client_name: impl Into<String>, phone: impl Into<String>, service_id: i64) -> Self {
        Self {
            client_name: client_name.into(),
            phone: phone.into(),
            service_id: Some(service_id),
            ..Default::default()
        }
    }

    /// Check the fields the backend requires before anything is sent or queued
    pub fn validate(&self) -> AppResult<()> {
        if self.client_name.trim().is_empty() {
            return Err(AppError::Validation("Client name is required".to_string()));
        }

        let phone = self.phone.trim();
        let digits = phone.strip_prefix('+').unwrap_or(phone);
        if digits.len() < 7 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation(format!("Invalid phone number: {}", self.phone)));
        }

        if self.service_id.is_none() {
            return Err(AppError::Validation("Service is required".to_string()));
        }

        Ok(())
    }
}

/// Status of a queued submission. Queued records never leave this state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    OfflinePending,
}

/// A submission recorded while offline, waiting for the sync engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedSubmission {
    pub local_id: LocalId,
    pub payload: OrderPayload,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: SubmissionStatus,
}

/// Columns of an order row that are set by this crate or by the backend,
/// never by the caller's extra fields
pub const RESERVED_ORDER_KEYS: &[&str] = &["id", "status", "was_offline", "synced_at", "created_at"];

/// Row sent to the remote "create order" operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    #[serde(flatten)]
    pub payload: OrderPayload,
    pub status: String,
    pub was_offline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl NewOrder {
    fn without_reserved_keys(mut payload: OrderPayload) -> OrderPayload {
        payload.extra.retain(|key, _| {
            let reserved = RESERVED_ORDER_KEYS.contains(&key.as_str());
            if reserved {
                tracing::warn!("Dropping reserved field {:?} from order payload", key);
            }
            !reserved
        });
        payload
    }

    /// Order submitted while online
    pub fn direct(payload: OrderPayload) -> Self {
        Self {
            payload: Self::without_reserved_keys(payload),
            status: "pending".to_string(),
            was_offline: false,
            synced_at: None,
        }
    }

    /// Order replayed from the offline queue
    pub fn replayed(submission: &QueuedSubmission, synced_at: DateTime<Utc>) -> Self {
        Self {
            payload: Self::without_reserved_keys(submission.payload.clone()),
            status: "pending".to_string(),
            was_offline: true,
            synced_at: Some(synced_at),
        }
    }
}

/// Order as returned by the backend after insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Aggregate result of one flush of the offline queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub total: usize,
    pub synced: usize,
    pub failed: usize,
    /// Connectivity dropped before every record was attempted
    pub interrupted: bool,
}

/// What happens when a flush is requested while another one is running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlapPolicy {
    /// Both flushes run and may submit the same record twice
    Allow,
    /// The later flush returns immediately
    #[default]
    SkipWhenBusy,
}

/// Application settings, stored as settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Base URL of the hosted backend (REST + auth)
    pub backend_url: String,
    /// Public anon key sent as `apikey`
    #[serde(default)]
    pub anon_key: String,
    /// Remote push endpoint
    #[serde(default = "default_push_endpoint")]
    pub push_endpoint: String,
    /// Interval of the background sync timer
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Interval of the connectivity probe
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// Timeout applied to every backend request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
    /// Derive connectivity from backend health checks. Off when the host
    /// reports network state itself.
    #[serde(default = "default_true")]
    pub probe_enabled: bool,
    /// Schedule the daily and weekly local reminders
    #[serde(default = "default_true")]
    pub reminders_enabled: bool,
}

fn default_push_endpoint() -> String {
    "https://exp.host/--/api/v2/push/send".to_string()
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            push_endpoint: default_push_endpoint(),
            sync_interval_secs: default_sync_interval_secs(),
            probe_interval_secs: default_probe_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            overlap_policy: OverlapPolicy::default(),
            probe_enabled: true,
            reminders_enabled: true,
        }
    }
}

impl AppSettings {
    pub fn validate(&self) -> AppResult<()> {
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(AppError::InvalidConfig(format!(
                "backendUrl must be an http(s) URL, got {:?}",
                self.backend_url
            )));
        }
        if self.sync_interval_secs == 0 || self.probe_interval_secs == 0 {
            return Err(AppError::InvalidConfig(
                "Intervals must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Coarse error category used for user-facing messages and the error log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Server,
    Auth,
    Validation,
    Storage,
    Timeout,
    Unknown,
}

/// Well-known backend (Postgres / REST gateway) error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFailure {
    UniqueViolation,
    ForeignKeyViolation,
    InsufficientPrivilege,
    NotFound,
    Other,
}

impl BackendFailure {
    pub fn from_code(code: &str) -> Self {
        match code {
            "23505" => Self::UniqueViolation,
            "23503" => Self::ForeignKeyViolation,
            "42501" => Self::InsufficientPrivilege,
            "PGRST116" => Self::NotFound,
            _ => Self::Other,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::UniqueViolation => "This record already exists",
            Self::ForeignKeyViolation => "This record is referenced by other records",
            Self::InsufficientPrivilege => "You are not allowed to perform this operation",
            Self::NotFound => "The requested resource was not found",
            Self::Other => "A database error occurred",
        }
    }
}

/// Error types for the application
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("No internet connection")]
    Offline,

    #[error("Backend error {code}: {message}")]
    Backend { code: String, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Push delivery failed: {0}")]
    Push(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Offline | Self::Push(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Backend { code, .. } => match BackendFailure::from_code(code) {
                BackendFailure::InsufficientPrivilege => ErrorKind::Auth,
                _ => ErrorKind::Server,
            },
            Self::Auth(_) => ErrorKind::Auth,
            Self::Validation(_) => ErrorKind::Validation,
            Self::FileIo(_) | Self::Serialization(_) => ErrorKind::Storage,
            Self::InvalidConfig(_) => ErrorKind::Unknown,
        }
    }

    /// Backend failure class, if this error came from the backend
    pub fn backend_failure(&self) -> Option<BackendFailure> {
        match self {
            Self::Backend { code, .. } => Some(BackendFailure::from_code(code)),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileIo(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}
