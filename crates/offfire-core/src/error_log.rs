// SPDX-License-Identifier: AGPL-3.0
// Off Fire Core - Persistent error log
//
// Keeps the most recent failures so background problems (sync, push,
// token updates) can be inspected after the fact.

use crate::kv::KeyValueStore;
use crate::types::{AppError, AppResult, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Maximum number of entries to keep
const MAX_ERROR_ENTRIES: usize = 50;

pub const ERROR_LOG_KEY: &str = "@app_errors";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Where the error happened, e.g. "sync" or "auth.admin_token"
    pub context: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_code: Option<String>,
}

pub struct ErrorLog {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> AppResult<Vec<ErrorEntry>> {
        let Some(content) = self.store.get(ERROR_LOG_KEY).await? else {
            return Ok(Vec::new());
        };

        Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse error log, starting fresh: {}", e);
            Vec::new()
        }))
    }

    /// Record an error, newest first
    pub async fn record(&self, context: &str, error: &AppError) -> AppResult<ErrorEntry> {
        let entry = ErrorEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            context: context.to_string(),
            kind: error.kind(),
            message: error.to_string(),
            backend_code: match error {
                AppError::Backend { code, .. } => Some(code.clone()),
                _ => None,
            },
        };

        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;

        entries.insert(0, entry.clone());

        // Trim to max entries
        if entries.len() > MAX_ERROR_ENTRIES {
            entries.truncate(MAX_ERROR_ENTRIES);
        }

        self.store
            .set(ERROR_LOG_KEY, serde_json::to_string(&entries)?)
            .await?;
        Ok(entry)
    }

    /// Record an error without letting a storage failure escape
    pub async fn record_quietly(&self, context: &str, error: &AppError) {
        if let Err(e) = self.record(context, error).await {
            tracing::error!("Failed to record error from {}: {} ({})", context, error, e);
        }
    }

    pub async fn entries(&self) -> AppResult<Vec<ErrorEntry>> {
        self.load().await
    }

    pub async fn clear(&self) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(ERROR_LOG_KEY).await
    }
}
