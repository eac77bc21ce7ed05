// SPDX-License-Identifier: AGPL-3.0
// Off Fire Core - Offline submission queue
//
// Submissions made without connectivity are kept as one JSON array under a
// fixed key. Every operation reads and rewrites the whole array.

use crate::kv::KeyValueStore;
use crate::types::{
    AppError, AppResult, LocalId, OrderPayload, QueuedSubmission, SubmissionStatus,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage key of the queue
pub const QUEUE_KEY: &str = "@offline_requests";

fn entry_local_id(entry: &Value) -> Option<LocalId> {
    entry.get("localId").and_then(Value::as_i64)
}

/// Persisted, insertion-ordered list of pending submissions
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Raw queue entries. A blob that is not a JSON array is an error, so
    /// writers never replace data they could not read.
    async fn load_entries(&self) -> AppResult<Vec<Value>> {
        let Some(content) = self.store.get(QUEUE_KEY).await? else {
            return Ok(Vec::new());
        };

        serde_json::from_str(&content).map_err(|e| {
            AppError::Serialization(format!("Offline queue is unreadable: {}", e))
        })
    }

    async fn save(&self, entries: &[Value]) -> AppResult<()> {
        let content = serde_json::to_string(entries)?;
        self.store.set(QUEUE_KEY, content).await
    }

    /// Append a submission and return its local id
    pub async fn enqueue(&self, payload: OrderPayload) -> AppResult<LocalId> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load_entries().await?;

        let now = Utc::now();
        let mut local_id = now.timestamp_millis();
        if let Some(highest) = entries.iter().filter_map(entry_local_id).max() {
            if local_id <= highest {
                local_id = highest + 1;
            }
        }

        entries.push(serde_json::to_value(QueuedSubmission {
            local_id,
            payload,
            created_at: now,
            status: SubmissionStatus::OfflinePending,
        })?);

        self.save(&entries).await?;
        tracing::info!("Queued offline submission {} ({} pending)", local_id, entries.len());
        Ok(local_id)
    }

    /// All pending submissions in insertion order. An unreadable blob reads as
    /// empty and unreadable entries are skipped; both stay in storage.
    pub async fn list_all(&self) -> Vec<QueuedSubmission> {
        let entries = match self.load_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to read offline queue: {}", e);
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping unreadable offline submission: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Remove a submission. Unknown ids are ignored.
    pub async fn remove(&self, local_id: LocalId) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load_entries().await?;

        let original_len = entries.len();
        entries.retain(|e| entry_local_id(e) != Some(local_id));
        if entries.len() == original_len {
            tracing::debug!("Offline submission {} not queued, nothing to remove", local_id);
            return Ok(());
        }

        self.save(&entries).await
    }

    /// Drop every pending submission
    pub async fn clear_all(&self) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(QUEUE_KEY).await
    }

    pub async fn len(&self) -> usize {
        self.list_all().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
