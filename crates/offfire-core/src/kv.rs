// SPDX-License-Identifier: AGPL-3.0
// Off Fire Core - Key-value persistence
//
// String keys, string values. Every component that persists state
// (offline queue, preferences, error log) goes through this trait.

use crate::types::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// Asynchronous string key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> AppResult<()>;

    /// Removing a missing key succeeds
    async fn remove(&self, key: &str) -> AppResult<()>;
}

/// Key-value store persisted as a single JSON document on disk
pub struct FileKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
    file_path: PathBuf,
}

impl FileKeyValueStore {
    /// Open the store in the platform data directory
    pub fn new() -> Result<Self, AppError> {
        let file_path = Self::get_store_path()?;
        Self::open(file_path)
    }

    /// Open the store at an explicit path, loading it if present
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let file_path = file_path.into();

        let entries = if file_path.exists() {
            let content = fs::read_to_string(&file_path)
                .map_err(|e| AppError::FileIo(format!("Failed to read store: {}", e)))?;

            match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    // Keep the unreadable document for recovery
                    let backup = file_path.with_extension("json.corrupt");
                    tracing::warn!(
                        "Failed to parse store {:?}, moved to {:?} and starting fresh: {}",
                        file_path,
                        backup,
                        e
                    );
                    fs::rename(&file_path, &backup).map_err(|e| {
                        AppError::FileIo(format!("Failed to back up corrupt store: {}", e))
                    })?;
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            entries: Mutex::new(entries),
            file_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Get the path to the store file
    fn get_store_path() -> Result<PathBuf, AppError> {
        let data_dir = directories::ProjectDirs::from("com", "offfire", "offfire")
            .ok_or_else(|| AppError::FileIo("Could not determine data directory".to_string()))?
            .data_dir()
            .to_path_buf();

        // Ensure the directory exists
        fs::create_dir_all(&data_dir)
            .map_err(|e| AppError::FileIo(format!("Failed to create data dir: {}", e)))?;

        Ok(data_dir.join("store.json"))
    }

    /// Write the whole document to a temporary file, then rename it over the store
    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| AppError::Serialization(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.file_path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| AppError::FileIo(format!("Failed to create temp file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| AppError::FileIo(format!("Failed to write store: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| AppError::FileIo(format!("Failed to sync store: {}", e)))?;

        tokio::fs::rename(&temp_path, &self.file_path)
            .await
            .map_err(|e| AppError::FileIo(format!("Failed to replace store: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);

        if let Err(e) = self.persist(&entries).await {
            // Keep memory consistent with what is on disk
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&entries).await {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

/// Volatile store, used when nothing should touch the disk
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
