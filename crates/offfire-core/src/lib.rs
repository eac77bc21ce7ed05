// SPDX-License-Identifier: AGPL-3.0
// Off Fire Core - Shared logic for the submission engine
//
// This crate provides:
// - AppSettings, AppError and the submission data model
// - KeyValueStore with file-backed and in-memory implementations
// - OfflineQueue for submissions made without connectivity
// - Preferences and ErrorLog persisted through the key-value store
// - SettingsStore for the on-disk configuration file
//
// Network-facing code lives in offfire-sync.

pub mod error_log;
pub mod kv;
pub mod preferences;
pub mod queue;
pub mod settings;
pub mod types;

// Re-export commonly used items
pub use error_log::{ErrorEntry, ErrorLog};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use preferences::{Language, Preferences};
pub use queue::OfflineQueue;
pub use settings::SettingsStore;
pub use types::{
    AppError, AppResult, AppSettings, BackendFailure, ErrorKind, LocalId, NewOrder, OrderId,
    OrderPayload, OrderRecord, OverlapPolicy, QueuedSubmission, SubmissionStatus, SyncReport,
};
