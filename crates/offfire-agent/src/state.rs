// SPDX-License-Identifier: AGPL-3.0
// Off Fire Agent - Application State

use offfire_core::{
    AppError, AppSettings, ErrorLog, FileKeyValueStore, KeyValueStore, OfflineQueue, Preferences,
    SettingsStore,
};
use offfire_sync::{
    default_reminders, AuthService, Backend, BackgroundTask, ConnectivityMonitor,
    ConnectivityProbe, ExpoPushClient, LocalNotifier, LoggingNotifier, NetworkState,
    NotificationDispatcher, PushSender, QuoteSubmitter, ReminderScheduler, RestBackend,
    SessionSlot, SyncEngine,
};
use std::sync::Arc;
use std::time::Duration;

/// Service name used in the weekly maintenance reminder
const DEFAULT_REMINDER_SERVICE: &str = "طفايات الحريق";

/// Everything the command bridge operates on
pub struct AppState {
    pub settings: SettingsStore,
    pub preferences: Arc<Preferences>,
    pub error_log: Arc<ErrorLog>,
    pub queue: Arc<OfflineQueue>,
    pub connectivity: ConnectivityMonitor,
    pub backend: Arc<dyn Backend>,
    pub engine: Arc<SyncEngine>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub submitter: QuoteSubmitter,
    pub auth: AuthService,
}

impl AppState {
    /// Create application state with the stores in the platform directories
    pub async fn new() -> Result<Self, AppError> {
        let settings = SettingsStore::new()?;
        let store: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::new()?);
        Self::with_store(settings, store).await
    }

    /// Wire every service on top of the given stores
    pub async fn with_store(
        settings: SettingsStore,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, AppError> {
        let config = settings.get();
        let session = SessionSlot::new();
        let backend: Arc<dyn Backend> =
            Arc::new(RestBackend::new(&config)?.with_session(session.clone()));
        let push: Arc<dyn PushSender> = Arc::new(ExpoPushClient::new(
            config.push_endpoint.clone(),
            Duration::from_secs(config.request_timeout_secs.max(1)),
        )?);
        let local: Arc<dyn LocalNotifier> = Arc::new(LoggingNotifier);

        let preferences = Arc::new(Preferences::new(store.clone()));
        let error_log = Arc::new(ErrorLog::new(store.clone()));
        let queue = Arc::new(OfflineQueue::new(store));

        // Offline until something reports otherwise
        let connectivity = ConnectivityMonitor::new(NetworkState::offline());

        let dispatcher = Arc::new(
            NotificationDispatcher::new(local, push, backend.clone())
                .with_preferences(preferences.clone())
                .with_error_log(error_log.clone()),
        );

        let engine = Arc::new(
            SyncEngine::new(
                queue.clone(),
                backend.clone(),
                connectivity.clone(),
                config.overlap_policy,
            )
            .with_error_log(error_log.clone()),
        );

        let submitter = QuoteSubmitter::new(
            connectivity.clone(),
            queue.clone(),
            backend.clone(),
            dispatcher.clone(),
        )
        .with_error_log(error_log.clone())
        .with_session(session.clone());

        let auth = AuthService::new(backend.clone(), preferences.clone())
            .with_error_log(error_log.clone())
            .with_session(session);

        Ok(Self {
            settings,
            preferences,
            error_log,
            queue,
            connectivity,
            backend,
            engine,
            dispatcher,
            submitter,
            auth,
        })
    }

    /// Start the probe, the sync loop and the reminders, as configured
    pub async fn start_background(&self) -> Vec<BackgroundTask> {
        let config: AppSettings = self.settings.get();
        let mut tasks = Vec::new();

        if config.probe_enabled {
            let probe = ConnectivityProbe::new(
                self.backend.clone(),
                Duration::from_secs(config.probe_interval_secs),
            );
            tasks.push(probe.start(self.connectivity.clone()));
        }

        tasks.push(
            self.engine
                .start(Duration::from_secs(config.sync_interval_secs)),
        );

        if config.reminders_enabled {
            match default_reminders(DEFAULT_REMINDER_SERVICE) {
                Ok(reminders) => {
                    if !self.preferences.reminders_scheduled().await.unwrap_or(false) {
                        tracing::info!("Scheduling reminders for the first time");
                    }
                    let scheduler = ReminderScheduler::new(self.dispatcher.clone(), reminders);
                    tasks.push(scheduler.start());
                    if let Err(e) = self.preferences.set_reminders_scheduled(true).await {
                        tracing::warn!("Failed to record reminder schedule: {}", e);
                    }
                }
                Err(e) => tracing::error!("Invalid default reminders: {}", e),
            }
        }

        tasks
    }
}
