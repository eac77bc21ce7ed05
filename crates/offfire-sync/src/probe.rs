// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Connectivity probe
//
// Headless hosts have no platform network API, so connectivity is derived
// from the backend's health endpoint:
// - success: connected and reachable
// - connect failure: disconnected
// - anything else (timeout, error status): connected but not reachable

use crate::backend::Backend;
use crate::connectivity::{ConnectionType, ConnectivityMonitor, NetworkState};
use crate::task::BackgroundTask;
use offfire_core::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub struct ConnectivityProbe {
    backend: Arc<dyn Backend>,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(backend: Arc<dyn Backend>, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// Run one health check and derive the network state from it
    pub async fn check(&self) -> NetworkState {
        match self.backend.health().await {
            Ok(()) => NetworkState::online(),
            Err(AppError::Network(e)) => {
                tracing::debug!("Probe cannot reach backend: {}", e);
                NetworkState::offline()
            }
            Err(AppError::Offline) => NetworkState::offline(),
            Err(e) => {
                tracing::debug!("Probe reached network but backend is unhealthy: {}", e);
                NetworkState {
                    connected: true,
                    internet_reachable: false,
                    connection_type: ConnectionType::Unknown,
                }
            }
        }
    }

    /// Poll at the configured interval and publish every result to `monitor`
    pub fn start(self, monitor: ConnectivityMonitor) -> BackgroundTask {
        BackgroundTask::spawn("connectivity-probe", move |mut shutdown| async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => {
                        let state = self.check().await;
                        monitor.update(state);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[tokio::test]
    async fn test_health_result_maps_to_state() {
        let backend = Arc::new(FakeBackend::new());
        let probe = ConnectivityProbe::new(backend.clone(), Duration::from_secs(1));

        assert!(probe.check().await.is_online());

        backend.set_health(Some(AppError::Network("refused".to_string())));
        assert_eq!(probe.check().await, NetworkState::offline());

        backend.set_health(Some(AppError::Timeout("slow".to_string())));
        let state = probe.check().await;
        assert!(state.connected);
        assert!(!state.internet_reachable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_publishes_changes() {
        let backend = Arc::new(FakeBackend::new());
        let monitor = ConnectivityMonitor::new(NetworkState::offline());
        let mut watcher = monitor.subscribe();

        let handle = ConnectivityProbe::new(backend.clone(), Duration::from_secs(15))
            .start(monitor.clone());

        assert!(watcher.changed().await.unwrap().is_online());

        backend.set_health(Some(AppError::Network("refused".to_string())));
        assert!(!watcher.changed().await.unwrap().is_online());

        handle.stop().await;
    }
}
