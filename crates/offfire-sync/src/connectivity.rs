// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Connectivity monitor
//
// Holds the latest network snapshot and wakes subscribers whenever the
// connected or reachable flag changes. No debouncing: a flapping link
// produces one notification per flip.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionType {
    #[default]
    Unknown,
    None,
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

/// Snapshot of the platform network state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub connected: bool,
    pub internet_reachable: bool,
    #[serde(default)]
    pub connection_type: ConnectionType,
}

impl NetworkState {
    pub fn online() -> Self {
        Self {
            connected: true,
            internet_reachable: true,
            connection_type: ConnectionType::Unknown,
        }
    }

    pub fn offline() -> Self {
        Self {
            connected: false,
            internet_reachable: false,
            connection_type: ConnectionType::None,
        }
    }

    /// Online means connected and able to reach the internet
    pub fn is_online(&self) -> bool {
        self.connected && self.internet_reachable
    }

    fn same_flags(&self, other: &NetworkState) -> bool {
        self.connected == other.connected && self.internet_reachable == other.internet_reachable
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::offline()
    }
}

/// Shared connectivity state. Clones observe and publish the same state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<NetworkState>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> NetworkState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Publish a new snapshot. Returns true when subscribers were notified.
    pub fn update(&self, state: NetworkState) -> bool {
        let notified = self.tx.send_if_modified(|current| {
            let flags_changed = !current.same_flags(&state);
            *current = state;
            flags_changed
        });

        if notified {
            tracing::info!(
                "Connectivity changed: connected={}, reachable={}, type={:?}",
                state.connected,
                state.internet_reachable,
                state.connection_type
            );
        }
        notified
    }

    pub fn subscribe(&self) -> ConnectivityWatcher {
        ConnectivityWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(NetworkState::default())
    }
}

/// Receives connectivity changes published after it was created
pub struct ConnectivityWatcher {
    rx: watch::Receiver<NetworkState>,
}

impl ConnectivityWatcher {
    /// Wait for the next flag change. None once the monitor is gone.
    pub async fn changed(&mut self) -> Option<NetworkState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn current(&self) -> NetworkState {
        *self.rx.borrow()
    }
}
