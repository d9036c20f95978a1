//! Network connectivity monitoring
//!
//! The host platform owns the real connectivity callbacks and feeds them
//! into a [`WatchNetworkMonitor`]; everything else reads the current state or
//! subscribes to changes.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub connected: bool,
    pub connection_type: ConnectionType,
}

impl NetworkState {
    pub fn online(connection_type: ConnectionType) -> Self {
        Self {
            connected: true,
            connection_type,
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }
}

pub trait NetworkMonitor: Send + Sync {
    fn is_connected(&self) -> bool;

    fn connection_type(&self) -> ConnectionType;

    /// Stream of connectivity changes, starting at the current state.
    fn subscribe(&self) -> watch::Receiver<NetworkState>;
}

pub struct WatchNetworkMonitor {
    tx: watch::Sender<NetworkState>,
}

impl WatchNetworkMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn online() -> Self {
        Self::new(NetworkState::online(ConnectionType::Wifi))
    }

    pub fn offline() -> Self {
        Self::new(NetworkState::offline())
    }

    pub fn set_state(&self, state: NetworkState) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::info!(
                connected = state.connected,
                connection_type = ?state.connection_type,
                "Connectivity changed"
            );
        }
    }

    pub fn set_connected(&self, connected: bool) {
        let state = if connected {
            NetworkState::online(ConnectionType::Wifi)
        } else {
            NetworkState::offline()
        };
        self.set_state(state);
    }
}

impl NetworkMonitor for WatchNetworkMonitor {
    fn is_connected(&self) -> bool {
        self.tx.borrow().connected
    }

    fn connection_type(&self) -> ConnectionType {
        self.tx.borrow().connection_type
    }

    fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }
}
