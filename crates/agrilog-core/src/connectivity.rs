//! Network reachability monitoring.
//!
//! A [`NetworkProbe`] reports raw platform state. The [`ConnectivityMonitor`]
//! caches it and notifies listeners only when the connected flag changes.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::listeners::{Listeners, Subscription};
use crate::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw network state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    pub has_interface: bool,
    /// `None` when reachability has not been determined.
    pub internet_reachable: Option<bool>,
}

impl NetworkState {
    pub const ONLINE: Self = Self {
        has_interface: true,
        internet_reachable: Some(true),
    };

    pub const OFFLINE: Self = Self {
        has_interface: false,
        internet_reachable: Some(false),
    };

    /// Unknown reachability counts as connected.
    pub const fn is_connected(self) -> bool {
        self.has_interface && !matches!(self.internet_reachable, Some(false))
    }
}

/// Platform source of network state.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn probe(&self) -> NetworkState;
}

/// Probes reachability with an HTTP `HEAD` request.
#[derive(Debug, Clone)]
pub struct HttpNetworkProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpNetworkProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, PROBE_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Remote(format!("Failed to construct HTTP client: {error}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl NetworkProbe for HttpNetworkProbe {
    async fn probe(&self) -> NetworkState {
        match self.client.head(&self.url).send().await {
            Ok(_) => NetworkState::ONLINE,
            Err(error) if error.is_timeout() => NetworkState {
                has_interface: true,
                internet_reachable: None,
            },
            Err(error) if error.is_connect() => NetworkState::OFFLINE,
            Err(error) => {
                tracing::debug!(%error, url = %self.url, "Connectivity probe failed");
                NetworkState {
                    has_interface: true,
                    internet_reachable: Some(false),
                }
            }
        }
    }
}

/// Probe whose state is set by hand.
#[derive(Debug)]
pub struct ManualNetworkProbe {
    state: Mutex<NetworkState>,
}

impl ManualNetworkProbe {
    pub fn new(state: NetworkState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn set(&self, state: NetworkState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn set_connected(&self, connected: bool) {
        self.set(if connected {
            NetworkState::ONLINE
        } else {
            NetworkState::OFFLINE
        });
    }
}

#[async_trait]
impl NetworkProbe for ManualNetworkProbe {
    async fn probe(&self) -> NetworkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cached reachability with transition notifications.
pub struct ConnectivityMonitor {
    probe: Arc<dyn NetworkProbe>,
    interval: Duration,
    state: Mutex<Option<NetworkState>>,
    listeners: Listeners<bool>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn NetworkProbe>, interval: Duration) -> Self {
        Self {
            probe,
            interval,
            state: Mutex::new(None),
            listeners: Listeners::new(),
            poller: Mutex::new(None),
        }
    }

    /// Start polling the probe. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if poller.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let monitor: Weak<Self> = Arc::downgrade(self);
        let interval = self.interval;
        *poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                let state = monitor.probe.probe().await;
                monitor.handle_network_state(state);
            }
        }));
    }

    /// Stop polling.
    pub fn stop(&self) {
        if let Some(task) = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Last known connectivity. `false` until the first probe.
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(NetworkState::is_connected)
    }

    /// Record a raw platform event, notifying listeners on transitions only.
    pub fn handle_network_state(&self, state: NetworkState) {
        let connected = state.is_connected();
        let previous = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(state)
            .map(NetworkState::is_connected);

        if previous == Some(connected) {
            return;
        }
        tracing::debug!(connected, ?state, "Connectivity changed");
        self.listeners.notify(&connected);
    }

    /// Register a callback receiving the new connected flag on each transition.
    pub fn add_listener(&self, callback: impl Fn(&bool) + Send + Sync + 'static) -> Subscription {
        self.listeners.add(callback)
    }

    /// Probe once and update the cached state without notifying.
    pub async fn check_connection(&self) -> bool {
        let state = self.probe.probe().await;
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
        state.is_connected()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
