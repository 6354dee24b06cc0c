//! Online/visibility signals and the optional reachability probe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use honeycomb_core::{HoneycombError, HoneycombResult};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 32;

/// Environment change reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentEvent {
    Online,
    Offline,
    VisibilityChanged { visible: bool },
}

/// Tracks online and visibility state and broadcasts changes.
///
/// The host application feeds it; the sync engine listens.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
    visible: AtomicBool,
    events: broadcast::Sender<EnvironmentEvent>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            online: AtomicBool::new(online),
            visible: AtomicBool::new(true),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Record the online state. Emits an event only on change.
    pub fn set_online(&self, online: bool) {
        if self.online.swap(online, Ordering::SeqCst) != online {
            let event = if online {
                EnvironmentEvent::Online
            } else {
                EnvironmentEvent::Offline
            };
            self.emit(event);
        }
    }

    /// Record page visibility. Emits an event only on change.
    pub fn set_visible(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::SeqCst) != visible {
            self.emit(EnvironmentEvent::VisibilityChanged { visible });
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnvironmentEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: EnvironmentEvent) {
        // No receivers is fine; nobody is listening yet.
        if self.events.send(event).is_err() {
            debug!(?event, "No environment listeners");
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Checks that a remote endpoint answers.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn check(&self, url: &str, timeout_ms: u64) -> HoneycombResult<()>;
}

/// Probe that sends a `HEAD` request and expects a success status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> HoneycombResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HoneycombError::network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn check(&self, url: &str, timeout_ms: u64) -> HoneycombResult<()> {
        let response = self
            .client
            .head(url)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HoneycombError::timeout("online_check", timeout_ms)
                } else {
                    HoneycombError::network(e.to_string())
                }
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(HoneycombError::network(format!(
                "online check returned {}",
                response.status()
            )))
        }
    }
}
