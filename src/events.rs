use crate::error::ZeroChatError;
use crate::models::{ClientNotification, DiscoveredService};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Events emitted by a discovery backend.
///
/// One variant per backend event name; a backend delivers all of them through
/// a single [`DiscoveryListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    Started,
    Stopped,
    /// A service name was seen but not yet resolved.
    Found(String),
    Resolved(DiscoveredService),
    Removed(String),
    Error(String),
}

/// Callback a discovery backend invokes for every event.
pub type DiscoveryListener = Arc<dyn Fn(DiscoveryEvent) + Send + Sync>;

/// Identifies one transport instance. A fresh id is handed out on every
/// connect, so events from a superseded transport can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Events emitted by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

/// Callback a transport invokes for every event, tagged with its id.
pub type TransportSink = Arc<dyn Fn(ConnectionId, TransportEvent) + Send + Sync>;

/// Publishes [`ClientNotification`]s to the presentation layer.
///
/// Sending never blocks: when the channel is full or closed the notification is
/// dropped with a warning, since the core must not stall on a slow renderer.
#[derive(Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::Sender<ClientNotification>>,
}

impl Notifier {
    pub fn new(tx: mpsc::Sender<ClientNotification>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A notifier that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn notify(&self, notification: ClientNotification) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(notification) {
                warn!("dropping client notification: {}", e);
            }
        }
    }

    pub fn error(&self, err: ZeroChatError) {
        self.notify(ClientNotification::Error(err));
    }
}
