//! # ZeroChat: Zero-configuration LAN messaging
//!
//! This library finds peers advertising `_easypasta._tcp.local.` over mDNS and
//! holds a single WebSocket text session with one of them at a time.
//!
//! It takes care of browsing, deduplicating what the network reports, checking
//! addresses before connecting, and keeping an ordered log of what was sent and
//! received, so the application only has to render state and forward intents.
//!
//! ## Key Concepts
//!
//! - **`ZeroChatConfig`**: Service type, scan policy and session settings,
//!   typically loaded from a TOML file. Every field has a default.
//!
//! - **`ZeroChatClient`**: An async handle for user intents (scan, connect,
//!   send, disconnect). All intents and all network events are applied by one
//!   actor, in order.
//!
//! - **`ClientNotification`**: Everything that changes (scan state, the list of
//!   services, connection state, new messages, errors) is pushed to the channel
//!   you pass to [`start`].
//!
//! - **`DiscoveryBackend` / `TransportConnector`**: The seams towards the
//!   network. [`start`] uses mDNS and WebSockets; [`start_with`] takes your own.
//!
//! ## Quickstart Example
//!
//! ```no_run
//! use anyhow::Result;
//! use tokio::sync::mpsc;
//! use tracing::{error, info};
//! use zerochat::{ClientNotification, ConnectionState, ZeroChatConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     tracing_subscriber::fmt::init();
//!
//!     // 1. Load configuration (or use the defaults).
//!     let config = ZeroChatConfig::default();
//!
//!     // 2. Start the core. Scanning begins right away.
//!     let (tx, mut notifications) = mpsc::channel(64);
//!     let zerochat = zerochat::start(config, tx).await?;
//!     let client = zerochat.client();
//!
//!     // 3. React to notifications: connect to the first peer, say hello.
//!     while let Some(notification) = notifications.recv().await {
//!         match notification {
//!             ClientNotification::ServiceDiscovered(service) => {
//!                 info!("Found {}", service.name);
//!                 client.connect(service).await?;
//!             }
//!             ClientNotification::ConnectionStateChanged {
//!                 state: ConnectionState::Open,
//!                 ..
//!             } => {
//!                 client.send("hello").await?;
//!             }
//!             ClientNotification::MessageAppended(message) => {
//!                 info!("[{}] {:?}: {}", message.timestamp, message.kind, message.content);
//!             }
//!             ClientNotification::Error(e) => error!("{}", e),
//!             _ => {}
//!         }
//!     }
//!
//!     // When ready to shut down:
//!     zerochat.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod manager;
pub mod mdns;
pub mod message_log;
pub mod models;
pub mod registry;
pub mod session;
pub mod transport;
pub mod validator;
mod utils;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Re-export public-facing components.
pub use client::ZeroChatClient;
pub use config::ZeroChatConfig;
pub use discovery::DiscoveryBackend;
pub use error::{Result, ValidationError, ZeroChatError};
pub use events::{ConnectionId, DiscoveryEvent, DiscoveryListener, TransportEvent, TransportSink};
pub use manager::{ZeroChat, start, start_with};
pub use models::{
    ChatSnapshot, ClientNotification, ConnectionState, DiscoveredService, Message, MessageKind,
    ScanState,
};
pub use transport::{ReadyState, Transport, TransportConnector, WsConnector};
