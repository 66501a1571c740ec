//! Message-oriented transport to a peer, and the WebSocket implementation.
//!
//! A [`TransportConnector`] opens a [`Transport`] and returns immediately; the
//! connection outcome and all later traffic arrive as [`TransportEvent`]s on
//! the [`TransportSink`], tagged with the [`ConnectionId`] the caller assigned.

use crate::events::{ConnectionId, TransportEvent, TransportSink};
use anyhow::Result as AnyResult;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, warn};

pub const TEXT_MESSAGE_TYPE: &str = "text_message";

/// Outbound wire payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessagePayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub device_id: String,
}

impl TextMessagePayload {
    pub fn new(content: impl Into<String>, timestamp: i64, device_id: impl Into<String>) -> Self {
        Self {
            kind: TEXT_MESSAGE_TYPE.to_string(),
            content: content.into(),
            timestamp,
            device_id: device_id.into(),
        }
    }
}

/// Extracts the `content` field of a structured inbound payload.
///
/// Only a JSON object with a non-empty string `content` qualifies; arrays,
/// bare strings and everything else fail and callers fall back to the raw
/// text.
pub fn parse_inbound(raw: &str) -> Result<String, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    value
        .as_object()
        .and_then(|object| object.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .ok_or_else(|| "payload has no content".to_string())
}

/// Ready state of a transport, as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// A live connection owned by the session manager.
pub trait Transport: Send {
    fn ready_state(&self) -> ReadyState;

    fn send(&mut self, text: String) -> AnyResult<()>;

    /// Begins closing. Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }
}

/// Creates transports.
pub trait TransportConnector: Send {
    fn connect(
        &mut self,
        url: &str,
        id: ConnectionId,
        sink: TransportSink,
    ) -> AnyResult<Box<dyn Transport>>;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

enum WsCommand {
    Send(String),
    Close,
}

/// Opens WebSocket transports on the current tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl TransportConnector for WsConnector {
    fn connect(
        &mut self,
        url: &str,
        id: ConnectionId,
        sink: TransportSink,
    ) -> AnyResult<Box<dyn Transport>> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(ReadyState::Connecting));

        runtime.spawn(run_ws(url.to_string(), id, sink, cmd_rx, Arc::clone(&state)));

        Ok(Box::new(WsTransport { cmd_tx, state }))
    }
}

struct WsTransport {
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    state: Arc<RwLock<ReadyState>>,
}

impl Transport for WsTransport {
    fn ready_state(&self) -> ReadyState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&mut self, text: String) -> AnyResult<()> {
        if !self.is_open() {
            anyhow::bail!("websocket is not open");
        }
        self.cmd_tx
            .send(WsCommand::Send(text))
            .map_err(|_| anyhow::anyhow!("websocket task has exited"))
    }

    fn close(&mut self) {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if matches!(*state, ReadyState::Closing | ReadyState::Closed) {
                return;
            }
            *state = ReadyState::Closing;
        }
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn set_state(state: &RwLock<ReadyState>, next: ReadyState) {
    *state.write().unwrap_or_else(|e| e.into_inner()) = next;
}

/// Connects, then multiplexes socket reads with outbound commands until the
/// connection ends. Always finishes with exactly one `Closed` event.
async fn run_ws(
    url: String,
    id: ConnectionId,
    sink: TransportSink,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    state: Arc<RwLock<ReadyState>>,
) {
    debug!("{}: connecting to {}", id, url);
    let ws_stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                warn!("{}: failed to connect to {}: {}", id, url, e);
                set_state(&state, ReadyState::Closed);
                sink(id, TransportEvent::Error(e.to_string()));
                sink(id, TransportEvent::Closed { code: None, reason: e.to_string() });
                return;
            }
        },
        // Closed (or dropped) before the handshake finished.
        _ = wait_for_close(&mut cmd_rx) => {
            set_state(&state, ReadyState::Closed);
            sink(
                id,
                TransportEvent::Closed {
                    code: None,
                    reason: "closed before open".to_string(),
                },
            );
            return;
        }
    };

    info!("{}: connected to {}", id, url);
    {
        let mut guard = state.write().unwrap_or_else(|e| e.into_inner());
        if *guard == ReadyState::Connecting {
            *guard = ReadyState::Open;
        }
    }
    sink(id, TransportEvent::Opened);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let (code, reason) = loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    sink(id, TransportEvent::Message(text.as_str().to_string()));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("{}: received close frame", id);
                    break match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("{}: websocket read error: {}", id, e);
                    sink(id, TransportEvent::Error(e.to_string()));
                    break (None, e.to_string());
                }
                None => break (None, "stream ended".to_string()),
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(WsCommand::Send(text)) => {
                    if let Err(e) = ws_sink.send(WsMessage::Text(text.into())).await {
                        warn!("{}: websocket write error: {}", id, e);
                        sink(id, TransportEvent::Error(e.to_string()));
                        break (None, e.to_string());
                    }
                }
                Some(WsCommand::Close) | None => {
                    let _ = ws_sink.send(WsMessage::Close(None)).await;
                    let _ = ws_sink.close().await;
                    break (None, "closed by client".to_string());
                }
            },
        }
    };

    set_state(&state, ReadyState::Closed);
    debug!("{}: closed ({:?}, {:?})", id, code, reason);
    sink(id, TransportEvent::Closed { code, reason });
}

async fn wait_for_close(cmd_rx: &mut mpsc::UnboundedReceiver<WsCommand>) {
    loop {
        match cmd_rx.recv().await {
            Some(WsCommand::Close) | None => return,
            // Sends are rejected before open; nothing to buffer.
            Some(WsCommand::Send(_)) => {}
        }
    }
}
