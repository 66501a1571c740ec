//! The single messaging session and its connection state machine.
//!
//! ```text
//!   idle ──connect──▶ connecting ──Opened──▶ open ──Message──▶ open
//!     ▲                   │                   │
//!     │                   └──Error/Closed──▶ closed ◀──Error/Closed──┘
//!     └──────── disconnect (via closing) ──── any
//! ```
//!
//! Every transport is tagged with a fresh [`ConnectionId`]; events whose id is
//! not the tracked connection come from a superseded transport and are ignored.

use crate::config::SessionConfig;
use crate::error::{Result, ZeroChatError};
use crate::events::{ConnectionId, Notifier, TransportEvent, TransportSink};
use crate::message_log::MessageLog;
use crate::models::{ClientNotification, ConnectionState, DiscoveredService, Message, MessageKind};
use crate::transport::{TextMessagePayload, Transport, TransportConnector, parse_inbound};
use crate::utils::epoch_millis;
use crate::validator::Endpoint;
use tracing::{debug, error, info, warn};

pub struct SessionManager {
    connector: Box<dyn TransportConnector>,
    sink: TransportSink,
    config: SessionConfig,
    notifier: Notifier,
    state: ConnectionState,
    target: Option<DiscoveredService>,
    transport: Option<Box<dyn Transport>>,
    current: Option<ConnectionId>,
    next_connection: u64,
    log: MessageLog,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        connector: Box<dyn TransportConnector>,
        sink: TransportSink,
        notifier: Notifier,
    ) -> Self {
        Self {
            connector,
            sink,
            config,
            notifier,
            state: ConnectionState::Idle,
            target: None,
            transport: None,
            current: None,
            next_connection: 0,
            log: MessageLog::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn target(&self) -> Option<&DiscoveredService> {
        self.target.as_ref()
    }

    pub fn current_connection(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn messages(&self) -> &[Message] {
        self.log.entries()
    }

    /// Starts a session with `service` at the validated `endpoint`.
    ///
    /// Any live transport is closed first and the previous session's log is
    /// cleared before the new connection is opened.
    pub fn connect(
        &mut self,
        service: DiscoveredService,
        endpoint: Endpoint,
    ) -> Result<ConnectionId> {
        self.release_transport();

        if !self.log.is_empty() {
            self.log.clear();
            self.notifier.notify(ClientNotification::MessagesCleared);
        }

        self.next_connection += 1;
        let id = ConnectionId(self.next_connection);
        let url = endpoint.ws_url(&self.config.path);
        info!("{}: connecting to {} at {}", id, service.name, url);

        self.current = Some(id);
        self.target = Some(service);
        self.set_state(ConnectionState::Connecting);

        match self.connector.connect(&url, id, self.sink.clone()) {
            Ok(transport) => {
                self.transport = Some(transport);
                Ok(id)
            }
            Err(e) => {
                error!("{}: failed to create transport: {}", id, e);
                Err(self.fail(ZeroChatError::transport(e.to_string())))
            }
        }
    }

    /// Applies a transport event. Returns `true` when the event ended the
    /// session.
    pub fn handle_event(&mut self, id: ConnectionId, event: TransportEvent) -> bool {
        if self.current != Some(id) {
            debug!("ignoring {:?} from stale transport {}", event, id);
            return false;
        }

        match event {
            TransportEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    debug!("{}: open while {:?}", id, self.state);
                    return false;
                }
                self.set_state(ConnectionState::Open);
                let name = self.target.as_ref().map(|s| s.name.clone()).unwrap_or_default();
                self.append(MessageKind::System, format!("connected to {name}"));
                false
            }
            TransportEvent::Message(raw) => {
                if self.state != ConnectionState::Open {
                    debug!("{}: message while {:?}, dropped", id, self.state);
                    return false;
                }
                let content = match parse_inbound(&raw) {
                    Ok(content) => content,
                    Err(reason) => {
                        debug!("{}", ZeroChatError::MalformedPayload(reason));
                        raw
                    }
                };
                self.append(MessageKind::Received, content);
                false
            }
            TransportEvent::Error(reason) => {
                if !self.state.is_live() {
                    return false;
                }
                warn!("{}: transport error: {}", id, reason);
                self.fail(ZeroChatError::TransportError(reason));
                true
            }
            TransportEvent::Closed { code, reason } => {
                if !self.state.is_live() {
                    return false;
                }
                info!("{}: closed (code {:?}, reason {:?})", id, code, reason);
                self.append(MessageKind::System, "disconnected");
                self.end_session(ConnectionState::Closed);
                true
            }
        }
    }

    /// Sends `text` to the peer and records it as a `sent` message.
    pub fn send(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(self.report(ZeroChatError::EmptyMessage));
        }
        if self.state != ConnectionState::Open {
            return Err(self.report(ZeroChatError::NotConnected));
        }
        let payload = TextMessagePayload::new(text, epoch_millis(), self.config.device_id.as_str());
        let wire = match serde_json::to_string(&payload) {
            Ok(wire) => wire,
            Err(e) => return Err(self.report(ZeroChatError::transport(e.to_string()))),
        };

        let Some(transport) = self.transport.as_mut().filter(|t| t.is_open()) else {
            warn!("send attempted while transport is not open");
            return Err(self.report(ZeroChatError::NotConnected));
        };
        if let Err(e) = transport.send(wire) {
            error!("failed to send message: {}", e);
            return Err(self.report(ZeroChatError::transport(e.to_string())));
        }

        debug!("sent {:?}", text);
        self.append(MessageKind::Sent, text);
        Ok(())
    }

    /// User-initiated teardown. Always ends in `Idle`.
    pub fn disconnect(&mut self) {
        if self.transport.is_some() {
            info!("disconnecting");
            self.set_state(ConnectionState::Closing);
        }
        self.release_transport();
        self.end_session(ConnectionState::Idle);
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.current = None;
    }

    /// Records a terminal failure: the session is destroyed and reported.
    fn fail(&mut self, err: ZeroChatError) -> ZeroChatError {
        self.release_transport();
        self.end_session(ConnectionState::Closed);
        self.report(err)
    }

    fn end_session(&mut self, state: ConnectionState) {
        self.transport = None;
        self.current = None;
        self.set_state(state);
        self.target = None;
    }

    fn report(&self, err: ZeroChatError) -> ZeroChatError {
        self.notifier.error(err.clone());
        err
    }

    fn append(&mut self, kind: MessageKind, content: impl Into<String>) {
        let message = self.log.append(kind, content).clone();
        self.notifier.notify(ClientNotification::MessageAppended(message));
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!("connection state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.notifier.notify(ClientNotification::ConnectionStateChanged {
            state,
            service_name: self.target.as_ref().map(|s| s.name.clone()),
        });
    }
}
