//! Composition of discovery and session: the whole discovery-to-session
//! lifecycle behind one synchronous API. [`crate::manager`] drives it from a
//! single actor; tests drive it directly.

use crate::config::ZeroChatConfig;
use crate::discovery::{DiscoveryBackend, DiscoveryController};
use crate::error::{Result, ZeroChatError};
use crate::events::{
    ConnectionId, DiscoveryEvent, DiscoveryListener, Notifier, TransportEvent, TransportSink,
};
use crate::models::{ChatSnapshot, DiscoveredService};
use crate::session::SessionManager;
use crate::transport::TransportConnector;
use crate::validator::validate;
use tracing::{debug, warn};

pub struct ChatCore {
    discovery: DiscoveryController,
    session: SessionManager,
    notifier: Notifier,
    resume_on_disconnect: bool,
}

impl ChatCore {
    pub fn new(
        config: &ZeroChatConfig,
        connector: Box<dyn TransportConnector>,
        sink: TransportSink,
        notifier: Notifier,
    ) -> Self {
        Self {
            discovery: DiscoveryController::new(config.discovery.clone(), notifier.clone()),
            session: SessionManager::new(config.session.clone(), connector, sink, notifier.clone()),
            notifier,
            resume_on_disconnect: config.discovery.resume_on_disconnect,
        }
    }

    pub fn attach_backend(
        &mut self,
        backend: Box<dyn DiscoveryBackend>,
        listener: DiscoveryListener,
    ) {
        self.discovery.attach(backend, listener);
    }

    pub fn discovery(&self) -> &DiscoveryController {
        &self.discovery
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn start_scan(&mut self) -> Result<()> {
        self.discovery.start()
    }

    pub fn stop_scan(&mut self) {
        self.discovery.stop();
    }

    /// Validates `service`, stops discovery and opens a session to it.
    ///
    /// A service that fails validation leaves both discovery and the current
    /// session untouched.
    pub fn connect(&mut self, service: DiscoveredService) -> Result<ConnectionId> {
        let endpoint = match validate(&service) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("cannot connect to {}: {}", service.name, e);
                let err = ZeroChatError::from(e);
                self.notifier.error(err.clone());
                return Err(err);
            }
        };
        self.discovery.stop();
        let result = self.session.connect(service, endpoint);
        if result.is_err() {
            // The connector failed synchronously; the session is already closed.
            self.resume_discovery();
        }
        result
    }

    /// Connects to the registered service called `name`.
    pub fn connect_by_name(&mut self, name: &str) -> Result<ConnectionId> {
        let Some(service) = self.discovery.registry().get(name).cloned() else {
            let err = ZeroChatError::UnknownService(name.to_string());
            self.notifier.error(err.clone());
            return Err(err);
        };
        self.connect(service)
    }

    pub fn disconnect(&mut self) {
        let ending = self.session.state().is_live();
        self.session.disconnect();
        if ending {
            self.resume_discovery();
        }
    }

    pub fn send(&mut self, text: &str) -> Result<()> {
        self.session.send(text)
    }

    pub fn handle_discovery_event(&mut self, event: DiscoveryEvent) {
        self.discovery.handle_event(event);
    }

    pub fn handle_transport_event(&mut self, id: ConnectionId, event: TransportEvent) {
        if self.session.handle_event(id, event) {
            self.resume_discovery();
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            scan_state: self.discovery.scan_state(),
            services: self.discovery.services().to_vec(),
            connection_state: self.session.state(),
            connected_service: self.session.target().map(|s| s.name.clone()),
            messages: self.session.messages().to_vec(),
        }
    }

    /// Tears down discovery (stop, unsubscribe, release) and the session.
    pub fn shutdown(&mut self) {
        self.discovery.shutdown();
        self.session.disconnect();
    }

    fn resume_discovery(&mut self) {
        if !self.resume_on_disconnect || !self.discovery.has_backend() {
            return;
        }
        debug!("session ended, resuming discovery");
        // Failures are already reported by the controller.
        let _ = self.discovery.start();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::models::{ClientNotification, ConnectionState, MessageKind, ScanState};
    use crate::test_utils::{
        BackendCall, FakeBackend, FakeBackendHandle, FakeConnector, FakeConnectorHandle,
        TransportCall, service,
    };
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    type Queue<T> = Arc<Mutex<Vec<T>>>;

    /// Backend and transport events land in queues, as they would in the
    /// actor's mailbox, until [`Harness::deliver`] applies them.
    struct Harness {
        core: ChatCore,
        backend: FakeBackendHandle,
        connector: FakeConnectorHandle,
        notes: mpsc::Receiver<ClientNotification>,
        discovery_events: Queue<DiscoveryEvent>,
        transport_events: Queue<(ConnectionId, TransportEvent)>,
    }

    impl Harness {
        fn deliver(&mut self) {
            let discovery: Vec<_> = self.discovery_events.lock().unwrap().drain(..).collect();
            for event in discovery {
                self.core.handle_discovery_event(event);
            }
            let transport: Vec<_> = self.transport_events.lock().unwrap().drain(..).collect();
            for (id, event) in transport {
                self.core.handle_transport_event(id, event);
            }
        }
    }

    fn harness(resume_on_disconnect: bool) -> Harness {
        let mut config = ZeroChatConfig::default();
        config.discovery.resume_on_disconnect = resume_on_disconnect;
        let (tx, notes) = mpsc::channel(256);
        let discovery_events: Queue<DiscoveryEvent> = Arc::default();
        let transport_events: Queue<(ConnectionId, TransportEvent)> = Arc::default();

        let queue = Arc::clone(&transport_events);
        let sink: TransportSink = Arc::new(move |id: ConnectionId, event: TransportEvent| {
            queue.lock().unwrap().push((id, event))
        });
        let (connector, connector_handle) = FakeConnector::new();
        let mut core = ChatCore::new(&config, Box::new(connector), sink, Notifier::new(tx));

        let queue = Arc::clone(&discovery_events);
        let listener: DiscoveryListener =
            Arc::new(move |event: DiscoveryEvent| queue.lock().unwrap().push(event));
        let (backend, backend_handle) = FakeBackend::new();
        core.attach_backend(Box::new(backend), listener);
        Harness {
            core,
            backend: backend_handle,
            connector: connector_handle,
            notes,
            discovery_events,
            transport_events,
        }
    }

    fn drain(notes: &mut mpsc::Receiver<ClientNotification>) -> Vec<ClientNotification> {
        std::iter::from_fn(|| notes.try_recv().ok()).collect()
    }

    fn resolve(core: &mut ChatCore, svc: DiscoveredService) {
        core.handle_discovery_event(DiscoveryEvent::Resolved(svc));
    }

    #[test]
    fn test_invalid_address_never_creates_transport() {
        let mut h = harness(false);
        h.core.start_scan().unwrap();

        let err = h
            .core
            .connect(service("Mac-1", "fe80::1", 9000))
            .unwrap_err();

        assert_eq!(
            err,
            ZeroChatError::InvalidAddress(ValidationError::InvalidFormat("fe80::1".into()))
        );
        assert_eq!(h.connector.connect_count(), 0);
        assert_eq!(h.core.session().state(), ConnectionState::Idle);
        // Discovery is untouched by a rejected connect.
        assert!(!h.backend.calls().contains(&BackendCall::Stop));
        assert!(drain(&mut h.notes).contains(&ClientNotification::Error(err)));
    }

    #[test]
    fn test_connect_without_port_is_no_address() {
        let mut h = harness(false);
        let mut svc = service("Mac-1", "10.0.0.2", 9000);
        svc.port = None;
        assert_eq!(
            h.core.connect(svc),
            Err(ZeroChatError::InvalidAddress(ValidationError::NoAddress))
        );
        assert_eq!(h.connector.connect_count(), 0);
    }

    #[test]
    fn test_connect_stops_discovery_before_opening() {
        let mut h = harness(false);
        h.core.start_scan().unwrap();
        h.core.connect(service("Mac-1", "10.0.0.2", 9000)).unwrap();

        assert!(h.backend.calls().contains(&BackendCall::Stop));
        assert_eq!(h.connector.connect_count(), 1);
        assert_eq!(h.core.session().state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_connect_by_name_uses_registry_entry() {
        let mut h = harness(false);
        assert!(h.backend.emit(DiscoveryEvent::Resolved(service("Mac-1", "192.168.1.5", 8080))));
        assert!(h.backend.emit(DiscoveryEvent::Resolved(service("Mac-1", "192.168.1.5", 9999))));
        h.deliver();

        h.core.connect_by_name("Mac-1").unwrap();
        assert!(matches!(
            &h.connector.calls()[0],
            TransportCall::Connect(url, _) if url == "ws://192.168.1.5:8080/ws"
        ));
    }

    #[test]
    fn test_connect_by_unknown_name() {
        let mut h = harness(false);
        assert_eq!(
            h.core.connect_by_name("ghost"),
            Err(ZeroChatError::UnknownService("ghost".into()))
        );
    }

    #[test]
    fn test_full_session_scenario() {
        let mut h = harness(false);
        let id = h.core.connect(service("Mac-1", "10.0.0.2", 9000)).unwrap();
        h.connector.open(id);
        h.connector.emit(id, TransportEvent::Opened);
        h.connector.emit(id, TransportEvent::Message(r#"{"content":"hi"}"#.into()));
        h.deliver();
        h.core.send("hello").unwrap();

        let snapshot = h.core.snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Open);
        assert_eq!(snapshot.connected_service.as_deref(), Some("Mac-1"));
        let log: Vec<_> = snapshot
            .messages
            .iter()
            .map(|m| (m.kind, m.content.as_str()))
            .collect();
        assert_eq!(
            log,
            vec![
                (MessageKind::System, "connected to Mac-1"),
                (MessageKind::Received, "hi"),
                (MessageKind::Sent, "hello"),
            ]
        );
        assert_eq!(h.connector.sent().len(), 1);
    }

    #[test]
    fn test_disconnect_without_resume_policy_keeps_discovery_stopped() {
        let mut h = harness(false);
        h.core.start_scan().unwrap();
        h.core.connect(service("Mac-1", "10.0.0.2", 9000)).unwrap();
        h.core.handle_discovery_event(DiscoveryEvent::Stopped);
        h.core.disconnect();

        let scans = h
            .backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Scan(..)))
            .count();
        assert_eq!(scans, 1);
        assert_eq!(h.core.discovery().scan_state(), ScanState::Idle);
        assert_eq!(h.core.session().state(), ConnectionState::Idle);
    }

    #[test]
    fn test_resume_policy_restarts_scan_after_disconnect_and_close() {
        let mut h = harness(true);
        let id = h.core.connect(service("Mac-1", "10.0.0.2", 9000)).unwrap();
        h.connector.open(id);
        h.core.handle_transport_event(id, TransportEvent::Opened);
        h.core.handle_transport_event(
            id,
            TransportEvent::Closed {
                code: Some(1001),
                reason: "going away".into(),
            },
        );
        assert_eq!(h.core.discovery().scan_state(), ScanState::Scanning);

        let id = h.core.connect(service("Mac-1", "10.0.0.2", 9000)).unwrap();
        h.connector.open(id);
        h.core.handle_transport_event(id, TransportEvent::Opened);
        h.core.disconnect();
        let scans = h
            .backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Scan(..)))
            .count();
        assert_eq!(scans, 2);
    }

    #[test]
    fn test_disconnect_while_idle_does_not_rescan() {
        let mut h = harness(true);
        h.core.start_scan().unwrap();
        resolve(&mut h.core, service("Mac-1", "10.0.0.2", 9000));

        h.core.disconnect();

        let scans = h
            .backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Scan(..)))
            .count();
        assert_eq!(scans, 1);
        assert!(h.core.discovery().registry().contains("Mac-1"));
    }

    #[test]
    fn test_resume_policy_covers_connector_failure() {
        let mut h = harness(true);
        h.core.start_scan().unwrap();
        h.connector.fail_connect(true);

        let err = h.core.connect(service("Mac-1", "10.0.0.2", 9000)).unwrap_err();

        assert!(matches!(err, ZeroChatError::TransportError(_)));
        assert_eq!(h.core.session().state(), ConnectionState::Closed);
        let calls = h.backend.calls();
        let stop = calls.iter().position(|c| *c == BackendCall::Stop).unwrap();
        let rescan = calls.iter().rposition(|c| matches!(c, BackendCall::Scan(..))).unwrap();
        assert!(stop < rescan);
        assert_eq!(h.core.discovery().scan_state(), ScanState::Scanning);
    }

    #[test]
    fn test_shutdown_releases_backend_and_session() {
        let mut h = harness(false);
        h.core.start_scan().unwrap();
        let id = h.core.connect(service("Mac-1", "10.0.0.2", 9000)).unwrap();
        h.core.shutdown();

        assert!(h.backend.calls().contains(&BackendCall::RemoveAllListeners));
        assert!(h.backend.calls().contains(&BackendCall::Dropped));
        assert!(!h.backend.has_listener());
        assert!(h.connector.calls().contains(&TransportCall::Close(id)));
        assert_eq!(h.core.session().state(), ConnectionState::Idle);
        assert!(matches!(
            h.core.start_scan(),
            Err(ZeroChatError::BackendUnavailable(_))
        ));
    }
}
