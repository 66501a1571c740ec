use std::time::Duration;
use tokio::sync::mpsc;
use zerochat::test_utils::{
    BackendCall, FakeBackend, FakeBackendHandle, FakeConnector, FakeConnectorHandle, service,
};
use zerochat::{
    ClientNotification, ConnectionId, ConnectionState, DiscoveryEvent, MessageKind, ScanState,
    TransportEvent, ValidationError, ZeroChatConfig, ZeroChatError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Running {
    zerochat: zerochat::ZeroChat,
    notes: mpsc::Receiver<ClientNotification>,
    backend: FakeBackendHandle,
    connector: FakeConnectorHandle,
}

async fn run(config: ZeroChatConfig) -> Running {
    let (backend_fake, backend) = FakeBackend::new();
    let (connector_fake, connector) = FakeConnector::new();
    let (tx, notes) = mpsc::channel(256);
    let zerochat = zerochat::start_with(
        config,
        Some(Box::new(backend_fake)),
        Box::new(connector_fake),
        tx,
    )
    .await
    .unwrap();
    Running {
        zerochat,
        notes,
        backend,
        connector,
    }
}

async fn wait_for(
    notes: &mut mpsc::Receiver<ClientNotification>,
    mut matches: impl FnMut(&ClientNotification) -> bool,
) -> ClientNotification {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let note = notes.recv().await.expect("notification channel closed");
            if matches(&note) {
                return note;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

/// Marks the latest transport open and reports it, like a real handshake.
fn open_latest(connector: &FakeConnectorHandle) -> ConnectionId {
    let id = connector.last_connection().expect("a transport was created");
    connector.open(id);
    connector.emit(id, TransportEvent::Opened);
    id
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scan_on_start_and_deduplicated_registry() {
    let mut r = run(ZeroChatConfig::default()).await;
    let client = r.zerochat.client();

    wait_for(&mut r.notes, |n| {
        *n == ClientNotification::ScanStateChanged(ScanState::Scanning)
    })
    .await;
    assert_eq!(r.backend.count(|c| matches!(c, BackendCall::Scan(..))), 1);

    r.backend.emit(DiscoveryEvent::Resolved(service("Mac-1", "192.168.1.5", 8080)));
    r.backend.emit(DiscoveryEvent::Resolved(service("Mac-1", "192.168.1.9", 9999)));
    r.backend.emit(DiscoveryEvent::Resolved(service("Mac-2", "192.168.1.6", 8080)));

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.scan_state, ScanState::Scanning);
    let names: Vec<_> = snapshot.services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Mac-1", "Mac-2"]);
    assert_eq!(snapshot.services[0].addresses, vec!["192.168.1.5"]);

    r.backend.emit(DiscoveryEvent::Removed("Mac-1".into()));
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.services.len(), 1);

    r.zerochat.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_session_roundtrip_through_actor() {
    let mut r = run(ZeroChatConfig::default()).await;
    let client = r.zerochat.client();

    r.backend.emit(DiscoveryEvent::Resolved(service("Mac-1", "10.0.0.2", 9000)));
    client.connect_by_name("Mac-1").await.unwrap();
    assert_eq!(r.connector.urls(), vec!["ws://10.0.0.2:9000/ws"]);
    assert_eq!(r.backend.count(|c| *c == BackendCall::Stop), 1);

    let id = open_latest(&r.connector);
    wait_for(&mut r.notes, |n| {
        matches!(
            n,
            ClientNotification::ConnectionStateChanged {
                state: ConnectionState::Open,
                ..
            }
        )
    })
    .await;

    r.connector.emit(id, TransportEvent::Message(r#"{"content":"hi"}"#.into()));
    client.send("  hello  ").await.unwrap();

    let sent = r.connector.sent();
    assert_eq!(sent.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(payload["type"], "text_message");
    assert_eq!(payload["content"], "hello");

    let snapshot = client.snapshot().await.unwrap();
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
    assert!(snapshot.messages.windows(2).all(|w| w[0].id < w[1].id));

    client.disconnect().await.unwrap();
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.connection_state, ConnectionState::Idle);
    assert_eq!(snapshot.connected_service, None);

    r.zerochat.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_errors_are_returned_and_notified() {
    let mut r = run(ZeroChatConfig::default()).await;
    let client = r.zerochat.client();

    let err = client
        .connect(service("Mac-1", "fe80::1", 9000))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ZeroChatError::InvalidAddress(ValidationError::InvalidFormat("fe80::1".into()))
    );
    wait_for(&mut r.notes, |n| *n == ClientNotification::Error(err.clone())).await;
    assert_eq!(r.connector.connect_count(), 0);

    assert_eq!(client.send("hi").await, Err(ZeroChatError::NotConnected));
    assert_eq!(
        client.connect_by_name("ghost").await,
        Err(ZeroChatError::UnknownService("ghost".into()))
    );

    r.zerochat.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stale_close_after_reconnect_is_ignored() {
    let r = run(ZeroChatConfig::default()).await;
    let client = r.zerochat.client();

    client.connect(service("Mac-1", "10.0.0.2", 9000)).await.unwrap();
    let first = open_latest(&r.connector);
    client.connect(service("Mac-2", "10.0.0.3", 9000)).await.unwrap();
    let second = open_latest(&r.connector);
    assert_ne!(first, second);

    r.connector.emit(
        first,
        TransportEvent::Closed {
            code: Some(1000),
            reason: String::new(),
        },
    );

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.connection_state, ConnectionState::Open);
    assert_eq!(snapshot.connected_service.as_deref(), Some("Mac-2"));
    assert!(snapshot.messages.iter().all(|m| m.content != "disconnected"));

    r.zerochat.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_unsubscribes_backend() {
    let r = run(ZeroChatConfig::default()).await;
    let client = r.zerochat.client();
    client.connect(service("Mac-1", "10.0.0.2", 9000)).await.unwrap();
    let id = open_latest(&r.connector);

    r.zerochat.shutdown().await.unwrap();

    assert_eq!(r.backend.count(|c| *c == BackendCall::RemoveAllListeners), 1);
    assert!(!r.backend.has_listener());
    assert_eq!(r.backend.calls().last(), Some(&BackendCall::Dropped));
    assert_eq!(r.connector.last_connection(), Some(id));
    assert_eq!(r.connector.live_count(), 0);
    assert!(matches!(
        client.snapshot().await,
        Err(ZeroChatError::ActorUnavailable(_))
    ));
}

#[tokio::test]
async fn test_without_backend_reports_unavailable() {
    let (connector, _handle) = FakeConnector::new();
    let (tx, mut notes) = mpsc::channel(16);
    let zerochat = zerochat::start_with(ZeroChatConfig::default(), None, Box::new(connector), tx)
        .await
        .unwrap();

    wait_for(&mut notes, |n| {
        matches!(n, ClientNotification::Error(ZeroChatError::BackendUnavailable(_)))
    })
    .await;
    let client = zerochat.client();
    assert!(matches!(
        client.start_scan().await,
        Err(ZeroChatError::BackendUnavailable(_))
    ));
    assert_eq!(client.snapshot().await.unwrap().scan_state, ScanState::Idle);

    zerochat.shutdown().await.unwrap();
}
