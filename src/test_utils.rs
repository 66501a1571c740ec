//! Recording fakes for the discovery backend and the transport.
//!
//! Each fake is paired with a handle that shares its state, so a test can hand
//! the fake to the code under test and still inspect calls or inject events.

use crate::discovery::DiscoveryBackend;
use crate::events::{ConnectionId, DiscoveryEvent, DiscoveryListener, TransportEvent, TransportSink};
use crate::models::DiscoveredService;
use crate::transport::{ReadyState, Transport, TransportConnector};
use anyhow::{Result, bail};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Discovery backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Scan(String, String, String),
    Stop,
    Subscribe,
    RemoveAllListeners,
    Dropped,
}

struct BackendState {
    calls: Vec<BackendCall>,
    listener: Option<DiscoveryListener>,
    ready: bool,
    fail_scan: bool,
    fail_stop: bool,
}

pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

#[derive(Clone)]
pub struct FakeBackendHandle {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub fn new() -> (Self, FakeBackendHandle) {
        let state = Arc::new(Mutex::new(BackendState {
            calls: Vec::new(),
            listener: None,
            ready: true,
            fail_scan: false,
            fail_stop: false,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            FakeBackendHandle { state },
        )
    }
}

impl DiscoveryBackend for FakeBackend {
    fn is_ready(&self) -> bool {
        lock(&self.state).ready
    }

    fn scan(&mut self, service_type: &str, protocol: &str, domain: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(BackendCall::Scan(
            service_type.to_string(),
            protocol.to_string(),
            domain.to_string(),
        ));
        if state.fail_scan {
            bail!("scan refused");
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(BackendCall::Stop);
        if state.fail_stop {
            bail!("stop refused");
        }
        Ok(())
    }

    fn subscribe(&mut self, listener: DiscoveryListener) {
        let mut state = lock(&self.state);
        state.calls.push(BackendCall::Subscribe);
        state.listener = Some(listener);
    }

    fn remove_all_listeners(&mut self) {
        let mut state = lock(&self.state);
        state.calls.push(BackendCall::RemoveAllListeners);
        state.listener = None;
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        lock(&self.state).calls.push(BackendCall::Dropped);
    }
}

impl FakeBackendHandle {
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.state).calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&BackendCall) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|c| matches(c)).count()
    }

    pub fn set_ready(&self, ready: bool) {
        lock(&self.state).ready = ready;
    }

    pub fn fail_scan(&self, fail: bool) {
        lock(&self.state).fail_scan = fail;
    }

    pub fn fail_stop(&self, fail: bool) {
        lock(&self.state).fail_stop = fail;
    }

    pub fn has_listener(&self) -> bool {
        lock(&self.state).listener.is_some()
    }

    /// Delivers `event` to the subscribed listener. Returns `false` when
    /// nothing is subscribed.
    pub fn emit(&self, event: DiscoveryEvent) -> bool {
        let listener = lock(&self.state).listener.clone();
        match listener {
            Some(listener) => {
                listener(event);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(String, ConnectionId),
    Send(ConnectionId, String),
    Close(ConnectionId),
}

struct ConnectorState {
    calls: Vec<TransportCall>,
    transports: Vec<(ConnectionId, Arc<Mutex<ReadyState>>)>,
    sink: Option<TransportSink>,
    fail_connect: bool,
    fail_send: bool,
}

pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
}

#[derive(Clone)]
pub struct FakeConnectorHandle {
    state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    pub fn new() -> (Self, FakeConnectorHandle) {
        let state = Arc::new(Mutex::new(ConnectorState {
            calls: Vec::new(),
            transports: Vec::new(),
            sink: None,
            fail_connect: false,
            fail_send: false,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            FakeConnectorHandle { state },
        )
    }
}

impl TransportConnector for FakeConnector {
    fn connect(
        &mut self,
        url: &str,
        id: ConnectionId,
        sink: TransportSink,
    ) -> Result<Box<dyn Transport>> {
        let mut state = lock(&self.state);
        state.calls.push(TransportCall::Connect(url.to_string(), id));
        if state.fail_connect {
            bail!("connect refused");
        }
        let ready = Arc::new(Mutex::new(ReadyState::Connecting));
        state.transports.push((id, Arc::clone(&ready)));
        state.sink = Some(sink);
        Ok(Box::new(FakeTransport {
            id,
            ready,
            connector: Arc::clone(&self.state),
        }))
    }
}

struct FakeTransport {
    id: ConnectionId,
    ready: Arc<Mutex<ReadyState>>,
    connector: Arc<Mutex<ConnectorState>>,
}

impl Transport for FakeTransport {
    fn ready_state(&self) -> ReadyState {
        *lock(&self.ready)
    }

    fn send(&mut self, text: String) -> Result<()> {
        let mut connector = lock(&self.connector);
        if connector.fail_send {
            bail!("send refused");
        }
        connector.calls.push(TransportCall::Send(self.id, text));
        Ok(())
    }

    fn close(&mut self) {
        let previous = std::mem::replace(&mut *lock(&self.ready), ReadyState::Closed);
        if previous != ReadyState::Closed {
            lock(&self.connector).calls.push(TransportCall::Close(self.id));
        }
    }
}

impl FakeConnectorHandle {
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.state).calls.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Send(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Id handed to the most recent `connect`.
    pub fn last_connection(&self) -> Option<ConnectionId> {
        self.calls().iter().rev().find_map(|c| match c {
            TransportCall::Connect(_, id) => Some(*id),
            _ => None,
        })
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Connect(url, _) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, TransportCall::Connect(..)))
            .count()
    }

    /// Number of transports not yet closed.
    pub fn live_count(&self) -> usize {
        lock(&self.state)
            .transports
            .iter()
            .filter(|(_, ready)| *lock(ready) != ReadyState::Closed)
            .count()
    }

    pub fn fail_connect(&self, fail: bool) {
        lock(&self.state).fail_connect = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        lock(&self.state).fail_send = fail;
    }

    /// Marks transport `id` open.
    pub fn open(&self, id: ConnectionId) {
        if let Some((_, ready)) = lock(&self.state).transports.iter().find(|(t, _)| *t == id) {
            *lock(ready) = ReadyState::Open;
        }
    }

    /// Delivers `event` for `id` through the last sink handed to `connect`.
    pub fn emit(&self, id: ConnectionId, event: TransportEvent) {
        let sink = lock(&self.state).sink.clone();
        if let Some(sink) = sink {
            sink(id, event);
        }
    }
}

pub fn service(name: &str, address: &str, port: u16) -> DiscoveredService {
    DiscoveredService::new(name, [address], port)
}
