//! Discovery controller: owns the backend handle, the registry and the scan
//! state, and turns backend events into registry updates.

use crate::config::DiscoveryConfig;
use crate::error::{Result, ZeroChatError};
use crate::events::{DiscoveryEvent, DiscoveryListener, Notifier};
use crate::models::{ClientNotification, DiscoveredService, ScanState};
use crate::registry::DiscoveryRegistry;
use anyhow::Result as AnyResult;
use tracing::{debug, error, info, warn};

/// The capabilities the controller needs from a discovery mechanism.
///
/// Backends report everything through the listener given to
/// [`subscribe`](Self::subscribe). After
/// [`remove_all_listeners`](Self::remove_all_listeners) no further events may be
/// delivered.
pub trait DiscoveryBackend: Send {
    /// Whether the backend can currently scan.
    fn is_ready(&self) -> bool {
        true
    }

    fn scan(&mut self, service_type: &str, protocol: &str, domain: &str) -> AnyResult<()>;

    fn stop(&mut self) -> AnyResult<()>;

    fn subscribe(&mut self, listener: DiscoveryListener);

    fn remove_all_listeners(&mut self);
}

pub struct DiscoveryController {
    backend: Option<Box<dyn DiscoveryBackend>>,
    registry: DiscoveryRegistry,
    scan_state: ScanState,
    config: DiscoveryConfig,
    notifier: Notifier,
}

impl DiscoveryController {
    pub fn new(config: DiscoveryConfig, notifier: Notifier) -> Self {
        Self {
            backend: None,
            registry: DiscoveryRegistry::new(),
            scan_state: ScanState::Idle,
            config,
            notifier,
        }
    }

    /// Takes ownership of `backend` and routes its events to `listener`.
    ///
    /// A previously attached backend is torn down first.
    pub fn attach(&mut self, mut backend: Box<dyn DiscoveryBackend>, listener: DiscoveryListener) {
        self.shutdown();
        backend.subscribe(listener);
        self.backend = Some(backend);
        debug!("discovery backend attached");
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn scan_state(&self) -> ScanState {
        self.scan_state
    }

    pub fn registry(&self) -> &DiscoveryRegistry {
        &self.registry
    }

    pub fn services(&self) -> &[DiscoveredService] {
        self.registry.services()
    }

    /// Clears the registry, marks the scan as running and asks the backend
    /// to browse. The backend's own start/stop events reconcile the state.
    pub fn start(&mut self) -> Result<()> {
        if !self.backend.as_ref().is_some_and(|b| b.is_ready()) {
            let err = ZeroChatError::backend_unavailable("discovery backend is not initialized");
            error!("cannot start scan: {}", err);
            self.set_scan_state(ScanState::Idle);
            self.notifier.error(err.clone());
            return Err(err);
        }

        self.clear_registry();
        self.set_scan_state(ScanState::Scanning);

        info!("starting scan for {}", self.config.service_type_domain());
        let config = &self.config;
        let result = match self.backend.as_mut() {
            Some(backend) => backend.scan(&config.service_type, &config.protocol, &config.domain),
            None => Ok(()),
        };

        if let Err(e) = result {
            let err = ZeroChatError::scan(e.to_string());
            error!("scan call failed: {}", e);
            self.set_scan_state(ScanState::Idle);
            self.notifier.error(err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Asks the backend to stop browsing. A failed request forces the scan
    /// state to idle and is reported, but is not returned as an error.
    pub fn stop(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            debug!("stop requested without a discovery backend");
            return;
        };
        if let Err(e) = backend.stop() {
            warn!("failed to stop scan: {}", e);
            self.set_scan_state(ScanState::Idle);
            self.notifier.error(ZeroChatError::scan(e.to_string()));
        }
    }

    pub fn handle_event(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Started => {
                debug!("scan started");
                self.set_scan_state(ScanState::Scanning);
            }
            DiscoveryEvent::Stopped => {
                debug!("scan stopped");
                self.set_scan_state(ScanState::Idle);
            }
            DiscoveryEvent::Found(name) => {
                debug!("found service {:?}", name);
            }
            DiscoveryEvent::Resolved(service) => {
                if service.name.is_empty() {
                    warn!("ignoring resolved service without a name: {:?}", service);
                    return;
                }
                if self.registry.insert(service.clone()) {
                    info!("resolved {} ({:?})", service.name, service.addresses);
                    self.notifier.notify(ClientNotification::ServiceDiscovered(service));
                } else {
                    debug!("{} already registered", service.name);
                }
            }
            DiscoveryEvent::Removed(name) => {
                if self.registry.remove(&name).is_some() {
                    info!("service {} removed", name);
                    self.notifier.notify(ClientNotification::ServiceLost(name));
                }
            }
            DiscoveryEvent::Error(message) => {
                error!("discovery backend error: {}", message);
                self.set_scan_state(ScanState::Idle);
                self.notifier.error(ZeroChatError::ScanError(message));
            }
        }
    }

    /// Stops any scan and unsubscribes before releasing the backend.
    pub fn shutdown(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if self.scan_state == ScanState::Scanning {
                if let Err(e) = backend.stop() {
                    warn!("failed to stop scan during shutdown: {}", e);
                }
            }
            backend.remove_all_listeners();
            drop(backend);
            debug!("discovery backend released");
        }
        self.clear_registry();
        self.set_scan_state(ScanState::Idle);
    }

    fn clear_registry(&mut self) {
        if !self.registry.is_empty() {
            self.registry.clear();
            self.notifier.notify(ClientNotification::ServicesCleared);
        }
    }

    fn set_scan_state(&mut self, state: ScanState) {
        if self.scan_state != state {
            self.scan_state = state;
            self.notifier.notify(ClientNotification::ScanStateChanged(state));
        }
    }
}
