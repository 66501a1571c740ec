//! [`DiscoveryBackend`] over `mdns-sd`.

use crate::config::service_type_domain;
use crate::discovery::DiscoveryBackend;
use crate::events::{DiscoveryEvent, DiscoveryListener};
use crate::models::{DiscoveredService, instance_name};
use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type ListenerSlot = Arc<Mutex<Option<DiscoveryListener>>>;

pub struct MdnsBackend {
    daemon: Option<ServiceDaemon>,
    listener: ListenerSlot,
    browsing: Option<String>,
    pump: Option<JoinHandle<()>>,
    /// Bumped on every `scan`; a pump only delivers while its browse is current.
    generation: Arc<AtomicU64>,
}

impl MdnsBackend {
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new().context("Failed to create mDNS daemon")?;
        Ok(Self {
            daemon: Some(daemon),
            listener: Arc::new(Mutex::new(None)),
            browsing: None,
            pump: None,
            generation: Arc::new(AtomicU64::new(0)),
        })
    }
}

impl DiscoveryBackend for MdnsBackend {
    fn is_ready(&self) -> bool {
        self.daemon.is_some()
    }

    fn scan(&mut self, service_type: &str, protocol: &str, domain: &str) -> Result<()> {
        if self.browsing.is_some() {
            self.stop()?;
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        let daemon = self.daemon.as_ref().context("mDNS daemon has been shut down")?;
        let ty_domain = service_type_domain(service_type, protocol, domain);

        let receiver = daemon
            .browse(&ty_domain)
            .with_context(|| format!("Failed to browse {ty_domain}"))?;
        info!("Browsing for '{}'", ty_domain);

        let runtime = tokio::runtime::Handle::try_current()
            .context("mDNS browsing requires a tokio runtime")?;
        let listener = Arc::clone(&self.listener);
        let generation = Arc::clone(&self.generation);
        let current = generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ty = ty_domain.clone();
        self.pump = Some(runtime.spawn(async move {
            loop {
                let event = match receiver.recv_async().await {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("mDNS receiver for {} disconnected: {}", ty, e);
                        deliver_current(
                            &listener,
                            &generation,
                            current,
                            DiscoveryEvent::Error(e.to_string()),
                        );
                        break;
                    }
                };
                let stopped = matches!(event, ServiceEvent::SearchStopped(_));
                if let Some(event) = translate(event, &ty) {
                    if !deliver_current(&listener, &generation, current, event) {
                        break;
                    }
                }
                if stopped {
                    break;
                }
            }
            debug!("mDNS pump for {} exiting", ty);
        }));
        self.browsing = Some(ty_domain);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(ty_domain) = self.browsing.take() else {
            return Ok(());
        };
        let daemon = self.daemon.as_ref().context("mDNS daemon has been shut down")?;
        daemon
            .stop_browse(&ty_domain)
            .with_context(|| format!("Failed to stop browsing {ty_domain}"))?;
        info!("Stopped browsing '{}'", ty_domain);
        Ok(())
    }

    fn subscribe(&mut self, listener: DiscoveryListener) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    fn remove_all_listeners(&mut self) {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

impl Drop for MdnsBackend {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(daemon) = self.daemon.take() {
            if let Err(e) = daemon.shutdown() {
                warn!("Failed to shut down mDNS daemon: {}", e);
            }
        }
    }
}

fn deliver(slot: &ListenerSlot, event: DiscoveryEvent) {
    let listener = slot.lock().unwrap_or_else(|e| e.into_inner()).clone();
    match listener {
        Some(listener) => listener(event),
        None => debug!("no discovery listener, dropping {:?}", event),
    }
}

/// Delivers `event` unless a newer browse has superseded generation `mine`.
/// Returns `false` for a stale pump.
fn deliver_current(
    slot: &ListenerSlot,
    generation: &AtomicU64,
    mine: u64,
    event: DiscoveryEvent,
) -> bool {
    if generation.load(Ordering::SeqCst) != mine {
        debug!("dropping {:?} from superseded browse", event);
        return false;
    }
    deliver(slot, event);
    true
}

fn translate(event: ServiceEvent, ty_domain: &str) -> Option<DiscoveryEvent> {
    match event {
        ServiceEvent::SearchStarted(_) => Some(DiscoveryEvent::Started),
        ServiceEvent::SearchStopped(_) => Some(DiscoveryEvent::Stopped),
        ServiceEvent::ServiceFound(_, fullname) => Some(DiscoveryEvent::Found(
            instance_name(&fullname, ty_domain).to_string(),
        )),
        ServiceEvent::ServiceResolved(info) => {
            Some(DiscoveryEvent::Resolved(DiscoveredService::from(&info)))
        }
        ServiceEvent::ServiceRemoved(_, fullname) => Some(DiscoveryEvent::Removed(
            instance_name(&fullname, ty_domain).to_string(),
        )),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}
