use crate::error::ZeroChatError;
use mdns_sd::ServiceInfo;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Represents a discovered service, simplified for this library's use.
///
/// `name` is the DNS-SD instance label (e.g. `Mac-1`) and is the identity of
/// the service inside the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredService {
    pub name: String,
    pub fullname: String,
    pub hostname: String,
    pub addresses: Vec<String>,
    pub port: Option<u16>,
    pub txt: BTreeMap<String, String>,
}

impl DiscoveredService {
    /// Minimal service with a name, addresses and a port.
    pub fn new(
        name: impl Into<String>,
        addresses: impl IntoIterator<Item = impl Into<String>>,
        port: u16,
    ) -> Self {
        let name = name.into();
        Self {
            fullname: name.clone(),
            hostname: String::new(),
            name,
            addresses: addresses.into_iter().map(Into::into).collect(),
            port: Some(port),
            txt: BTreeMap::new(),
        }
    }
}

impl From<&ServiceInfo> for DiscoveredService {
    fn from(info: &ServiceInfo) -> Self {
        let fullname = info.get_fullname();

        // IPv4 first so the first address is a dotted quad whenever one exists.
        let mut ips: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
        ips.sort_by_key(|ip| (ip.is_ipv6(), *ip));

        DiscoveredService {
            name: instance_name(fullname, info.get_type()).to_string(),
            fullname: fullname.to_string(),
            hostname: info.get_hostname().to_string(),
            addresses: ips.iter().map(|ip| ip.to_string()).collect(),
            port: Some(info.get_port()).filter(|port| *port != 0),
            txt: info
                .get_properties()
                .iter()
                .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
                .collect(),
        }
    }
}

/// Strips the `.{service type}` suffix from a DNS-SD full name.
pub(crate) fn instance_name<'a>(fullname: &'a str, ty_domain: &str) -> &'a str {
    fullname
        .strip_suffix(ty_domain)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
}

/// Connection state of the single messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    /// Transport teardown requested by the user.
    Closing,
    /// The transport closed or failed.
    Closed,
}

impl ConnectionState {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Sent,
    Received,
    System,
}

/// One entry of the session's message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Strictly increasing; ordering never depends on `timestamp`.
    pub id: u64,
    pub kind: MessageKind,
    pub content: String,
    /// Local wall-clock time, for display only.
    pub timestamp: String,
}

/// Everything a renderer needs, read in one go.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatSnapshot {
    pub scan_state: ScanState,
    pub services: Vec<DiscoveredService>,
    pub connection_state: ConnectionState,
    pub connected_service: Option<String>,
    pub messages: Vec<Message>,
}

/// Events sent from the library back to the client application.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientNotification {
    ScanStateChanged(ScanState),
    ServiceDiscovered(DiscoveredService),
    ServiceLost(String),
    ServicesCleared,
    ConnectionStateChanged {
        state: ConnectionState,
        service_name: Option<String>,
    },
    MessageAppended(Message),
    MessagesCleared,
    /// A user-visible, non-fatal error.
    Error(ZeroChatError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_instance_name_strips_service_type() {
        assert_eq!(
            instance_name("Mac-1._easypasta._tcp.local.", "_easypasta._tcp.local."),
            "Mac-1"
        );
        assert_eq!(
            instance_name("My Mac.lan._easypasta._tcp.local.", "_easypasta._tcp.local."),
            "My Mac.lan"
        );
        assert_eq!(instance_name("odd-name", "_easypasta._tcp.local."), "odd-name");
    }

    #[test]
    fn test_from_service_info_orders_ipv4_first() {
        let properties = HashMap::from([("os".to_string(), "macos".to_string())]);
        let info = ServiceInfo::new(
            "_easypasta._tcp.local.",
            "Mac-1",
            "mac-1.local.",
            "fe80::1,192.168.1.5",
            8080,
            properties,
        )
        .unwrap();

        let service = DiscoveredService::from(&info);
        assert_eq!(service.name, "Mac-1");
        assert_eq!(service.fullname, "Mac-1._easypasta._tcp.local.");
        assert_eq!(service.addresses, vec!["192.168.1.5", "fe80::1"]);
        assert_eq!(service.port, Some(8080));
        assert_eq!(service.txt.get("os").map(String::as_str), Some("macos"));
    }

    #[test]
    fn test_from_service_info_zero_port_is_missing() {
        let info = ServiceInfo::new(
            "_easypasta._tcp.local.",
            "Mac-2",
            "mac-2.local.",
            "10.0.0.2",
            0,
            HashMap::<String, String>::new(),
        )
        .unwrap();
        assert_eq!(DiscoveredService::from(&info).port, None);
    }

    #[test]
    fn test_connection_state_is_live() {
        assert!(ConnectionState::Connecting.is_live());
        assert!(ConnectionState::Open.is_live());
        assert!(!ConnectionState::Idle.is_live());
        assert!(!ConnectionState::Closing.is_live());
        assert!(!ConnectionState::Closed.is_live());
    }
}
