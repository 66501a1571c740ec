//! Address validation performed before any transport is created.

use crate::error::ValidationError;
use crate::models::DiscoveredService;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

// Syntax only: four groups of one to three digits. Octet ranges are not checked.
static IPV4_DOTTED_QUAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}$").expect("valid regex"));

/// A validated address/port pair.
///
/// Only [`validate`] constructs one, so a connection can only ever be opened
/// to the exact pair that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    address: String,
    port: u16,
}

impl Endpoint {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `ws://{address}:{port}{path}`
    pub fn ws_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("ws://{}:{}{}", self.address, self.port, path)
        } else {
            format!("ws://{}:{}/{}", self.address, self.port, path)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Checks that `service` can be connected to and returns its first address
/// together with its port.
pub fn validate(service: &DiscoveredService) -> Result<Endpoint, ValidationError> {
    let (Some(address), Some(port)) = (service.addresses.first(), service.port) else {
        return Err(ValidationError::NoAddress);
    };
    if port == 0 {
        return Err(ValidationError::NoAddress);
    }
    if !IPV4_DOTTED_QUAD.is_match(address) {
        return Err(ValidationError::InvalidFormat(address.clone()));
    }
    Ok(Endpoint {
        address: address.clone(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(addresses: &[&str], port: Option<u16>) -> DiscoveredService {
        let mut service = DiscoveredService::new("Mac-1", addresses.iter().copied(), 0);
        service.port = port;
        service
    }

    #[test]
    fn test_valid_ipv4_returns_first_address_and_port() {
        let endpoint = validate(&service(&["10.0.0.2", "10.0.0.3"], Some(9000))).unwrap();
        assert_eq!(endpoint.address(), "10.0.0.2");
        assert_eq!(endpoint.port(), 9000);
        assert_eq!(endpoint.ws_url("/ws"), "ws://10.0.0.2:9000/ws");
        assert_eq!(endpoint.ws_url("ws"), "ws://10.0.0.2:9000/ws");
        assert_eq!(endpoint.to_string(), "10.0.0.2:9000");
    }

    #[test]
    fn test_no_addresses() {
        assert_eq!(
            validate(&service(&[], Some(9000))),
            Err(ValidationError::NoAddress)
        );
    }

    #[test]
    fn test_missing_or_zero_port() {
        assert_eq!(
            validate(&service(&["10.0.0.2"], None)),
            Err(ValidationError::NoAddress)
        );
        assert_eq!(
            validate(&service(&["10.0.0.2"], Some(0))),
            Err(ValidationError::NoAddress)
        );
    }

    #[test]
    fn test_rejects_non_dotted_quad() {
        let bad_addresses = [
            "fe80::1",
            "mac-1.local",
            "10.0.0",
            "10.0.0.2.1",
            "1234.0.0.1",
            " 10.0.0.2",
            "",
        ];
        for bad in bad_addresses {
            assert_eq!(
                validate(&service(&[bad], Some(9000))),
                Err(ValidationError::InvalidFormat(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_only_first_address_is_considered() {
        assert_eq!(
            validate(&service(&["fe80::1", "10.0.0.2"], Some(9000))),
            Err(ValidationError::InvalidFormat("fe80::1".to_string()))
        );
    }

    #[test]
    fn test_syntax_only_no_range_check() {
        assert!(validate(&service(&["999.999.999.999"], Some(1))).is_ok());
    }
}
