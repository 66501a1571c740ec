use anyhow::{Context, Result};
use serde::Deserialize;
use std::{io::Read, path::Path};

/// Represents the top-level configuration loaded from a TOML file.
///
/// Every field has a default, so an empty file (or `ZeroChatConfig::default()`)
/// describes the stock `_easypasta._tcp.local.` setup.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ZeroChatConfig {
    pub discovery: DiscoveryConfig,
    pub session: SessionConfig,
}

/// The service type triple to browse for, plus scan policy.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub service_type: String,
    pub protocol: String,
    pub domain: String,
    /// Begin scanning as soon as the manager starts.
    pub scan_on_start: bool,
    /// Restart scanning once a session ends.
    pub resume_on_disconnect: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Sent as `device_id` in every outbound payload.
    pub device_id: String,
    /// Request path appended to `ws://{address}:{port}`.
    pub path: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: "easypasta".to_string(),
            protocol: "tcp".to_string(),
            domain: "local.".to_string(),
            scan_on_start: true,
            resume_on_disconnect: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_id: format!("{}_device", std::env::consts::OS),
            path: "/ws".to_string(),
        }
    }
}

impl DiscoveryConfig {
    /// The DNS-SD service type string, e.g. `_easypasta._tcp.local.`.
    pub fn service_type_domain(&self) -> String {
        service_type_domain(&self.service_type, &self.protocol, &self.domain)
    }
}

/// Joins a service type triple into `_{type}._{protocol}.{domain}.`.
pub fn service_type_domain(service_type: &str, protocol: &str, domain: &str) -> String {
    let domain = domain.trim_matches('.');
    format!("_{service_type}._{protocol}.{domain}.")
}

impl ZeroChatConfig {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("read config from {:?}", path.as_ref()))?;
        toml::from_str(&content).context("parse zerochat config")
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut buf = String::new();
        let mut rdr = reader;
        rdr.read_to_string(&mut buf)?;
        toml::from_str(&buf).context("parse zerochat config from reader")
    }
}
