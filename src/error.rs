//! Error types for discovery, validation and the messaging session.

use thiserror::Error;

/// Result type alias using [`ZeroChatError`].
pub type Result<T> = std::result::Result<T, ZeroChatError>;

/// Why a discovered service cannot be connected to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("service has no address or no port")]
    NoAddress,

    #[error("address \"{0}\" is not a valid IPv4 address")]
    InvalidFormat(String),
}

/// Errors surfaced by the chat core.
///
/// Every variant leaves the core in a well-defined state; none of them is
/// fatal to the process. They are `Clone` so they can travel both as a
/// returned `Err` and as a [`ClientNotification::Error`](crate::ClientNotification).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZeroChatError {
    // ─────────────────────────────────────────────────────────────
    // Discovery
    // ─────────────────────────────────────────────────────────────
    #[error("discovery backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("scan failed: {0}")]
    ScanError(String),

    // ─────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] ValidationError),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("message is empty")]
    EmptyMessage,

    #[error("not connected")]
    NotConnected,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    // ─────────────────────────────────────────────────────────────
    // Runtime
    // ─────────────────────────────────────────────────────────────
    #[error("chat actor unavailable: {0}")]
    ActorUnavailable(String),
}

impl ZeroChatError {
    pub fn backend_unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable(reason.into())
    }

    pub fn scan(reason: impl Into<String>) -> Self {
        Self::ScanError(reason.into())
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::TransportError(reason.into())
    }

    /// Whether the user can simply retry the failed operation.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ActorUnavailable(_))
    }

    /// Whether the error ends the current session.
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_converts_to_invalid_address() {
        let err: ZeroChatError = ValidationError::InvalidFormat("fe80::1".into()).into();
        assert_eq!(
            err,
            ZeroChatError::InvalidAddress(ValidationError::InvalidFormat("fe80::1".into()))
        );
        assert!(err.to_string().contains("fe80::1"));
    }

    #[test]
    fn test_classification() {
        assert!(ZeroChatError::transport("reset").is_session_terminal());
        assert!(!ZeroChatError::EmptyMessage.is_session_terminal());
        assert!(ZeroChatError::scan("boom").is_recoverable());
        assert!(!ZeroChatError::ActorUnavailable("gone".into()).is_recoverable());
    }
}
