//! Error types for the proxy.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors returned by a monitor (Sentinel) client.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Transport or server error reported by the Redis client library.
    #[error("sentinel error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Sentinel answered with a nil reply: no primary is known for the name.
    #[error("no primary registered for master name {name:?}")]
    NoPrimary { name: String },

    /// Sentinel answered with a reply type that cannot carry an address.
    #[error("unexpected sentinel reply: {0}")]
    UnexpectedReply(String),

    /// The client was closed during shutdown.
    #[error("monitor client closed")]
    Closed,
}

/// Errors produced while resolving the current primary.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// The reply did not have exactly two fields (host, port).
    #[error("invalid master address response: {fields:?}")]
    MalformedReply { fields: Vec<String> },

    /// Host and port do not form a valid network address.
    #[error("invalid primary address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// Host lookup failed.
    #[error("failed to resolve primary address {addr}: {source}")]
    Lookup {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Errors that abort proxy startup.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ResolveError {
    /// Short reason label used in logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ResolveError::Monitor(MonitorError::Redis(_)) => "sentinel_error",
            ResolveError::Monitor(MonitorError::NoPrimary { .. }) => "no_primary",
            ResolveError::Monitor(MonitorError::UnexpectedReply(_)) => "unexpected_reply",
            ResolveError::Monitor(MonitorError::Closed) => "monitor_closed",
            ResolveError::MalformedReply { .. } => "malformed_reply",
            ResolveError::InvalidAddress { .. } => "invalid_address",
            ResolveError::Lookup { .. } => "lookup_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_reply_message_lists_fields() {
        let err = ResolveError::MalformedReply {
            fields: vec!["10.0.0.1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "invalid master address response: [\"10.0.0.1\"]"
        );
        assert_eq!(err.reason_code(), "malformed_reply");
    }

    #[test]
    fn test_monitor_error_is_transparent() {
        let err = ResolveError::from(MonitorError::NoPrimary {
            name: "mymaster".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "no primary registered for master name \"mymaster\""
        );
        assert_eq!(err.reason_code(), "no_primary");
    }
}
