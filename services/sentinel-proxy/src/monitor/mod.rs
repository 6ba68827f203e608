//! Monitor quorum (Redis Sentinel) clients.
//!
//! The proxy only needs one question answered by the monitor quorum:
//! "which address is currently the primary for this master name?". The
//! [`MonitorClient`] trait captures that capability so the resolver does not
//! depend on how the Sentinel connection is managed.
//!
//! Two strategies are provided:
//! - [`SentinelClient`]: one multiplexed connection, opened at startup and
//!   shared by every session until [`MonitorClient::close`] is called.
//! - [`PerQuerySentinelClient`]: a fresh connection for every query, dropped
//!   as soon as the reply (or error) is in hand.

use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;

use crate::error::MonitorError;

mod sentinel;

pub use sentinel::{decode_master_addr_reply, PerQuerySentinelClient, SentinelClient};

/// How the Sentinel connection is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MonitorStrategy {
    /// One long-lived connection shared by all sessions.
    #[default]
    Shared,
    /// A new connection per resolution, closed right after the query.
    PerQuery,
}

/// Sentinel connection settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sentinel host.
    pub host: String,
    /// Sentinel port.
    pub port: u16,
    /// Optional ACL username for Sentinel.
    pub username: Option<String>,
    /// Optional password for Sentinel.
    pub password: Option<String>,
    /// Logical cluster name registered in Sentinel.
    pub master_name: String,
    /// Connection management strategy.
    pub strategy: MonitorStrategy,
}

impl MonitorConfig {
    /// Create a configuration without credentials.
    pub fn new(host: impl Into<String>, port: u16, master_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            master_name: master_name.into(),
            strategy: MonitorStrategy::default(),
        }
    }

    /// `host:port` form, for logging.
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Capability to look up the current primary of a logical cluster.
///
/// Implementations must tolerate concurrent calls from independent sessions.
#[async_trait]
pub trait MonitorClient: Send + Sync {
    /// Ask for the primary registered under `name`.
    ///
    /// Returns the raw reply fields; the caller validates their shape.
    async fn primary_addr_by_name(&self, name: &str) -> Result<Vec<String>, MonitorError>;

    /// Release any connection held by the client.
    async fn close(&self);
}

/// Build the monitor client selected by `config.strategy`.
///
/// The shared strategy connects eagerly, so an unreachable Sentinel is
/// reported here rather than on the first client connection.
pub async fn connect(config: &MonitorConfig) -> Result<Arc<dyn MonitorClient>, MonitorError> {
    match config.strategy {
        MonitorStrategy::Shared => Ok(Arc::new(SentinelClient::connect(config).await?)),
        MonitorStrategy::PerQuery => Ok(Arc::new(PerQuerySentinelClient::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_config_defaults() {
        let config = MonitorConfig::new("127.0.0.1", 26379, "mymaster");
        assert_eq!(config.strategy, MonitorStrategy::Shared);
        assert!(config.username.is_none());
        assert!(config.password.is_none());
        assert_eq!(config.addr(), "127.0.0.1:26379");
    }

    #[test]
    fn test_monitor_config_ipv6_addr() {
        let config = MonitorConfig::new("::1", 26380, "mymaster");
        assert_eq!(config.addr(), "[::1]:26380");
    }
}
