//! Primary address resolution.
//!
//! Every accepted connection triggers exactly one Sentinel query. Nothing is
//! cached and nothing is retried: a failed lookup fails that one client
//! connection and nothing else.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::lookup_host;
use tracing::debug;

use crate::error::ResolveError;
use crate::monitor::MonitorClient;

/// A validated (host, port) pair reported by Sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryAddress {
    pub host: String,
    pub port: u16,
}

impl PrimaryAddress {
    /// Validate reply fields. Exactly two fields are accepted.
    pub fn from_fields(fields: Vec<String>) -> Result<Self, ResolveError> {
        let [host, port]: [String; 2] = fields
            .try_into()
            .map_err(|fields| ResolveError::MalformedReply { fields })?;

        let port = port.parse::<u16>().map_err(|e| ResolveError::InvalidAddress {
            addr: format!("{}:{}", host, port),
            reason: format!("invalid port: {}", e),
        })?;

        Ok(Self { host, port })
    }

    /// Resolve to a dialable socket address, taking the first lookup result.
    ///
    /// An empty host means the local host.
    pub async fn to_socket_addr(&self) -> Result<SocketAddr, ResolveError> {
        let addr = if self.host.is_empty() {
            format!("localhost:{}", self.port)
        } else {
            self.to_string()
        };
        let first = lookup_host(addr.as_str())
            .await
            .map_err(|source| ResolveError::Lookup {
                addr: addr.clone(),
                source,
            })?
            .next();

        first.ok_or_else(|| ResolveError::InvalidAddress {
            addr,
            reason: "lookup returned no addresses".to_string(),
        })
    }
}

impl fmt::Display for PrimaryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Resolves the current primary for one logical cluster name.
pub struct PrimaryResolver {
    client: Arc<dyn MonitorClient>,
    master_name: String,
}

impl PrimaryResolver {
    pub fn new(client: Arc<dyn MonitorClient>, master_name: impl Into<String>) -> Self {
        Self {
            client,
            master_name: master_name.into(),
        }
    }

    /// The logical cluster name this resolver asks about.
    pub fn master_name(&self) -> &str {
        &self.master_name
    }

    /// Query Sentinel once and return the primary's socket address.
    pub async fn resolve(&self) -> Result<SocketAddr, ResolveError> {
        let fields = self
            .client
            .primary_addr_by_name(&self.master_name)
            .await?;
        let primary = PrimaryAddress::from_fields(fields)?;
        let addr = primary.to_socket_addr().await?;

        debug!(
            master_name = %self.master_name,
            primary = %primary,
            primary_addr = %addr,
            "Resolved primary"
        );

        Ok(addr)
    }

    /// Release the monitor client.
    pub async fn close(&self) {
        self.client.close().await;
    }
}
