//! Sentinel-backed monitor clients built on the `redis` crate.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{MonitorClient, MonitorConfig};
use crate::error::MonitorError;

/// Build connection info for a Sentinel node.
fn connection_info(config: &MonitorConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            username: config.username.clone(),
            password: config.password.clone(),
            ..Default::default()
        },
    }
}

/// Issue `SENTINEL GET-MASTER-ADDR-BY-NAME <name>` on `con`.
async fn query_master_addr(
    con: &mut MultiplexedConnection,
    name: &str,
) -> Result<Vec<String>, MonitorError> {
    let reply: Value = redis::cmd("SENTINEL")
        .arg("GET-MASTER-ADDR-BY-NAME")
        .arg(name)
        .query_async(con)
        .await?;
    decode_master_addr_reply(name, reply)
}

/// Turn a raw reply into its string fields.
///
/// Nil means Sentinel does not know the name. The arity of the array is left
/// to the resolver.
pub fn decode_master_addr_reply(name: &str, reply: Value) -> Result<Vec<String>, MonitorError> {
    match reply {
        Value::Nil => Err(MonitorError::NoPrimary {
            name: name.to_string(),
        }),
        Value::Array(items) => items.into_iter().map(decode_field).collect(),
        other => Err(MonitorError::UnexpectedReply(format!("{:?}", other))),
    }
}

fn decode_field(item: Value) -> Result<String, MonitorError> {
    match item {
        Value::BulkString(bytes) => String::from_utf8(bytes)
            .map_err(|e| MonitorError::UnexpectedReply(format!("non-utf8 field: {}", e))),
        Value::SimpleString(s) => Ok(s),
        other => Err(MonitorError::UnexpectedReply(format!("{:?}", other))),
    }
}

/// State of the shared connection.
enum SharedConnection {
    Connected(MultiplexedConnection),
    /// Last connection dropped; the next query reconnects.
    Disconnected,
    Closed,
}

/// Sentinel client holding one multiplexed connection for the proxy lifetime.
///
/// Queries clone the connection handle and run outside the lock, so
/// concurrent sessions share the socket without serialising on it.
pub struct SentinelClient {
    client: redis::Client,
    addr: String,
    connection: Mutex<SharedConnection>,
}

impl SentinelClient {
    /// Connect to Sentinel.
    pub async fn connect(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let client = redis::Client::open(connection_info(config))?;
        let connection = client.get_multiplexed_async_connection().await?;

        info!(
            sentinel_addr = %config.addr(),
            authenticated = config.password.is_some(),
            "Connected to sentinel"
        );

        Ok(Self {
            client,
            addr: config.addr(),
            connection: Mutex::new(SharedConnection::Connected(connection)),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, MonitorError> {
        let mut state = self.connection.lock().await;
        match &*state {
            SharedConnection::Connected(con) => Ok(con.clone()),
            SharedConnection::Closed => Err(MonitorError::Closed),
            SharedConnection::Disconnected => {
                debug!(sentinel_addr = %self.addr, "Reconnecting to sentinel");
                let con = self.client.get_multiplexed_async_connection().await?;
                *state = SharedConnection::Connected(con.clone());
                Ok(con)
            }
        }
    }

    async fn invalidate(&self) {
        let mut state = self.connection.lock().await;
        if matches!(*state, SharedConnection::Connected(_)) {
            *state = SharedConnection::Disconnected;
        }
    }
}

#[async_trait]
impl MonitorClient for SentinelClient {
    async fn primary_addr_by_name(&self, name: &str) -> Result<Vec<String>, MonitorError> {
        let mut con = self.connection().await?;
        let result = query_master_addr(&mut con, name).await;

        if let Err(MonitorError::Redis(e)) = &result {
            if e.is_connection_dropped() || e.is_io_error() {
                warn!(
                    sentinel_addr = %self.addr,
                    error = %e,
                    "Sentinel connection lost"
                );
                self.invalidate().await;
            }
        }

        result
    }

    async fn close(&self) {
        let mut state = self.connection.lock().await;
        *state = SharedConnection::Closed;
        info!(sentinel_addr = %self.addr, "Sentinel client closed");
    }
}

/// Sentinel client that opens a connection for every query.
pub struct PerQuerySentinelClient {
    client: redis::Client,
    addr: String,
}

impl PerQuerySentinelClient {
    /// Validate the configuration. No connection is made here.
    pub fn new(config: &MonitorConfig) -> Result<Self, MonitorError> {
        Ok(Self {
            client: redis::Client::open(connection_info(config))?,
            addr: config.addr(),
        })
    }
}

#[async_trait]
impl MonitorClient for PerQuerySentinelClient {
    async fn primary_addr_by_name(&self, name: &str) -> Result<Vec<String>, MonitorError> {
        debug!(sentinel_addr = %self.addr, "Opening sentinel connection");
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let result = query_master_addr(&mut con, name).await;
        drop(con);
        result
    }

    async fn close(&self) {}
}
