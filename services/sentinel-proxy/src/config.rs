//! Proxy configuration.
//!
//! Flags can also be supplied through `SENTINEL_PROXY_*` environment
//! variables. The parsed [`Args`] are turned into an immutable [`Config`]
//! once at startup.

use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use crate::monitor::{MonitorConfig, MonitorStrategy};
use crate::proxy::{ListenerConfig, ResolveMode, DEFAULT_MAX_CONNECTIONS};

/// Host used when the listen address has no host part.
const LISTEN_ANY_HOST: &str = "0.0.0.0";

/// Host used when the Sentinel address has no host part.
const SENTINEL_DEFAULT_HOST: &str = "localhost";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// TCP proxy that always forwards to the Redis primary reported by Sentinel.
#[derive(Debug, Clone, Parser)]
#[command(name = "sentinel-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Listen address.
    #[arg(long, env = "SENTINEL_PROXY_LISTEN", default_value = ":9999")]
    pub listen: String,

    /// Name of the master redis node.
    #[arg(long, env = "SENTINEL_PROXY_MASTER", default_value = "")]
    pub master: String,

    /// Remote sentinel address.
    #[arg(long, env = "SENTINEL_PROXY_SENTINEL_ADDR", default_value = ":26379")]
    pub sentinel_addr: String,

    /// Username to use when connecting to the sentinel server.
    #[arg(long, env = "SENTINEL_PROXY_SENTINEL_USER", default_value = "")]
    pub sentinel_user: String,

    /// Password to use when connecting to the sentinel server.
    #[arg(
        long,
        env = "SENTINEL_PROXY_SENTINEL_PASS",
        default_value = "",
        hide_env_values = true
    )]
    pub sentinel_pass: String,

    /// Number of runtime worker threads.
    #[arg(long, env = "SENTINEL_PROXY_MAX_PROCS", default_value_t = 1)]
    pub max_procs: usize,

    /// Maximum concurrent sessions.
    #[arg(long, env = "SENTINEL_PROXY_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Sentinel connection strategy.
    #[arg(long, env = "SENTINEL_PROXY_MONITOR_STRATEGY", value_enum, default_value_t = MonitorStrategy::Shared)]
    pub monitor_strategy: MonitorStrategy,

    /// Where primary resolution runs for new connections.
    #[arg(long, env = "SENTINEL_PROXY_RESOLVE_MODE", value_enum, default_value_t = ResolveMode::Inline)]
    pub resolve_mode: ResolveMode,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, env = "SENTINEL_PROXY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "SENTINEL_PROXY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener settings.
    pub listener: ListenerConfig,

    /// Sentinel settings.
    pub monitor: MonitorConfig,

    /// Runtime worker threads.
    pub worker_threads: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Config {
    /// Build the configuration from parsed arguments.
    pub fn from_args(args: Args) -> Result<Self> {
        let bind_addr = resolve_listen_addr(&args.listen)?;

        let (host, port) = split_host_port(&args.sentinel_addr)
            .with_context(|| format!("invalid sentinel address {:?}", args.sentinel_addr))?;
        let host = if host.is_empty() {
            SENTINEL_DEFAULT_HOST.to_string()
        } else {
            host
        };

        if args.max_procs == 0 {
            bail!("max-procs must be at least 1");
        }
        if args.max_connections == 0 {
            bail!("max-connections must be at least 1");
        }

        let mut listener = ListenerConfig::new(bind_addr);
        listener.max_connections = args.max_connections;
        listener.resolve_mode = args.resolve_mode;

        let monitor = MonitorConfig {
            host,
            port,
            username: non_empty(args.sentinel_user),
            password: non_empty(args.sentinel_pass),
            master_name: args.master,
            strategy: args.monitor_strategy,
        };

        Ok(Self {
            listener,
            monitor,
            worker_threads: args.max_procs,
            log_level: args.log_level,
            log_format: args.log_format,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Split `host:port`, `[v6]:port` or `:port`.
fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .with_context(|| format!("missing port in address {:?}", addr))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid port in address {:?}", addr))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Ok((host.to_string(), port))
}

/// Resolve the listen address. An empty host listens on all interfaces.
fn resolve_listen_addr(addr: &str) -> Result<SocketAddr> {
    let (host, port) =
        split_host_port(addr).with_context(|| format!("invalid listen address {:?}", addr))?;
    let host = if host.is_empty() {
        LISTEN_ANY_HOST
    } else {
        host.as_str()
    };

    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve listen address {:?}", addr))?
        .next()
        .with_context(|| format!("listen address {:?} resolved to nothing", addr))
}
