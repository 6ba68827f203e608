//! TCP proxy in front of the current Redis primary.
//!
//! This module provides:
//! - TCP listener management
//! - Primary resolution through the monitor client
//! - Bidirectional forwarding with half-close propagation
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Resolver -> Sentinel
//!              |
//!              +-> dial primary -> Forwarder <-> Primary
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use sentinel_proxy::{monitor, Listener, ListenerConfig, PrimaryResolver};
//!
//! let client = monitor::connect(&monitor_config).await?;
//! let resolver = Arc::new(PrimaryResolver::new(client, "mymaster"));
//!
//! let config = ListenerConfig::new("[::]:9999".parse()?);
//! let listener = Arc::new(Listener::bind(config, resolver).await?);
//! listener.run().await?;
//! ```

mod forwarder;
mod listener;
mod resolver;

pub use forwarder::{forward, Direction, SessionSummary};
pub use listener::{Listener, ListenerConfig, ListenerStats, ResolveMode, DEFAULT_MAX_CONNECTIONS};
pub use resolver::{PrimaryAddress, PrimaryResolver};
