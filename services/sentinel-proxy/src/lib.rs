pub mod config;
pub mod error;
pub mod monitor;
pub mod proxy;

pub use config::{Args, Config, LogFormat};
pub use error::{MonitorError, ProxyError, ResolveError};
pub use monitor::{MonitorClient, MonitorConfig, MonitorStrategy};
pub use proxy::{
    forward, Listener, ListenerConfig, ListenerStats, PrimaryAddress, PrimaryResolver,
    ResolveMode, SessionSummary,
};
