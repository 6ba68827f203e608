//! sentinel-proxy
//!
//! TCP proxy in front of a Redis deployment managed by Sentinel.
//!
//! This service:
//! - Accepts client connections on a stable listen address
//! - Asks Sentinel for the current primary of the configured master name
//! - Forwards the raw byte stream to that primary in both directions

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sentinel_proxy::{
    monitor, Args, Config, Listener, LogFormat, PrimaryResolver, ProxyError,
};

fn main() -> Result<()> {
    let config = Config::from_args(Args::parse())?;

    setup_tracing(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run(config))
}

fn setup_tracing(config: &Config) {
    // Prefer RUST_LOG, fall back to the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into());
    let subscriber = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => subscriber.with(fmt::layer().json()).init(),
        LogFormat::Text => subscriber.with(fmt::layer()).init(),
    }
}

async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listener.bind_addr,
        sentinel_addr = %config.monitor.addr(),
        master_name = %config.monitor.master_name,
        monitor_strategy = ?config.monitor.strategy,
        resolve_mode = ?config.listener.resolve_mode,
        worker_threads = config.worker_threads,
        "Starting sentinel proxy"
    );

    if config.monitor.master_name.is_empty() {
        warn!("No master name configured; every connection will fail to resolve");
    }

    // Bind first so an unusable listen address fails before Sentinel is contacted
    let bind_addr = config.listener.bind_addr;
    let socket = TcpListener::bind(bind_addr)
        .await
        .map_err(|source| ProxyError::Bind {
            addr: bind_addr,
            source,
        })?;

    let client = monitor::connect(&config.monitor)
        .await
        .context("failed to create sentinel client")?;
    let resolver = Arc::new(PrimaryResolver::new(
        client,
        config.monitor.master_name.clone(),
    ));

    let listener = Listener::from_tcp(config.listener.clone(), socket, Arc::clone(&resolver))?;
    let listener = Arc::new(listener);

    let result: Result<()> = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
        result = listener.run() => {
            match result {
                Ok(()) => Ok(()),
                Err(e) => {
                    error!(error = %e, "Listener error");
                    Err(e.into())
                }
            }
        }
    };

    resolver.close().await;
    info!("Sentinel proxy shutdown complete");
    result
}
