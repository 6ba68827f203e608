//! TCP listener and connection handling.
//!
//! For every accepted connection the listener:
//! 1. asks the resolver for the current primary,
//! 2. dials the primary,
//! 3. hands both streams to the forwarder on a task of their own.
//!
//! A connection whose resolution or dial fails is closed without any data
//! being forwarded. Errors never leave the connection they belong to.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn, Instrument};

use super::forwarder::forward;
use super::resolver::PrimaryResolver;
use crate::error::ProxyError;

/// Default maximum concurrent sessions per listener.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10000;

/// Pause after an accept error before accepting again.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Where resolution and dial run for a new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ResolveMode {
    /// On the accept loop. A slow Sentinel delays admission of new
    /// connections; established sessions are unaffected.
    #[default]
    Inline,
    /// On a task per connection, so the accept loop never waits on Sentinel.
    Spawned,
}

/// Configuration for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent sessions.
    pub max_connections: usize,
    /// Where resolution runs.
    pub resolve_mode: ResolveMode,
}

impl ListenerConfig {
    /// Create a new listener configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            resolve_mode: ResolveMode::default(),
        }
    }
}

/// Statistics for a listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Sessions currently relaying.
    pub connections_active: AtomicU64,
    /// Connections closed, whether or not a session was established.
    pub connections_closed: AtomicU64,
    /// Connections rejected due to max limit.
    pub connections_rejected: AtomicU64,
    /// Primary lookups that failed.
    pub resolve_failed: AtomicU64,
    /// Dials to the primary that failed.
    pub dial_failed: AtomicU64,
    /// Sessions established.
    pub sessions_established: AtomicU64,
    /// Bytes proxied to the primary.
    pub bytes_to_upstream: AtomicU64,
    /// Bytes proxied from the primary.
    pub bytes_from_upstream: AtomicU64,
}

/// A TCP listener for the proxy.
pub struct Listener {
    /// Listener configuration.
    config: ListenerConfig,
    /// The TCP listener.
    listener: TcpListener,
    /// Primary resolver, shared by every connection.
    resolver: Arc<PrimaryResolver>,
    /// Connection semaphore for limiting concurrent sessions.
    conn_semaphore: Arc<Semaphore>,
    /// Statistics.
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Bind a new listener.
    pub async fn bind(
        config: ListenerConfig,
        resolver: Arc<PrimaryResolver>,
    ) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ProxyError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        Self::from_tcp(config, listener, resolver)
    }

    /// Wrap an already bound socket.
    pub fn from_tcp(
        config: ListenerConfig,
        listener: TcpListener,
        resolver: Arc<PrimaryResolver>,
    ) -> Result<Self, ProxyError> {
        let local_addr = listener.local_addr()?;

        info!(
            bind_addr = %local_addr,
            max_connections = config.max_connections,
            resolve_mode = ?config.resolve_mode,
            "Listener bound"
        );

        Ok(Self {
            conn_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            listener,
            config,
            resolver,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get listener statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Run the listener, accepting and handling connections.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(
            bind_addr = %local_addr,
            master_name = %self.resolver.master_name(),
            "Listener started"
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let permit = match self.conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.stats
                                .connections_rejected
                                .fetch_add(1, Ordering::Relaxed);
                            self.stats
                                .connections_closed
                                .fetch_add(1, Ordering::Relaxed);
                            warn!(peer_addr = %peer_addr, "Connection rejected: max connections reached");
                            continue;
                        }
                    };

                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);

                    let span = tracing::info_span!("connection", peer = %peer_addr);

                    match self.config.resolve_mode {
                        ResolveMode::Inline => {
                            let upstream =
                                self.connect_upstream().instrument(span.clone()).await;
                            match upstream {
                                Some(upstream) => {
                                    self.spawn_session(stream, upstream, permit, span)
                                }
                                None => {
                                    self.stats
                                        .connections_closed
                                        .fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                        ResolveMode::Spawned => {
                            let listener = Arc::clone(&self);
                            tokio::spawn(
                                async move {
                                    if let Some(upstream) = listener.connect_upstream().await {
                                        listener.spawn_session(
                                            stream,
                                            upstream,
                                            permit,
                                            tracing::Span::current(),
                                        );
                                    } else {
                                        listener
                                            .stats
                                            .connections_closed
                                            .fetch_add(1, Ordering::Relaxed);
                                    }
                                }
                                .instrument(span),
                            );
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid tight loop on persistent errors
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                }
            }
        }
    }

    /// Resolve the primary and dial it.
    ///
    /// Returns `None` when either step fails; the caller then drops the
    /// client connection without forwarding anything.
    async fn connect_upstream(&self) -> Option<TcpStream> {
        debug!("Resolving primary");
        let primary_addr = match self.resolver.resolve().await {
            Ok(addr) => addr,
            Err(e) => {
                self.stats.resolve_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    master_name = %self.resolver.master_name(),
                    reason = e.reason_code(),
                    error = %e,
                    "Primary resolution failed, closing connection"
                );
                return None;
            }
        };

        debug!(primary_addr = %primary_addr, "Dialing primary");
        match TcpStream::connect(primary_addr).await {
            Ok(upstream) => Some(upstream),
            Err(e) => {
                self.stats.dial_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    primary_addr = %primary_addr,
                    error = %e,
                    "Primary dial failed, closing connection"
                );
                None
            }
        }
    }

    /// Hand a connected pair to the forwarder.
    fn spawn_session(
        &self,
        downstream: TcpStream,
        upstream: TcpStream,
        permit: OwnedSemaphorePermit,
        span: tracing::Span,
    ) {
        self.stats
            .sessions_established
            .fetch_add(1, Ordering::Relaxed);
        self.stats
            .connections_active
            .fetch_add(1, Ordering::Relaxed);

        let stats = Arc::clone(&self.stats);

        tokio::spawn(
            async move {
                debug!("Session established");
                let summary = forward(downstream, upstream).await;
                drop(permit);

                stats
                    .bytes_to_upstream
                    .fetch_add(summary.bytes_to_upstream, Ordering::Relaxed);
                stats
                    .bytes_from_upstream
                    .fetch_add(summary.bytes_from_upstream, Ordering::Relaxed);
                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                stats.connections_closed.fetch_add(1, Ordering::Relaxed);
            }
            .instrument(span),
        );
    }
}
