//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to a resolved listener address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Run the sniff phase for each connection in its own task
//! - Hand sniffed connections to the protocol handler
//! - Graceful handling of accept errors

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::config::{ListenerPolicy, ResolvedListener};
use crate::lifecycle::ShutdownSignal;
use crate::net::connection::{ConnectionGuard, ConnectionOrigin, ConnectionState, ConnectionTracker};
use crate::net::handler::ConnectionHandler;
use crate::observability::metrics;
use crate::proxy::{ConnectionSniffer, SniffError};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The connection limit semaphore was closed.
    Closed,
    /// `max_connections` exceeds what the semaphore can hold.
    ConnectionLimit(usize),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Listener closed"),
            ListenerError::ConnectionLimit(n) => write!(
                f,
                "max_connections {} exceeds the limit of {}",
                n,
                Semaphore::MAX_PERMITS
            ),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bounded TCP listener with a fixed PROXY header policy.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Address actually bound (resolves port 0).
    local_addr: SocketAddr,
    /// Sniff settings shared by every connection.
    sniffer: ConnectionSniffer,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
    tracker: ConnectionTracker,
}

impl Listener {
    /// Bind a resolved listener.
    pub async fn bind(
        resolved: &ResolvedListener,
        header_timeout: Duration,
        tracker: ConnectionTracker,
    ) -> Result<Self, ListenerError> {
        if resolved.max_connections > Semaphore::MAX_PERMITS {
            return Err(ListenerError::ConnectionLimit(resolved.max_connections));
        }

        let listener = TcpListener::bind(resolved.address)
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            proxy_protocol = resolved.policy.enabled,
            max_connections = resolved.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            local_addr,
            sniffer: ConnectionSniffer::new(resolved.policy, header_timeout),
            connection_limit: Arc::new(Semaphore::new(resolved.max_connections)),
            max_connections: resolved.max_connections,
            tracker,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        // Then accept the connection
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Accept connections until shutdown, one task per connection.
    ///
    /// Connections already accepted keep running after shutdown; they end
    /// with their own streams.
    pub async fn run<H: ConnectionHandler>(self, handler: Arc<H>, mut shutdown: ShutdownSignal) {
        tracing::info!(address = %self.local_addr, "Listener started");

        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.accept() => accepted,
            };

            let (stream, peer_addr, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::error!(address = %self.local_addr, error = %e, "Accept error");
                    // Brief sleep to avoid tight loop on persistent errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let guard = self.tracker.track(self.sniffer.policy().enabled);
            let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer_addr);
            let sniffer = self.sniffer;
            let local_addr = self.local_addr;
            let handler = Arc::clone(&handler);

            tokio::spawn(
                async move {
                    handle_connection(stream, peer_addr, local_addr, sniffer, handler, guard).await;
                    drop(permit);
                }
                .instrument(span),
            );
        }

        tracing::info!(address = %self.local_addr, "Listener stopped");
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn policy(&self) -> ListenerPolicy {
        self.sniffer.policy()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Sniff, attach the origin, then serve. A failed sniff drops the stream
/// without writing anything.
async fn handle_connection<H: ConnectionHandler>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    sniffer: ConnectionSniffer,
    handler: Arc<H>,
    mut guard: ConnectionGuard,
) {
    let sniffing = sniffer.policy().enabled;
    let started = Instant::now();

    let sniffed = match sniffer.sniff(stream).await {
        Ok(sniffed) => sniffed,
        Err(e) => {
            metrics::record_sniff(started, Some(e.reason()));
            guard.transition(ConnectionState::Failed);
            match e {
                SniffError::ConnectionClosed { received: 0 } => {
                    tracing::debug!(error = %e, "Connection closed before sending a PROXY header")
                }
                _ => tracing::warn!(error = %e, "Closing connection: PROXY header rejected"),
            }
            return;
        }
    };

    if sniffing {
        metrics::record_sniff(started, None);
        guard.transition(ConnectionState::HeaderParsed);
    }

    let origin = ConnectionOrigin {
        id: guard.id(),
        peer_addr,
        local_addr,
        proxy_line: sniffed.proxy_line,
    };
    guard.transition(ConnectionState::Streaming);

    if let Err(e) = handler.serve_connection(sniffed.stream, origin).await {
        tracing::debug!(error = %e, "Connection error");
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(max_connections: usize) -> ResolvedListener {
        ResolvedListener {
            address: "127.0.0.1:0".parse().unwrap(),
            policy: ListenerPolicy::REQUIRED,
            max_connections,
        }
    }

    #[tokio::test]
    async fn bind_reports_ephemeral_port_and_limits() {
        let listener = Listener::bind(&resolved(4), Duration::from_secs(1), ConnectionTracker::new())
            .await
            .unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert!(listener.policy().enabled);
        assert_eq!(listener.max_connections(), 4);
        assert_eq!(listener.available_permits(), 4);
    }

    #[tokio::test]
    async fn oversized_connection_limit_is_an_error() {
        let result = Listener::bind(
            &resolved(usize::MAX),
            Duration::from_secs(1),
            ConnectionTracker::new(),
        )
        .await;
        assert!(matches!(result, Err(ListenerError::ConnectionLimit(usize::MAX))));
    }
}
