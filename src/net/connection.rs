//! Connection state machine, lifecycle tracking and origin identity.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track the sniff-phase state of each connection
//! - Count live connections for shutdown and metrics
//! - Carry the connection's origin (peer, local, PROXY line) to handlers

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::observability::metrics;
use crate::proxy::ProxyLine;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Sniff-phase state of a connection.
///
/// ```text
/// header required:  AwaitingHeader → HeaderParsed → Streaming
///                   AwaitingHeader → Failed
/// header disabled:  Unchecked → Streaming
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted on a listener that does not sniff.
    Unchecked,
    /// Waiting for the PROXY header.
    AwaitingHeader,
    /// Header validated, not yet handed to the protocol handler.
    HeaderParsed,
    /// Owned by the protocol handler.
    Streaming,
    /// Sniff phase failed; the connection is being closed.
    Failed,
}

impl ConnectionState {
    /// Initial state for a listener policy.
    pub fn initial(proxy_protocol: bool) -> Self {
        if proxy_protocol {
            ConnectionState::AwaitingHeader
        } else {
            ConnectionState::Unchecked
        }
    }

    fn can_become(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Unchecked, Streaming)
                | (AwaitingHeader, HeaderParsed)
                | (AwaitingHeader, Failed)
                | (HeaderParsed, Streaming)
        )
    }
}

/// Tracks live connections across listeners.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. Returns a guard that decrements on drop.
    pub fn track(&self, proxy_protocol: bool) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::record_connection_opened(proxy_protocol);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
            state: ConnectionState::initial(proxy_protocol),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime and state.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
    state: ConnectionState,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`. Transitions outside the state machine are ignored
    /// and logged.
    pub fn transition(&mut self, next: ConnectionState) {
        if self.state.can_become(next) {
            tracing::trace!(connection_id = %self.id, from = ?self.state, to = ?next, "Connection state");
            self.state = next;
        } else {
            tracing::warn!(connection_id = %self.id, from = ?self.state, to = ?next, "Invalid connection state transition");
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::record_connection_closed();
        tracing::trace!(connection_id = %self.id, state = ?self.state, "Connection closed");
    }
}

/// Who is on the other end of a connection.
///
/// Built once per connection after the sniff phase and shared by every
/// request on it. `proxy_line` is the header's claim and is kept apart from
/// the transport peer address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionOrigin {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub proxy_line: Option<ProxyLine>,
}

impl ConnectionOrigin {
    /// Client address as best known: the header's source when it carries an
    /// IP, otherwise the transport peer.
    pub fn client_addr(&self) -> SocketAddr {
        self.proxy_line
            .as_ref()
            .and_then(|line| line.source.socket_addr())
            .unwrap_or(self.peer_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::parse_proxy_line;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track(false);
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track(true);
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn sniffing_connection_states() {
        let tracker = ConnectionTracker::new();
        let mut guard = tracker.track(true);
        assert_eq!(guard.state(), ConnectionState::AwaitingHeader);

        guard.transition(ConnectionState::Streaming);
        assert_eq!(guard.state(), ConnectionState::AwaitingHeader);

        guard.transition(ConnectionState::HeaderParsed);
        guard.transition(ConnectionState::Streaming);
        assert_eq!(guard.state(), ConnectionState::Streaming);

        guard.transition(ConnectionState::Failed);
        assert_eq!(guard.state(), ConnectionState::Streaming);
    }

    #[test]
    fn unchecked_connection_goes_straight_to_streaming() {
        let tracker = ConnectionTracker::new();
        let mut guard = tracker.track(false);
        assert_eq!(guard.state(), ConnectionState::Unchecked);

        guard.transition(ConnectionState::HeaderParsed);
        assert_eq!(guard.state(), ConnectionState::Unchecked);

        guard.transition(ConnectionState::Streaming);
        assert_eq!(guard.state(), ConnectionState::Streaming);
    }

    #[test]
    fn client_addr_prefers_header_source() {
        let peer: SocketAddr = "10.1.1.1:40000".parse().unwrap();
        let mut origin = ConnectionOrigin {
            id: ConnectionId::new(),
            peer_addr: peer,
            local_addr: "10.1.1.2:8080".parse().unwrap(),
            proxy_line: None,
        };
        assert_eq!(origin.client_addr(), peer);

        origin.proxy_line =
            Some(parse_proxy_line(b"PROXY TCP4 127.0.0.1 127.0.0.2 65533 65534\r\n").unwrap());
        assert_eq!(origin.client_addr(), "127.0.0.1:65533".parse().unwrap());

        origin.proxy_line = Some(parse_proxy_line(b"PROXY UNKNOWN a b 1 2\r\n").unwrap());
        assert_eq!(origin.client_addr(), peer);
    }
}
