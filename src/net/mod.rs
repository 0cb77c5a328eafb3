//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits, one task per connection)
//!     → proxy::ConnectionSniffer (PROXY header, when the listener requires it)
//!     → connection.rs (state machine, ConnectionOrigin)
//!     → handler.rs (hand off to the protocol layer)
//!
//! Connection States:
//!     Unchecked ──────────────────────────────→ Streaming
//!     AwaitingHeader → HeaderParsed ──────────→ Streaming
//!     AwaitingHeader → Failed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - A slow or silent client only stalls its own task

pub mod connection;
pub mod handler;
pub mod listener;

pub use connection::{ConnectionId, ConnectionOrigin, ConnectionState, ConnectionTracker};
pub use handler::{BoxError, ConnectionHandler, SniffedStream};
pub use listener::{Listener, ListenerError};
