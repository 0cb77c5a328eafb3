//! PROXY protocol v1 subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP stream (listener with PROXY policy enabled)
//!     → sniffer.rs (bounded read under deadline, fail fast on bad prefix)
//!     → parser.rs (validate the header line)
//!     → endpoint.rs (ProxyLine: protocol family, source, destination)
//!     → stream.rs (replay over-read bytes to the protocol handler)
//! ```
//!
//! # Design Decisions
//! - Only the text format (v1) is accepted; the header is at most 107 bytes
//! - A rejected header closes the connection without any reply
//! - Bytes read past the header are never lost

pub mod endpoint;
pub mod parser;
pub mod sniffer;
pub mod stream;

pub use endpoint::{Endpoint, EndpointAddr, ProtocolFamily, ProxyLine};
pub use parser::{parse_proxy_line, ParseError, MAX_HEADER_LEN};
pub use sniffer::{ConnectionSniffer, SniffError, Sniffed};
pub use stream::PrefixedStream;
