//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Sniffed connection + ConnectionOrigin
//!     → server.rs (hyper HTTP/1.1, origin inserted per request)
//!     → axum Router supplied by the embedder
//!     → origin.rs (handlers read the origin back)
//! ```

pub mod origin;
pub mod server;

pub use origin::{origin_report, OriginExt};
pub use server::{default_router, HttpServer};
