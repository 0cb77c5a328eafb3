//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! net / proxy layers produce:
//!     → logging.rs (structured log events, per-connection spans)
//!     → metrics.rs (connection counters, sniff outcomes)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
