//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Resolve listeners → Bind all → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Exit when listeners stop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: a listener that cannot be resolved or bound aborts startup
//! - Listeners start only after every one of them is bound

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_signal;
pub use startup::{Server, StartupError};
