//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or --listen flags
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → policy.rs (bind address + PROXY policy per listener)
//!     → ServerConfig / ResolvedListener (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a listener's PROXY policy is fixed
//!   for its lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod policy;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use policy::{parse_bind_address, BindAddressError, ListenerPolicy, ResolvedListener, PROXY_MARKER};
pub use schema::{ListenerConfig, LogFormat, ObservabilityConfig, ProxyProtocolConfig, ServerConfig};
pub use validation::ValidationError;
