//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Resolve every listener address and PROXY policy
//! - Validate value ranges (timeouts > 0, connection limits > 0)
//! - Detect listeners that would bind the same address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::policy::BindAddressError;
use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no listeners configured")]
    NoListeners,

    #[error("listener {index}: {source}")]
    BindAddress {
        index: usize,
        source: BindAddressError,
    },

    #[error("listener {index}: address {address} is already used by another listener")]
    DuplicateBindAddress { index: usize, address: SocketAddr },

    #[error("listener {index}: max_connections must be greater than 0")]
    ZeroMaxConnections { index: usize },

    #[error("listener {index}: max_connections must be at most {max}", max = Semaphore::MAX_PERMITS)]
    MaxConnectionsTooLarge { index: usize },

    #[error("proxy_protocol.header_timeout_ms must be greater than 0")]
    ZeroHeaderTimeout,

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listeners.is_empty() {
        errors.push(ValidationError::NoListeners);
    }

    let mut seen = HashSet::new();
    for (index, listener) in config.listeners.iter().enumerate() {
        match listener.resolve() {
            Ok(resolved) => {
                // Port 0 asks the OS for a fresh port each time.
                if resolved.address.port() != 0 && !seen.insert(resolved.address) {
                    errors.push(ValidationError::DuplicateBindAddress {
                        index,
                        address: resolved.address,
                    });
                }
            }
            Err(source) => errors.push(ValidationError::BindAddress { index, source }),
        }
        if listener.max_connections == 0 {
            errors.push(ValidationError::ZeroMaxConnections { index });
        } else if listener.max_connections > Semaphore::MAX_PERMITS {
            errors.push(ValidationError::MaxConnectionsTooLarge { index });
        }
    }

    if config.proxy_protocol.header_timeout_ms == 0 {
        errors.push(ValidationError::ZeroHeaderTimeout);
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
