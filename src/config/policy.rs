//! Listener policy resolution.
//!
//! Turns a [`ListenerConfig`] into the concrete bind address and the
//! PROXY-header policy for that listener. Runs once when the listener is
//! built; connections only ever see the resolved, immutable result.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use thiserror::Error;

use crate::config::schema::ListenerConfig;

/// Legacy suffix that enables PROXY header detection, e.g. `":8080|P"`.
pub const PROXY_MARKER: &str = "|P";

/// Whether connections on a listener must open with a PROXY v1 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerPolicy {
    pub enabled: bool,
}

impl ListenerPolicy {
    pub const DISABLED: Self = Self { enabled: false };
    pub const REQUIRED: Self = Self { enabled: true };
}

/// Malformed listener address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid bind address {address:?}: {reason}")]
pub struct BindAddressError {
    pub address: String,
    pub reason: String,
}

/// A listener ready to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedListener {
    pub address: SocketAddr,
    pub policy: ListenerPolicy,
    pub max_connections: usize,
}

impl ListenerConfig {
    /// Resolve bind address and policy.
    ///
    /// Header detection is on when `proxy_protocol` is set or the address
    /// carries the [`PROXY_MARKER`] suffix.
    pub fn resolve(&self) -> Result<ResolvedListener, BindAddressError> {
        let (address, marked) = parse_bind_address(&self.bind_address)?;
        Ok(ResolvedListener {
            address,
            policy: ListenerPolicy {
                enabled: self.proxy_protocol || marked,
            },
            max_connections: self.max_connections,
        })
    }
}

/// Split `<host>:<port>[|P]` into a socket address and the marker flag.
///
/// The host must be an IPv4 literal, a bracketed IPv6 literal, or empty
/// (all IPv4 interfaces).
pub fn parse_bind_address(raw: &str) -> Result<(SocketAddr, bool), BindAddressError> {
    let (address, marked) = match raw.strip_suffix(PROXY_MARKER) {
        Some(stripped) => (stripped, true),
        None => (raw, false),
    };
    let invalid = |reason: String| BindAddressError {
        address: raw.to_string(),
        reason,
    };

    if let Some(port) = address.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|_| invalid(format!("port {:?} is not in 0..=65535", port)))?;
        return Ok((SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port), marked));
    }

    let addr = address
        .parse::<SocketAddr>()
        .map_err(|e| invalid(e.to_string()))?;
    Ok((addr, marked))
}
