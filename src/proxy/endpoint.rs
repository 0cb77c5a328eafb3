//! Endpoint model for PROXY v1 headers.
//!
//! A header names a protocol family and two endpoints: the original client
//! (source) and the address it connected to (destination).

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::Serialize;

use super::parser::ParseError;

/// Protocol family token of a PROXY v1 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProtocolFamily {
    #[serde(rename = "TCP4")]
    Tcp4,
    #[serde(rename = "TCP6")]
    Tcp6,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ProtocolFamily {
    /// Wire token for this family.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolFamily::Tcp4 => "TCP4",
            ProtocolFamily::Tcp6 => "TCP6",
            ProtocolFamily::Unknown => "UNKNOWN",
        }
    }

    /// Family matching an IP address.
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => ProtocolFamily::Tcp4,
            IpAddr::V6(_) => ProtocolFamily::Tcp6,
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolFamily {
    type Err = ParseError;

    /// Case-sensitive: `tcp4` is not a valid token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TCP4" => Ok(ProtocolFamily::Tcp4),
            "TCP6" => Ok(ProtocolFamily::Tcp6),
            "UNKNOWN" => Ok(ProtocolFamily::Unknown),
            other => Err(ParseError::UnknownProtocol(other.to_string())),
        }
    }
}

/// Address half of an endpoint.
///
/// `UNKNOWN` headers carry tokens that are only checked for syntax, so they
/// are kept verbatim instead of being forced into an `IpAddr`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum EndpointAddr {
    Ip(IpAddr),
    Opaque(String),
}

impl EndpointAddr {
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            EndpointAddr::Ip(ip) => Some(*ip),
            EndpointAddr::Opaque(_) => None,
        }
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointAddr::Ip(ip) => write!(f, "{}", ip),
            EndpointAddr::Opaque(token) => f.write_str(token),
        }
    }
}

/// One side of the proxied connection as claimed by the header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub address: EndpointAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: EndpointAddr, port: u16) -> Self {
        Self { address, port }
    }

    /// Socket address, when the address is a real IP.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.address.ip().map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(EndpointAddr::Ip(addr.ip()), addr.port())
    }
}

/// A fully validated PROXY v1 header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProxyLine {
    pub protocol: ProtocolFamily,
    pub source: Endpoint,
    pub destination: Endpoint,
}

impl ProxyLine {
    /// Build a TCP4/TCP6 line from two socket addresses.
    ///
    /// Returns `None` when the addresses belong to different IP versions,
    /// which a single v1 header cannot express.
    pub fn from_socket_addrs(source: SocketAddr, destination: SocketAddr) -> Option<Self> {
        let protocol = ProtocolFamily::of(&source.ip());
        if protocol != ProtocolFamily::of(&destination.ip()) {
            return None;
        }
        Some(Self {
            protocol,
            source: source.into(),
            destination: destination.into(),
        })
    }

    /// Wire form including the `\r\n` terminator.
    pub fn to_header_bytes(&self) -> Vec<u8> {
        format!("{}\r\n", self).into_bytes()
    }
}

impl fmt::Display for ProxyLine {
    /// Wire form without the terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PROXY {} {} {} {} {}",
            self.protocol,
            self.source.address,
            self.destination.address,
            self.source.port,
            self.destination.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_tokens_are_case_sensitive() {
        assert_eq!("TCP4".parse(), Ok(ProtocolFamily::Tcp4));
        assert_eq!("UNKNOWN".parse(), Ok(ProtocolFamily::Unknown));
        assert_eq!(
            "tcp4".parse::<ProtocolFamily>(),
            Err(ParseError::UnknownProtocol("tcp4".into()))
        );
        assert!("TCP".parse::<ProtocolFamily>().is_err());
    }

    #[test]
    fn from_socket_addrs_rejects_mixed_families() {
        let v4: SocketAddr = "10.0.0.1:80".parse().unwrap();
        let v6: SocketAddr = "[::1]:80".parse().unwrap();
        assert!(ProxyLine::from_socket_addrs(v4, v6).is_none());

        let line = ProxyLine::from_socket_addrs(v6, v6).unwrap();
        assert_eq!(line.protocol, ProtocolFamily::Tcp6);
    }

    #[test]
    fn header_bytes_end_with_crlf() {
        let line = ProxyLine::from_socket_addrs(
            "127.0.0.1:65533".parse().unwrap(),
            "127.0.0.2:65534".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(
            line.to_header_bytes(),
            b"PROXY TCP4 127.0.0.1 127.0.0.2 65533 65534\r\n".to_vec()
        );
    }

    #[test]
    fn opaque_endpoint_has_no_socket_addr() {
        let endpoint = Endpoint::new(EndpointAddr::Opaque("somewhere".into()), 1);
        assert!(endpoint.socket_addr().is_none());
        assert_eq!(endpoint.address.to_string(), "somewhere");
    }

    #[test]
    fn serializes_with_wire_tokens() {
        let line = ProxyLine::from_socket_addrs(
            "192.168.1.1:12345".parse().unwrap(),
            "10.0.0.1:80".parse().unwrap(),
        )
        .unwrap();
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["protocol"], "TCP4");
        assert_eq!(json["source"]["address"], "192.168.1.1");
        assert_eq!(json["destination"]["port"], 80);
    }
}
