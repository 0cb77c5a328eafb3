//! PROXY v1 line parser.
//!
//! Pure validation of a single candidate header line. Nothing here touches
//! a socket; the sniffer decides which bytes form the line.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use super::endpoint::{Endpoint, EndpointAddr, ProtocolFamily, ProxyLine};

/// Leading tag of every v1 header, separator included.
pub const PROXY_V1_SIGNATURE: &[u8] = b"PROXY ";

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Longest legal v1 header, terminator included.
pub const MAX_HEADER_LEN: usize = 107;

const FIELD_COUNT: usize = 6;

const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "signature",
    "protocol",
    "source address",
    "destination address",
    "source port",
    "destination port",
];

/// Why a candidate line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty PROXY header")]
    Empty,

    #[error("PROXY header exceeds {max} bytes", max = MAX_HEADER_LEN)]
    TooLong,

    #[error("PROXY header is not terminated by CRLF")]
    MissingTerminator,

    #[error("PROXY header contains non-ASCII bytes")]
    NotAscii,

    #[error("PROXY header does not start with \"PROXY \"")]
    BadSignature,

    #[error("PROXY header has {found} fields, expected {expected}", expected = FIELD_COUNT)]
    FieldCount { found: usize },

    #[error("PROXY header {field} is empty or contains whitespace")]
    InvalidToken { field: &'static str },

    #[error("unrecognized PROXY protocol {0:?}")]
    UnknownProtocol(String),

    #[error("{field} {address:?} is not a valid {protocol} address")]
    AddressFamilyMismatch {
        protocol: ProtocolFamily,
        field: &'static str,
        address: String,
    },

    #[error("{field} {value:?} is not a port in 0..=65535")]
    InvalidPort { field: &'static str, value: String },
}

impl ParseError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ParseError::Empty | ParseError::MissingTerminator | ParseError::NotAscii => "malformed",
            ParseError::TooLong => "too_long",
            ParseError::BadSignature => "bad_signature",
            ParseError::FieldCount { .. } => "field_count",
            ParseError::InvalidToken { .. } => "token",
            ParseError::UnknownProtocol(_) => "unknown_protocol",
            ParseError::AddressFamilyMismatch { .. } => "address_family",
            ParseError::InvalidPort { .. } => "port",
        }
    }
}

/// Parse one header line, terminator included.
///
/// Any rule violation fails the whole line; no partial result is ever
/// produced.
pub fn parse_proxy_line(line: &[u8]) -> Result<ProxyLine, ParseError> {
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    if line.len() > MAX_HEADER_LEN {
        return Err(ParseError::TooLong);
    }
    let body = line.strip_suffix(CRLF).ok_or(ParseError::MissingTerminator)?;
    if !body.is_ascii() {
        return Err(ParseError::NotAscii);
    }
    // ASCII is valid UTF-8.
    let body = std::str::from_utf8(body).map_err(|_| ParseError::NotAscii)?;

    let fields: Vec<&str> = body.split(' ').collect();
    if fields.len() != FIELD_COUNT {
        return Err(ParseError::FieldCount { found: fields.len() });
    }
    for (field, name) in fields.iter().zip(FIELD_NAMES) {
        if field.is_empty() || field.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
            return Err(ParseError::InvalidToken { field: name });
        }
    }

    if fields[0].as_bytes() != &PROXY_V1_SIGNATURE[..PROXY_V1_SIGNATURE.len() - 1] {
        return Err(ParseError::BadSignature);
    }
    let protocol: ProtocolFamily = fields[1].parse()?;

    let source_addr = parse_address(protocol, FIELD_NAMES[2], fields[2])?;
    let destination_addr = parse_address(protocol, FIELD_NAMES[3], fields[3])?;
    let source_port = parse_port(FIELD_NAMES[4], fields[4])?;
    let destination_port = parse_port(FIELD_NAMES[5], fields[5])?;

    Ok(ProxyLine {
        protocol,
        source: Endpoint::new(source_addr, source_port),
        destination: Endpoint::new(destination_addr, destination_port),
    })
}

/// True once `prefix` can no longer be the start of a v1 header.
///
/// Lets the sniffer reject a header-less stream on its first bytes instead
/// of waiting for a terminator or the deadline.
pub fn signature_mismatch(prefix: &[u8]) -> bool {
    let n = prefix.len().min(PROXY_V1_SIGNATURE.len());
    prefix[..n] != PROXY_V1_SIGNATURE[..n]
}

fn parse_address(
    protocol: ProtocolFamily,
    field: &'static str,
    token: &str,
) -> Result<EndpointAddr, ParseError> {
    let mismatch = || ParseError::AddressFamilyMismatch {
        protocol,
        field,
        address: token.to_string(),
    };
    match protocol {
        ProtocolFamily::Tcp4 => token
            .parse::<Ipv4Addr>()
            .map(|ip| EndpointAddr::Ip(IpAddr::V4(ip)))
            .map_err(|_| mismatch()),
        ProtocolFamily::Tcp6 => token
            .parse::<Ipv6Addr>()
            .map(|ip| EndpointAddr::Ip(IpAddr::V6(ip)))
            .map_err(|_| mismatch()),
        ProtocolFamily::Unknown => Ok(EndpointAddr::Opaque(token.to_string())),
    }
}

fn parse_port(field: &'static str, token: &str) -> Result<u16, ParseError> {
    let invalid = || ParseError::InvalidPort {
        field,
        value: token.to_string(),
    };
    // u16::from_str would also take a leading '+'.
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    token.parse::<u16>().map_err(|_| invalid())
}
