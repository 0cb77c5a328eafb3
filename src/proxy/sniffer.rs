//! Per-connection PROXY header sniffing.
//!
//! Reads at most [`MAX_HEADER_LEN`] bytes under a deadline, hands the line
//! to the parser and returns the stream with any over-read bytes queued
//! for replay. On error the caller drops the stream; nothing is written
//! back to the peer.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use super::endpoint::ProxyLine;
use super::parser::{parse_proxy_line, signature_mismatch, ParseError, CRLF, MAX_HEADER_LEN};
use super::stream::PrefixedStream;
use crate::config::ListenerPolicy;

/// Errors that end a connection during the sniff phase.
#[derive(Debug, Error)]
pub enum SniffError {
    #[error("no complete PROXY header within {0:?}")]
    Timeout(Duration),

    #[error("connection closed after {received} bytes, before the PROXY header ended")]
    ConnectionClosed { received: usize },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("IO error reading PROXY header: {0}")]
    Io(#[from] io::Error),
}

impl SniffError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SniffError::Timeout(_) => "timeout",
            SniffError::ConnectionClosed { .. } => "closed",
            SniffError::Parse(e) => e.reason(),
            SniffError::Io(_) => "io",
        }
    }
}

/// Outcome of a successful sniff phase.
#[derive(Debug)]
pub struct Sniffed<S> {
    /// The connection, with over-read bytes queued in front.
    pub stream: PrefixedStream<S>,
    /// Present only when the listener requires a header.
    pub proxy_line: Option<ProxyLine>,
}

/// Sniff settings for one listener. Copied into every connection task.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSniffer {
    policy: ListenerPolicy,
    header_timeout: Duration,
}

impl ConnectionSniffer {
    pub fn new(policy: ListenerPolicy, header_timeout: Duration) -> Self {
        Self {
            policy,
            header_timeout,
        }
    }

    pub fn policy(&self) -> ListenerPolicy {
        self.policy
    }

    /// Run the sniff phase on a freshly accepted stream.
    ///
    /// With the policy disabled no byte is read. With it enabled the stream
    /// must open with a valid header, finished before `header_timeout`.
    pub async fn sniff<S>(&self, mut stream: S) -> Result<Sniffed<S>, SniffError>
    where
        S: AsyncRead + Unpin,
    {
        if !self.policy.enabled {
            return Ok(Sniffed {
                stream: PrefixedStream::passthrough(stream),
                proxy_line: None,
            });
        }

        let mut window = [0u8; MAX_HEADER_LEN];
        let (line_len, filled) = timeout(self.header_timeout, read_header_line(&mut stream, &mut window))
            .await
            .map_err(|_| SniffError::Timeout(self.header_timeout))??;

        let proxy_line = parse_proxy_line(&window[..line_len])?;
        let rest = Bytes::copy_from_slice(&window[line_len..filled]);

        tracing::debug!(
            proxy_line = %proxy_line,
            replayed = rest.len(),
            "PROXY header accepted"
        );

        Ok(Sniffed {
            stream: PrefixedStream::new(rest, stream),
            proxy_line: Some(proxy_line),
        })
    }
}

/// Fill `window` until it holds a CRLF.
///
/// Returns the line length (terminator included) and the number of bytes
/// read. Bytes past the line belong to the application protocol.
async fn read_header_line<S>(
    stream: &mut S,
    window: &mut [u8; MAX_HEADER_LEN],
) -> Result<(usize, usize), SniffError>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    loop {
        let n = stream.read(&mut window[filled..]).await?;
        if n == 0 {
            return Err(SniffError::ConnectionClosed { received: filled });
        }
        // A CR from the previous read may pair with an LF from this one.
        let scan_from = filled.saturating_sub(1);
        filled += n;

        if signature_mismatch(&window[..filled]) {
            return Err(ParseError::BadSignature.into());
        }
        if let Some(pos) = window[scan_from..filled]
            .windows(CRLF.len())
            .position(|w| w == CRLF)
        {
            return Ok((scan_from + pos + CRLF.len(), filled));
        }
        if filled == MAX_HEADER_LEN {
            return Err(ParseError::TooLong.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::endpoint::ProtocolFamily;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    const FIXTURE_TCP4: &[u8] = b"PROXY TCP4 127.0.0.1 127.0.0.2 65533 65534\r\n";
    const REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: example\r\n\r\n";

    fn enabled() -> ConnectionSniffer {
        ConnectionSniffer::new(ListenerPolicy::REQUIRED, Duration::from_secs(5))
    }

    async fn peer_with(bytes: &[u8]) -> DuplexStream {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(bytes).await.unwrap();
        // Keep the writer open so a reader never sees EOF early.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(server);
        });
        client
    }

    async fn read_available(stream: &mut PrefixedStream<DuplexStream>, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        stream.read_exact(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn disabled_policy_reads_nothing() {
        let sniffer = ConnectionSniffer::new(ListenerPolicy::DISABLED, Duration::from_secs(5));
        let peer = peer_with(FIXTURE_TCP4).await;

        let mut sniffed = sniffer.sniff(peer).await.unwrap();
        assert!(sniffed.proxy_line.is_none());
        assert!(sniffed.stream.buffered().is_empty());

        let seen = read_available(&mut sniffed.stream, FIXTURE_TCP4.len()).await;
        assert_eq!(seen, FIXTURE_TCP4);
    }

    #[tokio::test]
    async fn pipelined_bytes_are_replayed() {
        let mut input = FIXTURE_TCP4.to_vec();
        input.extend_from_slice(REQUEST);
        let peer = peer_with(&input).await;

        let mut sniffed = enabled().sniff(peer).await.unwrap();
        let line = sniffed.proxy_line.unwrap();
        assert_eq!(line.protocol, ProtocolFamily::Tcp4);
        assert_eq!(line.source.socket_addr(), Some("127.0.0.1:65533".parse().unwrap()));

        let seen = read_available(&mut sniffed.stream, REQUEST.len()).await;
        assert_eq!(seen, REQUEST);
    }

    #[tokio::test]
    async fn terminator_split_across_reads() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (head, tail) = FIXTURE_TCP4.split_at(FIXTURE_TCP4.len() - 1);
        let head = head.to_vec();
        let tail = tail.to_vec();
        tokio::spawn(async move {
            server.write_all(&head).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(&tail).await.unwrap();
            server.write_all(b"x").await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut sniffed = enabled().sniff(client).await.unwrap();
        assert!(sniffed.proxy_line.is_some());
        let seen = read_available(&mut sniffed.stream, 1).await;
        assert_eq!(seen, b"x");
    }

    #[tokio::test]
    async fn max_length_header_with_payload() {
        let header = format!(
            "PROXY UNKNOWN {} {} 65535 65535\r\n",
            "a".repeat(39),
            "b".repeat(39)
        );
        assert_eq!(header.len(), MAX_HEADER_LEN);
        let mut input = header.into_bytes();
        input.extend_from_slice(REQUEST);
        let peer = peer_with(&input).await;

        let mut sniffed = enabled().sniff(peer).await.unwrap();
        assert_eq!(
            sniffed.proxy_line.unwrap().protocol,
            ProtocolFamily::Unknown
        );
        let seen = read_available(&mut sniffed.stream, REQUEST.len()).await;
        assert_eq!(seen, REQUEST);
    }

    #[tokio::test]
    async fn headerless_stream_fails_immediately() {
        let peer = peer_with(b"There is no spoon.").await;
        let err = enabled().sniff(peer).await.unwrap_err();
        assert!(matches!(err, SniffError::Parse(ParseError::BadSignature)));

        let peer = peer_with(REQUEST).await;
        let err = enabled().sniff(peer).await.unwrap_err();
        assert!(matches!(err, SniffError::Parse(ParseError::BadSignature)));
    }

    #[tokio::test]
    async fn no_terminator_within_bound_is_too_long() {
        let mut input = b"PROXY ".to_vec();
        input.extend(std::iter::repeat(b'a').take(200));
        let peer = peer_with(&input).await;

        let err = enabled().sniff(peer).await.unwrap_err();
        assert!(matches!(err, SniffError::Parse(ParseError::TooLong)));
    }

    #[tokio::test]
    async fn invalid_line_is_rejected() {
        let peer = peer_with(b"PROXY TCP4 1.1.1.1 2.2.2.2 99999 1\r\nGET").await;
        let err = enabled().sniff(peer).await.unwrap_err();
        assert!(matches!(err, SniffError::Parse(ParseError::InvalidPort { .. })));
        assert_eq!(err.reason(), "port");
    }

    #[tokio::test]
    async fn early_close_is_reported() {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(b"PROXY TCP4 1.1").await.unwrap();
        drop(server);

        let err = enabled().sniff(client).await.unwrap_err();
        assert!(matches!(err, SniffError::ConnectionClosed { received: 14 }));
    }

    #[tokio::test]
    async fn stalled_header_times_out() {
        let sniffer = ConnectionSniffer::new(ListenerPolicy::REQUIRED, Duration::from_millis(50));
        let peer = peer_with(b"PROXY TCP4 127.0.0.1").await;

        let err = sniffer.sniff(peer).await.unwrap_err();
        assert!(matches!(err, SniffError::Timeout(_)));
        assert_eq!(err.reason(), "timeout");
    }
}
