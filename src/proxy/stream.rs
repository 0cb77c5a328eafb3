//! Stream wrapper that replays bytes read past the PROXY header.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A stream whose first reads are served from an in-memory prefix.
///
/// The sniffer may pull application bytes off the socket together with the
/// header (a client pipelining its request). Those bytes go here so the next
/// layer reads them first, exactly once and in order. Writes pass straight
/// through.
#[derive(Debug)]
pub struct PrefixedStream<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> PrefixedStream<S> {
    pub fn new(prefix: Bytes, inner: S) -> Self {
        Self { prefix, inner }
    }

    /// Wrap a stream with nothing to replay.
    pub fn passthrough(inner: S) -> Self {
        Self::new(Bytes::new(), inner)
    }

    /// Bytes not yet handed to a reader.
    pub fn buffered(&self) -> &[u8] {
        &self.prefix
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.prefix.has_remaining() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix[..n]);
            this.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, data)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn replays_prefix_before_inner() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b" world").await.unwrap();
        drop(server);

        let mut stream = PrefixedStream::new(Bytes::from_static(b"hello"), client);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
        assert!(stream.buffered().is_empty());
    }

    #[tokio::test]
    async fn small_reads_drain_prefix_in_order() {
        let (client, _server) = tokio::io::duplex(64);
        let mut stream = PrefixedStream::new(Bytes::from_static(b"abcdef"), client);

        let mut chunk = [0u8; 4];
        let n = stream.read(&mut chunk).await.unwrap();
        assert_eq!(&chunk[..n], b"abcd");
        assert_eq!(stream.buffered(), b"ef");

        let n = stream.read(&mut chunk).await.unwrap();
        assert_eq!(&chunk[..n], b"ef");
    }

    #[tokio::test]
    async fn writes_go_to_inner() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream = PrefixedStream::passthrough(client);
        stream.write_all(b"pong").await.unwrap();

        let mut out = [0u8; 4];
        server.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"pong");
    }
}
