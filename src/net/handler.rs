//! Seam between the sniff layer and the application protocol.

use std::future::Future;

use tokio::net::TcpStream;

use crate::net::connection::ConnectionOrigin;
use crate::proxy::PrefixedStream;

/// Boxed error returned by protocol handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A connection after the sniff phase. Its first reads may come from bytes
/// the sniffer already pulled off the socket.
pub type SniffedStream = PrefixedStream<TcpStream>;

/// Serves an application protocol on a sniffed connection.
///
/// Called exactly once per connection, after the sniff phase succeeded.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn serve_connection(
        &self,
        stream: SniffedStream,
        origin: ConnectionOrigin,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}
