//! Shared harness for integration tests.
//!
//! Boots a `Server` with the origin-report router on two ephemeral ports
//! (one plain, one requiring a PROXY header) and talks to it in raw bytes.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use proxyline::config::{ListenerConfig, ServerConfig};
use proxyline::lifecycle::{Server, Shutdown};
use proxyline::net::ConnectionTracker;
use proxyline::HttpServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const FIXTURE_TCP4: &[u8] = b"PROXY TCP4 127.0.0.1 127.0.0.2 65533 65534\r\n";
pub const FIXTURE_TCP6: &[u8] = b"PROXY TCP6 2001:4801:7817:72:d4d9:211d:ff10:1631 2001:4801:7817:72:d4d9:211d:ff10:1632 65533 65534\r\n";

/// A complete request that asks the server to close afterwards.
pub const GET: &[u8] = b"GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n";

pub struct TestServer {
    pub plain: SocketAddr,
    pub proxied: SocketAddr,
    pub tracker: ConnectionTracker,
    pub shutdown: Shutdown,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_server() -> TestServer {
    start_server_with_timeout(Duration::from_secs(2)).await
}

pub async fn start_server_with_timeout(header_timeout: Duration) -> TestServer {
    let mut config = ServerConfig {
        listeners: vec![
            ListenerConfig {
                bind_address: "127.0.0.1:0".to_string(),
                ..ListenerConfig::default()
            },
            // Legacy marker form.
            ListenerConfig {
                bind_address: "127.0.0.1:0|P".to_string(),
                ..ListenerConfig::default()
            },
        ],
        ..ServerConfig::default()
    };
    config.proxy_protocol.header_timeout_ms = header_timeout.as_millis() as u64;

    let server = Server::bind(&config).await.unwrap();
    let addrs = server.local_addrs();
    let tracker = server.tracker().clone();
    let shutdown = Shutdown::new();
    tokio::spawn(server.serve(Arc::new(HttpServer::origin_report()), shutdown.subscribe()));

    TestServer {
        plain: addrs[0],
        proxied: addrs[1],
        tracker,
        shutdown,
    }
}

/// Write `payload`, then read until the server closes the connection.
///
/// Read errors (a reset after a rejected header) end the read; whatever
/// arrived before is returned.
pub async fn send_raw(addr: SocketAddr, payload: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _ = stream.write_all(payload).await;

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    let read_all = async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => response.extend_from_slice(&buf[..n]),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read_all)
        .await
        .expect("server did not close the connection");

    String::from_utf8_lossy(&response).into_owned()
}

pub fn request_with(header: &[u8]) -> Vec<u8> {
    [header, GET].concat()
}

/// Body of a single `Connection: close` response, as JSON.
pub fn body_json(response: &str) -> serde_json::Value {
    let (_, body) = response
        .split_once("\r\n\r\n")
        .expect("response has no header terminator");
    serde_json::from_str(body).unwrap()
}
