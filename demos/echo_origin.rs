//! Minimal embedding: one plain listener and one PROXY listener serving a
//! custom router.
//!
//! ```text
//! cargo run --example echo_origin
//! printf 'PROXY TCP4 192.0.2.1 192.0.2.2 4000 80\r\nGET / HTTP/1.1\r\nHost: x\r\n\r\n' | nc 127.0.0.1 8444
//! ```

use std::sync::Arc;

use axum::{body::Body, http::Request, routing::get, Router};
use proxyline::config::{ListenerConfig, ServerConfig};
use proxyline::lifecycle::{wait_for_signal, Server, Shutdown};
use proxyline::{HttpServer, OriginExt};

async fn hello(req: Request<Body>) -> String {
    match (req.proxy_line(), req.client_addr()) {
        (Some(line), _) => format!("Hello via proxy: {}\n", line),
        (None, Some(addr)) => format!("Hello, {}\n", addr),
        (None, None) => "Hello\n".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("proxyline=debug").init();

    let config = ServerConfig {
        listeners: vec![
            ListenerConfig {
                bind_address: "127.0.0.1:8443".to_string(),
                ..ListenerConfig::default()
            },
            ListenerConfig {
                bind_address: "127.0.0.1:8444".to_string(),
                proxy_protocol: true,
                ..ListenerConfig::default()
            },
        ],
        ..ServerConfig::default()
    };

    let server = Server::bind(&config).await?;
    println!("Listening on {:?} (second one requires a PROXY header)", server.local_addrs());

    let router = Router::new().route("/", get(hello));
    let shutdown = Shutdown::new();
    let serving = tokio::spawn(server.serve(Arc::new(HttpServer::new(router)), shutdown.subscribe()));

    wait_for_signal(&shutdown).await;
    serving.await?;
    Ok(())
}
