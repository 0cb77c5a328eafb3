use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, Request};
use clap::{Parser, Subcommand};
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use proxyline::proxy::ProxyLine;

#[derive(Parser)]
#[command(name = "proxyline-probe")]
#[command(about = "Send a PROXY v1 header followed by an HTTP request", long_about = None)]
struct Cli {
    /// Server address to connect to.
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Request path.
    #[arg(short, long, default_value = "/")]
    path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a TCP4/TCP6 header from two socket addresses
    Send {
        #[arg(long)]
        source: SocketAddr,
        #[arg(long)]
        destination: SocketAddr,
    },
    /// Send a header line verbatim (CRLF is appended)
    Raw {
        line: String,
    },
    /// Send no header at all
    Plain,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let header = match cli.command {
        Commands::Send {
            source,
            destination,
        } => ProxyLine::from_socket_addrs(source, destination)
            .ok_or("source and destination must both be IPv4 or both be IPv6")?
            .to_header_bytes(),
        Commands::Raw { line } => format!("{}\r\n", line.trim_end_matches("\r\n")).into_bytes(),
        Commands::Plain => Vec::new(),
    };

    let mut stream = TcpStream::connect(&cli.addr).await?;
    if !header.is_empty() {
        stream.write_all(&header).await?;
        println!("> {}", String::from_utf8_lossy(&header).trim_end());
    }

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("Connection error: {}", e);
        }
    });

    let request = Request::builder()
        .uri(cli.path.as_str())
        .header(header::HOST, cli.addr.as_str())
        .body(Body::empty())?;

    let response = match sender.send_request(request).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Error: no HTTP response ({})", e);
            std::process::exit(1);
        }
    };

    let status = response.status();
    let body = axum::body::to_bytes(Body::new(response.into_body()), 1024 * 1024).await?;

    println!("< {}", status);
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", String::from_utf8_lossy(&body)),
    }

    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
