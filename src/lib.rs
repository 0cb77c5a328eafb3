//! PROXY protocol v1 sniffing for TCP listeners.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;

pub use config::schema::ServerConfig;
pub use http::{HttpServer, OriginExt};
pub use lifecycle::{Server, Shutdown};
pub use net::{ConnectionHandler, ConnectionOrigin};
pub use proxy::{parse_proxy_line, ProxyLine};
