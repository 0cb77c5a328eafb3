//! Connection origin access for HTTP handlers.
//!
//! Every request served on a connection carries a clone of that
//! connection's [`ConnectionOrigin`] in its extensions.

use std::net::SocketAddr;

use axum::{
    extract::Extension,
    http::{request::Parts, Request},
    Json,
};

use crate::net::ConnectionOrigin;
use crate::proxy::ProxyLine;

/// Extension trait to read the connection origin off a request.
pub trait OriginExt {
    fn origin(&self) -> Option<&ConnectionOrigin>;

    /// The PROXY header of the connection, if the listener required one.
    fn proxy_line(&self) -> Option<&ProxyLine> {
        self.origin().and_then(|origin| origin.proxy_line.as_ref())
    }

    /// Client address as best known. See [`ConnectionOrigin::client_addr`].
    fn client_addr(&self) -> Option<SocketAddr> {
        self.origin().map(ConnectionOrigin::client_addr)
    }
}

impl<B> OriginExt for Request<B> {
    fn origin(&self) -> Option<&ConnectionOrigin> {
        self.extensions().get::<ConnectionOrigin>()
    }
}

impl OriginExt for Parts {
    fn origin(&self) -> Option<&ConnectionOrigin> {
        self.extensions.get::<ConnectionOrigin>()
    }
}

/// Reports the origin of the connection the request arrived on.
pub async fn origin_report(Extension(origin): Extension<ConnectionOrigin>) -> Json<ConnectionOrigin> {
    Json(origin)
}
