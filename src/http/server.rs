//! HTTP server setup.
//!
//! # Responsibilities
//! - Serve HTTP/1.1 on sniffed connections with hyper
//! - Dispatch requests to an axum Router
//! - Attach the connection origin to every request
//! - Provide the default origin-report router

use axum::{
    body::Body,
    http::Request,
    routing::get,
    Router,
};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tower::Service;
use tower_http::trace::TraceLayer;

use crate::http::origin::origin_report;
use crate::net::{BoxError, ConnectionHandler, ConnectionOrigin, SniffedStream};

/// HTTP/1.1 protocol handler wrapping an axum Router.
#[derive(Clone)]
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server dispatching to `router`.
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Server with [`default_router`].
    pub fn origin_report() -> Self {
        Self::new(default_router())
    }
}

impl ConnectionHandler for HttpServer {
    async fn serve_connection(
        &self,
        stream: SniffedStream,
        origin: ConnectionOrigin,
    ) -> Result<(), BoxError> {
        let router = self.router.clone();
        let service = service_fn(move |mut req: Request<Incoming>| {
            req.extensions_mut().insert(origin.clone());
            let mut router = router.clone();
            async move { router.call(req.map(Body::new)).await }
        });

        http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await?;

        Ok(())
    }
}

/// Router answering `GET /` with the connection origin as JSON.
pub fn default_router() -> Router {
    Router::new()
        .route("/", get(origin_report))
        .layer(TraceLayer::new_for_http())
}
