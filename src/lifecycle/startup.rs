//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve every configured listener into an address and PROXY policy
//! - Bind all listeners before any of them accepts traffic
//! - Run the accept loops until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::{BindAddressError, ServerConfig};
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionHandler, ConnectionTracker, Listener, ListenerError};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("listener {index}: {source}")]
    BindAddress {
        index: usize,
        #[source]
        source: BindAddressError,
    },

    #[error("listener {address}: {source}")]
    Listener {
        address: SocketAddr,
        #[source]
        source: ListenerError,
    },
}

/// A set of bound listeners sharing one connection tracker.
pub struct Server {
    listeners: Vec<Listener>,
    tracker: ConnectionTracker,
}

impl Server {
    /// Resolve and bind every listener in `config`.
    pub async fn bind(config: &ServerConfig) -> Result<Self, StartupError> {
        let tracker = ConnectionTracker::new();
        let header_timeout = config.proxy_protocol.header_timeout();

        let mut listeners = Vec::with_capacity(config.listeners.len());
        for (index, listener_config) in config.listeners.iter().enumerate() {
            let resolved = listener_config
                .resolve()
                .map_err(|source| StartupError::BindAddress { index, source })?;

            let listener = Listener::bind(&resolved, header_timeout, tracker.clone())
                .await
                .map_err(|source| StartupError::Listener {
                    address: resolved.address,
                    source,
                })?;
            listeners.push(listener);
        }

        Ok(Self { listeners, tracker })
    }

    /// Addresses actually bound, in configuration order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(Listener::local_addr).collect()
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Run every listener until `shutdown` fires.
    pub async fn serve<H: ConnectionHandler>(self, handler: Arc<H>, shutdown: ShutdownSignal) {
        let mut tasks = JoinSet::new();
        for listener in self.listeners {
            tasks.spawn(listener.run(Arc::clone(&handler), shutdown.clone()));
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Listener task failed");
            }
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "All listeners stopped"
        );
    }
}
