//! Gateway server: accept loop and connection handoff.
//!
//! # Data Flow
//! ```text
//! Listener::accept (bounded)
//!     → mutual TLS handshake (deadline-bound)
//!     → worker::serve_connection (one task per connection)
//!     → Gateway::handle per record
//!
//! Shutdown:
//!     stop accepting → drain open connections (grace period) → close all connectors
//! ```

pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::lifecycle::Shutdown;
use crate::net::{load_mtls_config, ConnectionTracker, Listener, ListenerError, TlsError};

pub use worker::serve_connection;

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct GatewayServer {
    gateway: Arc<Gateway>,
    tls: Option<TlsAcceptor>,
    handshake_timeout: Duration,
    shutdown_grace: Duration,
    tracker: ConnectionTracker,
}

impl GatewayServer {
    /// Prepare the server. Loads TLS material unless plaintext is enabled.
    pub fn new(config: &GatewayConfig, gateway: Arc<Gateway>) -> Result<Self, TlsError> {
        let tls = match (&config.listener.tls, config.listener.insecure_plaintext) {
            (Some(tls), _) => Some(load_mtls_config(tls)?),
            (None, true) => {
                tracing::warn!("Serving plaintext; client identity is not verified at the transport");
                None
            }
            (None, false) => return Err(TlsError::NotConfigured),
        };

        Ok(Self {
            gateway,
            tls,
            handshake_timeout: Duration::from_secs(config.listener.handshake_timeout_secs),
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
            tracker: ConnectionTracker::new(),
        })
    }

    /// Accept until `shutdown` fires, then drain and close every connector.
    pub async fn run(self, listener: Listener, shutdown: &Shutdown) -> Result<(), ListenerError> {
        let mut stop = shutdown.subscribe();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, tls = self.tls.is_some(), "Gateway server starting");
        }

        loop {
            let accepted = tokio::select! {
                _ = stop.recv() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let guard = self.tracker.track();
            let span = tracing::info_span!("connection", connection_id = %guard.id(), peer = %peer);
            let gateway = Arc::clone(&self.gateway);
            let tls = self.tls.clone();
            let handshake_timeout = self.handshake_timeout;
            let conn_shutdown = shutdown.subscribe();

            tokio::spawn(
                async move {
                    let _permit = permit;
                    let _guard = guard;

                    let outcome = match tls {
                        Some(acceptor) => {
                            match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                                Ok(Ok(tls_stream)) => {
                                    serve_connection(tls_stream, gateway, conn_shutdown).await
                                }
                                Ok(Err(e)) => {
                                    tracing::warn!(error = %e, "TLS handshake failed");
                                    return;
                                }
                                Err(_) => {
                                    tracing::warn!("TLS handshake timed out");
                                    return;
                                }
                            }
                        }
                        None => serve_connection(stream, gateway, conn_shutdown).await,
                    };

                    match outcome {
                        Ok(()) => tracing::debug!("Connection finished"),
                        Err(e) => tracing::warn!(error = %e, "Connection terminated"),
                    }
                }
                .instrument(span),
            );
        }

        tracing::info!(open = self.tracker.active_count(), "Stopped accepting connections");
        if !self.tracker.wait_for_drain(self.shutdown_grace).await {
            tracing::warn!(
                open = self.tracker.active_count(),
                "Grace period elapsed with connections still open"
            );
        }

        let closed = self.gateway.registry().close_all().await;
        tracing::info!(connectors = closed, "Gateway server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("tls", &self.tls.is_some())
            .field("handshake_timeout", &self.handshake_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConnectorRegistry, MemoryConnectorFactory, MemoryStore};

    fn gateway(config: &GatewayConfig) -> Arc<Gateway> {
        let factory = MemoryConnectorFactory::new(Arc::new(MemoryStore::new()));
        Arc::new(Gateway::new(config, Arc::new(ConnectorRegistry::new(Arc::new(factory)))))
    }

    #[test]
    fn refuses_to_start_without_tls_or_plaintext_opt_in() {
        let config = GatewayConfig::default();
        let err = GatewayServer::new(&config, gateway(&config)).unwrap_err();
        assert!(matches!(err, TlsError::NotConfigured));
    }

    #[test]
    fn plaintext_opt_in_skips_tls() {
        let mut config = GatewayConfig::default();
        config.listener.insecure_plaintext = true;
        let server = GatewayServer::new(&config, gateway(&config)).unwrap();
        assert!(server.tls.is_none());
    }
}
