//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start the metrics endpoint when enabled
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, so traffic arrives only once the pipeline is ready

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::lifecycle::{signals, Shutdown};
use crate::net::{Listener, ListenerError, TlsError};
use crate::observability::metrics;
use crate::server::GatewayServer;
use crate::store::memory::MEMORY_SCHEME;
use crate::store::mongo::is_mongo_scheme;
use crate::store::{
    ConnectorError, ConnectorFactory, ConnectorRegistry, MemoryConnectorFactory, MemoryStore,
    MongoConnectorFactory,
};

/// Error type for startup and serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("store: {0}")]
    Store(#[from] ConnectorError),

    #[error("tls: {0}")]
    Tls(#[from] TlsError),

    #[error("listener: {0}")]
    Listener(#[from] ListenerError),
}

/// Build the connector registry, choosing the backend from the store URI's scheme.
///
/// No connection is opened here; connectors connect on first use.
pub fn build_registry(config: &GatewayConfig) -> Result<Arc<ConnectorRegistry>, ConnectorError> {
    let uri = url::Url::parse(&config.store.uri)
        .map_err(|e| ConnectorError::Connect(format!("store uri: {e}")))?;

    let factory: Arc<dyn ConnectorFactory> = match uri.scheme() {
        MEMORY_SCHEME => {
            let store = match &config.store.seed_path {
                Some(path) => MemoryStore::load_seed(Path::new(path))?,
                None => MemoryStore::new(),
            };
            Arc::new(MemoryConnectorFactory::new(Arc::new(store)))
        }
        scheme if is_mongo_scheme(scheme) => Arc::new(MongoConnectorFactory::new(
            Duration::from_secs(config.store.connect_timeout_secs),
        )),
        scheme => {
            return Err(ConnectorError::Connect(format!("unsupported scheme {scheme:?}")));
        }
    };

    tracing::info!(backend = uri.scheme(), "Connector registry ready");
    Ok(Arc::new(ConnectorRegistry::new(factory)))
}

/// Run the gateway until a shutdown signal arrives.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            signals::wait_for_shutdown_signal().await;
            shutdown.trigger();
        });
    }
    serve(config, shutdown).await
}

/// Run the gateway until `shutdown` is triggered.
pub async fn serve(config: GatewayConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = build_registry(&config)?;
    let gateway = Arc::new(Gateway::new(&config, registry));
    let server = GatewayServer::new(&config, gateway)?;
    let listener = Listener::bind(&config.listener).await?;

    server.run(listener, &shutdown).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn registry_uses_seed_file() {
        let mut seed = tempfile::NamedTempFile::new().unwrap();
        write!(seed, r#"{{"test": {{"orders": [{{"id": 1}}]}}}}"#).unwrap();

        let mut config = GatewayConfig::default();
        config.store.seed_path = Some(seed.path().display().to_string());
        let registry = build_registry(&config).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_seed_file_fails_startup() {
        let mut config = GatewayConfig::default();
        config.store.seed_path = Some("/nonexistent/seed.json".into());
        assert!(build_registry(&config).is_err());
    }

    #[tokio::test]
    async fn mongo_uri_selects_mongo_backend() {
        let mut config = GatewayConfig::default();
        config.store.uri = "mongodb://127.0.0.1:1".into();
        let registry = build_registry(&config).unwrap();
        assert!(registry.is_empty());

        // A mongo connector refuses memory:// where the memory backend would accept it.
        let connector = registry.get_connector("test").unwrap();
        assert!(matches!(
            connector.connect("memory://local").await,
            Err(ConnectorError::Connect(_))
        ));
    }

    #[test]
    fn unsupported_scheme_fails_startup() {
        let mut config = GatewayConfig::default();
        config.store.uri = "postgres://db:5432".into();
        assert!(matches!(build_registry(&config), Err(ConnectorError::Connect(_))));
    }

    #[tokio::test]
    async fn serve_stops_on_trigger() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.listener.insecure_plaintext = true;

        let shutdown = Shutdown::new();
        let task = tokio::spawn(serve(config, shutdown.clone()));
        // Let the accept loop subscribe before triggering.
        while shutdown.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        shutdown.trigger();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.is_ok());
    }
}
