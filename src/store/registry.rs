//! Connector registry: one shared connector per logical database.
//!
//! # Design Decisions
//! - Owned instance shared via `Arc`, never a process global
//! - Check-then-create runs under a single lock so concurrent first lookups
//!   construct exactly one connector
//! - No connector I/O happens while the lock is held; `close_all` drains the
//!   map under the lock and closes the drained handles afterwards

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::observability::metrics;
use crate::store::connector::{Connector, ConnectorError, ConnectorFactory};

#[derive(Default)]
struct RegistryState {
    connectors: HashMap<String, Arc<dyn Connector>>,
    closed: bool,
}

/// Concurrency-safe cache mapping database name to connector handle.
pub struct ConnectorRegistry {
    factory: Arc<dyn ConnectorFactory>,
    state: Mutex<RegistryState>,
}

impl ConnectorRegistry {
    /// Create an empty registry that builds connectors with `factory`.
    pub fn new(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Return the connector for `database`, creating and registering it on first use.
    pub fn get_connector(&self, database: &str) -> Result<Arc<dyn Connector>, ConnectorError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ConnectorError::RegistryClosed);
        }
        if let Some(existing) = state.connectors.get(database) {
            return Ok(Arc::clone(existing));
        }

        let connector = self.factory.create(database);
        state
            .connectors
            .insert(database.to_string(), Arc::clone(&connector));
        let registered = state.connectors.len();
        drop(state);

        metrics::record_registered_connectors(registered);
        tracing::debug!(database, registered, "Connector registered");
        Ok(connector)
    }

    /// Number of registered connectors.
    pub fn len(&self) -> usize {
        self.state.lock().connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and forget every connector. Later lookups fail with `RegistryClosed`.
    ///
    /// Returns how many connectors closed cleanly.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<(String, Arc<dyn Connector>)> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.connectors.drain().collect()
        };
        metrics::record_registered_connectors(0);

        let mut closed = 0;
        for (database, connector) in drained {
            match connector.close().await {
                Ok(()) => closed += 1,
                Err(e) => tracing::warn!(database = %database, error = %e, "Connector close failed"),
            }
        }

        tracing::info!(closed, "Connector registry closed");
        closed
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConnectorRegistry")
            .field("databases", &state.connectors.keys().collect::<Vec<_>>())
            .field("closed", &state.closed)
            .finish()
    }
}
