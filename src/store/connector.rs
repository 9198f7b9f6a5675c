//! Data store connector capability.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Connector-level description of one query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRequest {
    /// Target collection.
    pub collection: String,
    /// Operation name, e.g. "find".
    pub action: String,
    /// Decoded filter document, if the request carried a usable one.
    pub filter: Option<Map<String, Value>>,
    /// Positional parameters for actions that take them.
    pub params: Vec<Value>,
}

/// Error type for connector operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("not connected")]
    NotConnected,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("connector registry is closed")]
    RegistryClosed,

    #[error("{0}")]
    Backend(String),
}

/// Capability used to run queries against one logical database.
///
/// Implementations are shared by every worker that resolves the same database,
/// so all methods take `&self` and must be safe under concurrent use.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish the connection. Calling it again on a connected handle is a no-op.
    async fn connect(&self, uri: &str) -> Result<(), ConnectorError>;

    /// Run one query and return its result document.
    async fn execute_query(&self, request: &QueryRequest) -> Result<Value, ConnectorError>;

    /// Release the connection.
    async fn close(&self) -> Result<(), ConnectorError>;
}

/// Builds connector handles for the registry. Must not perform I/O.
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, database: &str) -> Arc<dyn Connector>;
}
