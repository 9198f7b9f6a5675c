//! In-process document store backing the `memory://` connector scheme.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::store::connector::{Connector, ConnectorError, ConnectorFactory, QueryRequest};

/// URI scheme served by [`MemoryConnector`].
pub const MEMORY_SCHEME: &str = "memory";

type Document = Map<String, Value>;
type Collections = HashMap<String, Vec<Document>>;

/// Shared document storage: database → collection → documents.
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: RwLock<HashMap<String, Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a seed file shaped as `{ "<db>": { "<collection>": [ {..}, .. ] } }`.
    pub fn load_seed(path: &Path) -> Result<Self, ConnectorError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConnectorError::Backend(format!("read seed {}: {e}", path.display())))?;
        let seed: HashMap<String, Collections> = serde_json::from_str(&raw)
            .map_err(|e| ConnectorError::Backend(format!("parse seed {}: {e}", path.display())))?;

        let documents: usize = seed.values().flat_map(|c| c.values()).map(Vec::len).sum();
        tracing::info!(databases = seed.len(), documents, "Loaded store seed");

        Ok(Self {
            databases: RwLock::new(seed),
        })
    }

    /// Append a document to a collection, creating both levels as needed.
    pub fn insert(&self, database: &str, collection: &str, document: Document) {
        self.databases
            .write()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    fn matching(&self, database: &str, collection: &str, filter: Option<&Document>) -> Vec<Document> {
        let databases = self.databases.read();
        let Some(documents) = databases.get(database).and_then(|c| c.get(collection)) else {
            return Vec::new();
        };
        documents
            .iter()
            .filter(|doc| match filter {
                Some(filter) => filter.iter().all(|(k, v)| doc.get(k) == Some(v)),
                None => true,
            })
            .cloned()
            .collect()
    }
}

/// Connector over one database of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnector {
    database: String,
    store: Arc<MemoryStore>,
    connected: AtomicBool,
}

impl MemoryConnector {
    pub fn new(database: impl Into<String>, store: Arc<MemoryStore>) -> Self {
        Self {
            database: database.into(),
            store,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, uri: &str) -> Result<(), ConnectorError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let parsed = url::Url::parse(uri).map_err(|e| ConnectorError::Connect(e.to_string()))?;
        if parsed.scheme() != MEMORY_SCHEME {
            return Err(ConnectorError::Connect(format!(
                "unsupported scheme {:?}",
                parsed.scheme()
            )));
        }
        if !self.connected.swap(true, Ordering::AcqRel) {
            tracing::debug!(database = %self.database, "Memory connector connected");
        }
        Ok(())
    }

    async fn execute_query(&self, request: &QueryRequest) -> Result<Value, ConnectorError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ConnectorError::NotConnected);
        }

        let filter = request.filter.as_ref();
        match request.action.as_str() {
            "find" => {
                let documents = self
                    .store
                    .matching(&self.database, &request.collection, filter);
                Ok(Value::Array(documents.into_iter().map(Value::Object).collect()))
            }
            "count" => {
                let count = self
                    .store
                    .matching(&self.database, &request.collection, filter)
                    .len();
                Ok(serde_json::json!({ "count": count }))
            }
            other => Err(ConnectorError::UnsupportedAction(other.to_string())),
        }
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

/// Creates [`MemoryConnector`]s that share one store.
#[derive(Debug, Clone)]
pub struct MemoryConnectorFactory {
    store: Arc<MemoryStore>,
}

impl MemoryConnectorFactory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

impl ConnectorFactory for MemoryConnectorFactory {
    fn create(&self, database: &str) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector::new(database, Arc::clone(&self.store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.insert("test", "orders", doc(json!({"id": 1, "status": "open"})));
        store.insert("test", "orders", doc(json!({"id": 2, "status": "closed"})));
        Arc::new(store)
    }

    fn find(collection: &str, filter: Option<Value>) -> QueryRequest {
        QueryRequest {
            collection: collection.into(),
            action: "find".into(),
            filter: filter.map(doc),
            params: Vec::new(),
        }
    }

    #[tokio::test]
    async fn query_before_connect_fails() {
        let connector = MemoryConnector::new("test", seeded());
        let err = connector.execute_query(&find("orders", None)).await.unwrap_err();
        assert!(matches!(err, ConnectorError::NotConnected));
    }

    #[tokio::test]
    async fn connect_is_idempotent_and_checks_scheme() {
        let connector = MemoryConnector::new("test", seeded());
        connector.connect("memory://local").await.unwrap();
        connector.connect("memory://local").await.unwrap();

        let other = MemoryConnector::new("test", seeded());
        assert!(matches!(
            other.connect("mongodb://127.0.0.1:27017").await,
            Err(ConnectorError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn find_applies_equality_filter() {
        let connector = MemoryConnector::new("test", seeded());
        connector.connect("memory://local").await.unwrap();

        let all = connector.execute_query(&find("orders", None)).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);

        let open = connector
            .execute_query(&find("orders", Some(json!({"status": "open"}))))
            .await
            .unwrap();
        assert_eq!(open, json!([{"id": 1, "status": "open"}]));

        let missing = connector.execute_query(&find("nothing", None)).await.unwrap();
        assert_eq!(missing, json!([]));
    }

    #[tokio::test]
    async fn count_and_unknown_actions() {
        let connector = MemoryConnector::new("test", seeded());
        connector.connect("memory://local").await.unwrap();

        let mut request = find("orders", None);
        request.action = "count".into();
        assert_eq!(connector.execute_query(&request).await.unwrap(), json!({"count": 2}));

        request.action = "drop".into();
        let err = connector.execute_query(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "unsupported action: drop");
    }

    #[test]
    fn seed_file_populates_store() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"test": {{"orders": [{{"id": 7}}]}}}}"#).unwrap();

        let store = MemoryStore::load_seed(file.path()).unwrap();
        assert_eq!(store.matching("test", "orders", None).len(), 1);
    }
}
