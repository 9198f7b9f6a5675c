//! MongoDB connector for `mongodb://` and `mongodb+srv://` URIs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::store::connector::{Connector, ConnectorError, ConnectorFactory, QueryRequest};

/// URI schemes served by [`MongoConnector`].
pub const MONGO_SCHEMES: [&str; 2] = ["mongodb", "mongodb+srv"];

/// Whether `scheme` names a MongoDB deployment.
pub fn is_mongo_scheme(scheme: &str) -> bool {
    MONGO_SCHEMES.contains(&scheme)
}

/// Connector over one database of a MongoDB deployment.
///
/// The driver client pools its own connections; the handle is cloned out of
/// the lock for each query so concurrent queries never wait on each other.
pub struct MongoConnector {
    database: String,
    connect_timeout: Duration,
    client: Mutex<Option<Client>>,
}

impl MongoConnector {
    pub fn new(database: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            database: database.into(),
            connect_timeout,
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<Client, ConnectorError> {
        self.client.lock().await.clone().ok_or(ConnectorError::NotConnected)
    }
}

impl std::fmt::Debug for MongoConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConnector")
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

fn backend(e: mongodb::error::Error) -> ConnectorError {
    ConnectorError::Backend(e.to_string())
}

fn filter_document(request: &QueryRequest) -> Result<Document, ConnectorError> {
    match &request.filter {
        Some(filter) => mongodb::bson::to_document(filter)
            .map_err(|e| ConnectorError::Backend(format!("invalid filter: {e}"))),
        None => Ok(Document::new()),
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, uri: &str) -> Result<(), ConnectorError> {
        let mut slot = self.client.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let parsed = url::Url::parse(uri).map_err(|e| ConnectorError::Connect(e.to_string()))?;
        if !is_mongo_scheme(parsed.scheme()) {
            return Err(ConnectorError::Connect(format!(
                "unsupported scheme {:?}",
                parsed.scheme()
            )));
        }

        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| ConnectorError::Connect(e.to_string()))?;
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);

        let client =
            Client::with_options(options).map_err(|e| ConnectorError::Connect(e.to_string()))?;
        client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ConnectorError::Connect(e.to_string()))?;

        tracing::debug!(database = %self.database, "Mongo connector connected");
        *slot = Some(client);
        Ok(())
    }

    async fn execute_query(&self, request: &QueryRequest) -> Result<Value, ConnectorError> {
        let client = self.client().await?;
        let collection = client
            .database(&self.database)
            .collection::<Document>(&request.collection);

        match request.action.as_str() {
            "find" => {
                let filter = filter_document(request)?;
                let documents: Vec<Document> = collection
                    .find(filter)
                    .await
                    .map_err(backend)?
                    .try_collect()
                    .await
                    .map_err(backend)?;
                Ok(Value::Array(
                    documents
                        .into_iter()
                        .map(|d| Bson::Document(d).into_relaxed_extjson())
                        .collect(),
                ))
            }
            "count" => {
                let filter = filter_document(request)?;
                let count = collection.count_documents(filter).await.map_err(backend)?;
                Ok(serde_json::json!({ "count": count }))
            }
            other => Err(ConnectorError::UnsupportedAction(other.to_string())),
        }
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.shutdown().await;
            tracing::debug!(database = %self.database, "Mongo connector closed");
        }
        Ok(())
    }
}

/// Creates one [`MongoConnector`] per logical database.
#[derive(Debug, Clone)]
pub struct MongoConnectorFactory {
    connect_timeout: Duration,
}

impl MongoConnectorFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl ConnectorFactory for MongoConnectorFactory {
    fn create(&self, database: &str) -> Arc<dyn Connector> {
        Arc::new(MongoConnector::new(database, self.connect_timeout))
    }
}
