//! Execution stage: runs the request against the data store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::{StoreConfig, TimeoutConfig};
use crate::error::GatewayError;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::Stage;
use crate::store::{Connector, ConnectorError, ConnectorRegistry, QueryRequest};

const DEFAULT_ACTION: &str = "find";

/// Decode an embedded filter document. `None` when it is not a JSON object.
pub fn parse_filter(raw: &str) -> Option<Map<String, Value>> {
    serde_json::from_str(raw).ok()
}

/// Build the connector-level query from request fields.
///
/// A filter that does not decode is dropped and the query runs unfiltered.
pub fn build_query(request: &Map<String, Value>) -> QueryRequest {
    let field = |key: &str| request.get(key).and_then(Value::as_str);

    let filter = field("filter").filter(|raw| !raw.is_empty()).and_then(|raw| {
        let parsed = parse_filter(raw);
        if parsed.is_none() {
            tracing::debug!("Ignoring malformed filter document");
        }
        parsed
    });

    QueryRequest {
        collection: field("collection").unwrap_or_default().to_string(),
        action: field("action").unwrap_or(DEFAULT_ACTION).to_string(),
        filter,
        params: request
            .get("params")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

/// Dispatches on request type; queries go to the connector for the request's database.
pub struct ExecutionStage {
    registry: Arc<ConnectorRegistry>,
    uri: String,
    default_database: String,
    connect_timeout: Duration,
    timeout: Option<Duration>,
}

impl ExecutionStage {
    pub fn new(registry: Arc<ConnectorRegistry>, store: &StoreConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            registry,
            uri: store.uri.clone(),
            default_database: store.default_database.clone(),
            connect_timeout: Duration::from_secs(store.connect_timeout_secs),
            timeout: timeouts.execution_secs.map(Duration::from_secs),
        }
    }

    fn database<'a>(&'a self, ctx: &'a RequestContext) -> &'a str {
        ctx.field_str("database")
            .filter(|db| !db.is_empty())
            .unwrap_or(&self.default_database)
    }

    async fn run(
        &self,
        connector: &dyn Connector,
        query: &QueryRequest,
    ) -> Result<Value, GatewayError> {
        let call = async {
            tokio::time::timeout(self.connect_timeout, connector.connect(&self.uri))
                .await
                .map_err(|_| ConnectorError::Connect("connect timed out".to_string()))??;
            connector.execute_query(query).await
        };

        let outcome: Result<Value, ConnectorError> = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(GatewayError::Execution(format!(
                        "timed out after {}s",
                        limit.as_secs()
                    )))
                }
            },
            None => call.await,
        };
        outcome.map_err(|e| GatewayError::Execution(e.to_string()))
    }

    async fn execute_query(&self, ctx: &mut RequestContext) {
        let query = build_query(ctx.request());
        let database = self.database(ctx).to_string();

        let connector = match self.registry.get_connector(&database) {
            Ok(connector) => connector,
            Err(e) => {
                ctx.fail(GatewayError::Internal(format!(
                    "resolve connector for {database}: {e}"
                )));
                return;
            }
        };

        let cancellation = ctx.cancellation().clone();
        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                Err(GatewayError::Internal("connection closed during execution".to_string()))
            }
            outcome = self.run(connector.as_ref(), &query) => outcome,
        };

        match outcome {
            Ok(result) => ctx.set_result(result),
            Err(e) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    database = %database,
                    collection = %query.collection,
                    error = %e,
                    "Query failed"
                );
                ctx.fail(e);
            }
        }
    }
}

impl std::fmt::Debug for ExecutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionStage")
            .field("default_database", &self.default_database)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for ExecutionStage {
    fn name(&self) -> &'static str {
        "execution"
    }

    async fn process(&self, ctx: &mut RequestContext) {
        match ctx.request_type() {
            Some("query") => self.execute_query(ctx).await,
            Some("auth") => {
                let user = ctx.user().map(str::to_string);
                ctx.set_result(json!({ "authenticated": user }));
            }
            _ => ctx.fail(GatewayError::UnsupportedType),
        }
    }
}
