//! Ordered stage execution with short-circuit on error.

use std::sync::Arc;

use crate::error::GatewayError;
use crate::observability::audit::{AuditEvent, AuditSink};
use crate::observability::metrics;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::Stage;
use crate::pipeline::stages::{
    AuditStage, AuthenticationStage, AuthorizationStage, ExecutionStage, RateLimitStage,
    ResponseShapingStage, ValidationStage,
};

/// The business-logic stages, one slot each.
///
/// Named slots fix the order at construction: a pipeline cannot be assembled
/// with authorization ahead of authentication.
pub struct PipelineStages {
    pub authentication: AuthenticationStage,
    pub authorization: AuthorizationStage,
    pub validation: ValidationStage,
    pub rate_limit: RateLimitStage,
    pub audit: AuditStage,
    pub execution: ExecutionStage,
}

/// Immutable, ordered request-processing chain.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    shaping: ResponseShapingStage,
    audit_sink: Arc<dyn AuditSink>,
}

impl Pipeline {
    pub fn new(stages: PipelineStages) -> Self {
        let PipelineStages {
            authentication,
            authorization,
            validation,
            rate_limit,
            audit,
            execution,
        } = stages;
        let audit_sink = audit.sink();

        Self {
            stages: vec![
                Box::new(authentication),
                Box::new(authorization),
                Box::new(validation),
                Box::new(rate_limit),
                Box::new(audit),
                Box::new(execution),
            ],
            shaping: ResponseShapingStage,
            audit_sink,
        }
    }

    /// Stage names in execution order, response shaping included.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once(self.shaping.name()))
            .collect()
    }

    /// Run `ctx` through every stage. Stops at the first error; shaping always runs.
    pub async fn process(&self, mut ctx: RequestContext) -> RequestContext {
        for stage in &self.stages {
            if ctx.has_error() {
                break;
            }
            stage.process(&mut ctx).await;

            if let Some(err) = ctx.error() {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    stage = stage.name(),
                    error = %err,
                    "Request rejected"
                );
                metrics::record_rejection(err.kind());
                if !err.is_business() {
                    let cause = match err {
                        GatewayError::Internal(cause) => cause.clone(),
                        other => other.to_string(),
                    };
                    self.record_internal_failure(&ctx, &cause);
                }
            }
        }

        self.shaping.process(&mut ctx).await;
        ctx
    }

    fn record_internal_failure(&self, ctx: &RequestContext, cause: &str) {
        let event = AuditEvent::internal_failure(ctx.request_id(), ctx.user(), cause);
        if let Err(e) = self.audit_sink.record(&event) {
            tracing::error!(request_id = %ctx.request_id(), cause, error = %e, "Internal failure not audited");
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, StoreConfig, TimeoutConfig, ValidationConfig};
    use crate::observability::audit::{AuditError, AuditKind};
    use crate::pipeline::stages::{CollectionAcl, CredentialTable};
    use crate::store::{Connector, ConnectorError, ConnectorFactory, ConnectorRegistry, QueryRequest};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls(AtomicUsize);

    struct StubConnector(Arc<Calls>);

    #[async_trait]
    impl Connector for StubConnector {
        async fn connect(&self, _uri: &str) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn execute_query(&self, request: &QueryRequest) -> Result<Value, ConnectorError> {
            self.0 .0.fetch_add(1, Ordering::SeqCst);
            Ok(json!([{ "from": request.collection }]))
        }

        async fn close(&self) -> Result<(), ConnectorError> {
            Ok(())
        }
    }

    struct StubFactory(Arc<Calls>);

    impl ConnectorFactory for StubFactory {
        fn create(&self, _database: &str) -> Arc<dyn Connector> {
            Arc::new(StubConnector(Arc::clone(&self.0)))
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<AuditKind>>);

    impl AuditSink for RecordingSink {
        fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
            self.0.lock().push(event.kind);
            Ok(())
        }
    }

    fn pipeline(calls: Arc<Calls>, sink: Arc<RecordingSink>) -> (Pipeline, Arc<ConnectorRegistry>) {
        let auth = AuthConfig::default();
        let registry = Arc::new(ConnectorRegistry::new(Arc::new(StubFactory(calls))));
        let pipeline = Pipeline::new(PipelineStages {
            authentication: AuthenticationStage::new(CredentialTable::from_config(&auth)),
            authorization: AuthorizationStage::new(CollectionAcl::from_config(&auth)),
            validation: ValidationStage::new(&ValidationConfig::default()),
            rate_limit: RateLimitStage::disabled(),
            audit: AuditStage::new(sink),
            execution: ExecutionStage::new(
                Arc::clone(&registry),
                &StoreConfig::default(),
                &TimeoutConfig::default(),
            ),
        });
        (pipeline, registry)
    }

    fn context(value: Value) -> RequestContext {
        let Value::Object(map) = value else { panic!("object expected") };
        RequestContext::new(map)
    }

    #[test]
    fn stages_run_in_security_order() {
        let (pipeline, _) = pipeline(Arc::default(), Arc::default());
        assert_eq!(
            pipeline.stage_names(),
            [
                "authentication",
                "authorization",
                "validation",
                "rate_limit",
                "audit",
                "execution",
                "response_shaping"
            ]
        );
    }

    #[tokio::test]
    async fn successful_query_is_wrapped() {
        let calls = Arc::new(Calls::default());
        let (pipeline, _) = pipeline(calls.clone(), Arc::default());

        let ctx = pipeline
            .process(context(json!({
                "user": "alice", "password": "alice-pass",
                "type": "query", "collection": "orders", "action": "find", "filter": "{}"
            })))
            .await;

        assert_eq!(
            ctx.result(),
            &json!({"status": "success", "data": [{"from": "orders"}]})
        );
        assert_eq!(calls.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_authentication_never_reaches_connector() {
        let calls = Arc::new(Calls::default());
        let sink = Arc::new(RecordingSink::default());
        let (pipeline, registry) = pipeline(calls.clone(), sink.clone());

        let ctx = pipeline
            .process(context(json!({
                "user": "alice", "password": "wrong",
                "type": "query", "collection": "orders"
            })))
            .await;

        assert_eq!(
            ctx.result(),
            &json!({"status": "error", "error": "authentication failed"})
        );
        assert_eq!(calls.0.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
        assert!(sink.0.lock().is_empty(), "audit stage must not run after rejection");
    }

    #[tokio::test]
    async fn denied_collection_short_circuits() {
        let calls = Arc::new(Calls::default());
        let (pipeline, _) = pipeline(calls.clone(), Arc::default());

        let ctx = pipeline
            .process(context(json!({
                "user": "bob", "password": "bob-pass",
                "type": "query", "collection": "users"
            })))
            .await;

        assert_eq!(ctx.result()["error"], "access denied to collection");
        assert_eq!(ctx.user(), Some("bob"));
        assert_eq!(calls.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn internal_failure_goes_to_audit_sink_not_client() {
        let sink = Arc::new(RecordingSink::default());
        let (pipeline, registry) = pipeline(Arc::default(), sink.clone());
        registry.close_all().await;

        let ctx = pipeline
            .process(context(json!({
                "user": "alice", "password": "alice-pass",
                "type": "query", "collection": "orders"
            })))
            .await;

        assert_eq!(
            ctx.result(),
            &json!({"status": "error", "error": "internal error"})
        );
        assert_eq!(
            *sink.0.lock(),
            vec![AuditKind::Request, AuditKind::InternalFailure]
        );
    }

    #[tokio::test]
    async fn empty_request_requires_authentication() {
        let (pipeline, _) = pipeline(Arc::default(), Arc::default());
        let ctx = pipeline.process(RequestContext::new(Map::new())).await;
        assert_eq!(ctx.result()["error"], "authentication required");
    }
}
