//! Gateway controller: owns the pipeline and turns decoded records into responses.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::observability::audit::{AuditSink, TracingAuditSink};
use crate::observability::metrics;
use crate::pipeline::stages::{
    AuditStage, AuthenticationStage, AuthorizationStage, Clock, CollectionAcl, CredentialTable,
    ExecutionStage, RateLimitStage, RateLimiter, SystemClock, ValidationStage,
};
use crate::pipeline::{Pipeline, PipelineStages, RequestContext};
use crate::protocol::envelope::STATUS_SUCCESS;
use crate::store::ConnectorRegistry;

/// Processes one request record at a time on behalf of connection workers.
///
/// Shared by every worker; the pipeline and the state it holds are immutable
/// apart from the rate-limit counters and the connector registry.
pub struct Gateway {
    pipeline: Pipeline,
    registry: Arc<ConnectorRegistry>,
    max_frame_bytes: usize,
}

impl Gateway {
    /// Build from config with the tracing audit sink and the wall clock.
    pub fn new(config: &GatewayConfig, registry: Arc<ConnectorRegistry>) -> Self {
        Self::with_components(
            config,
            registry,
            Arc::new(TracingAuditSink),
            Arc::new(SystemClock),
        )
    }

    pub fn with_components(
        config: &GatewayConfig,
        registry: Arc<ConnectorRegistry>,
        audit_sink: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rate_limit = if config.rate_limit.enabled {
            RateLimitStage::new(Arc::new(RateLimiter::from_config(&config.rate_limit, clock)))
        } else {
            RateLimitStage::disabled()
        };

        let pipeline = Pipeline::new(PipelineStages {
            authentication: AuthenticationStage::new(CredentialTable::from_config(&config.auth)),
            authorization: AuthorizationStage::new(CollectionAcl::from_config(&config.auth)),
            validation: ValidationStage::new(&config.validation),
            rate_limit,
            audit: AuditStage::new(audit_sink),
            execution: ExecutionStage::new(Arc::clone(&registry), &config.store, &config.timeouts),
        });

        tracing::debug!(stages = ?pipeline.stage_names(), "Pipeline assembled");

        Self {
            pipeline,
            registry,
            max_frame_bytes: config.validation.max_frame_bytes,
        }
    }

    /// Run one decoded record through the pipeline.
    ///
    /// `session_user` is an identity already established on this connection.
    pub async fn handle(
        &self,
        request: Map<String, Value>,
        session_user: Option<&str>,
        cancellation: CancellationToken,
    ) -> RequestContext {
        let start = Instant::now();
        let mut ctx = RequestContext::new(request).with_cancellation(cancellation);
        if let Some(user) = session_user {
            ctx.set_user(user);
        }

        let span = tracing::debug_span!(
            "request",
            request_id = %ctx.request_id(),
            request_type = ctx.request_type().unwrap_or("-"),
        );
        let ctx = self.pipeline.process(ctx).instrument(span).await;

        let status = match ctx.result().get("status").and_then(Value::as_str) {
            Some(STATUS_SUCCESS) => "success",
            _ => "error",
        };
        metrics::record_request(ctx.request_type(), status, start);
        ctx
    }

    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("pipeline", &self.pipeline)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish_non_exhaustive()
    }
}
