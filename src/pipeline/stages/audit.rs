//! Audit stage: best-effort record of every request that reaches it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::observability::audit::{AuditEvent, AuditSink};
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::Stage;

#[derive(Clone)]
pub struct AuditStage {
    sink: Arc<dyn AuditSink>,
}

impl AuditStage {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// The sink this stage writes to.
    pub fn sink(&self) -> Arc<dyn AuditSink> {
        Arc::clone(&self.sink)
    }
}

impl std::fmt::Debug for AuditStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for AuditStage {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn process(&self, ctx: &mut RequestContext) {
        let event = AuditEvent::request(
            ctx.request_id(),
            ctx.user(),
            ctx.request_type(),
            ctx.request(),
        );
        if let Err(e) = self.sink.record(&event) {
            tracing::warn!(request_id = %ctx.request_id(), error = %e, "Audit record dropped");
        }
    }
}
