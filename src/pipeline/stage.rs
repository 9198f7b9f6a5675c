//! The capability every pipeline stage implements.

use async_trait::async_trait;

use crate::pipeline::context::RequestContext;

/// One unit of request processing.
///
/// A stage transforms or validates the context and signals rejection by
/// recording an error on it; the engine decides what runs next.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn process(&self, ctx: &mut RequestContext);
}
