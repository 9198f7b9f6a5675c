//! Response shaping stage: wraps every outcome in the uniform envelope.

use async_trait::async_trait;
use serde_json::Value;

use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::Stage;
use crate::protocol::envelope;

/// Always runs last, on success and failure alike.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseShapingStage;

#[async_trait]
impl Stage for ResponseShapingStage {
    fn name(&self) -> &'static str {
        "response_shaping"
    }

    async fn process(&self, ctx: &mut RequestContext) {
        let data = ctx.replace_result(Value::Null);
        let shaped = match ctx.error() {
            Some(err) => envelope::error(err.client_message()),
            None => envelope::success(data),
        };
        ctx.replace_result(shaped);
    }
}
