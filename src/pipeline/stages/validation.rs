//! Validation stage: structural checks per declared request type.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ValidationConfig;
use crate::error::GatewayError;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::Stage;
use crate::pipeline::stages::execution::parse_filter;

#[derive(Debug, Clone, Default)]
pub struct ValidationStage {
    reject_malformed_filter: bool,
}

impl ValidationStage {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            reject_malformed_filter: config.reject_malformed_filter,
        }
    }

    fn check_query(&self, ctx: &RequestContext) -> Result<(), GatewayError> {
        if !ctx.request().get("collection").is_some_and(Value::is_string) {
            return Err(GatewayError::Validation("invalid collection".to_string()));
        }

        if self.reject_malformed_filter {
            if let Some(raw) = ctx.field_str("filter").filter(|f| !f.is_empty()) {
                if parse_filter(raw).is_none() {
                    return Err(GatewayError::Validation("invalid filter".to_string()));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for ValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn process(&self, ctx: &mut RequestContext) {
        let checked = match ctx.request_type() {
            Some("query") => self.check_query(ctx),
            _ => Ok(()),
        };
        if let Err(e) = checked {
            ctx.fail(e);
        }
    }
}
