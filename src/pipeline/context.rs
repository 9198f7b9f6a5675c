//! Per-request state threaded through the pipeline.

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::GatewayError;

/// Mutable record carried through every stage for one inbound request.
///
/// Created once per record and dropped once its response is written.
/// The authenticated identity and the error are both set-once; the result is
/// frozen as soon as an error is recorded, except for response shaping.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    request: Map<String, Value>,
    user: Option<String>,
    error: Option<GatewayError>,
    result: Value,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Build a context for a decoded request record.
    pub fn new(request: Map<String, Value>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request,
            user: None,
            error: None,
            result: Value::Null,
            cancellation: CancellationToken::new(),
        }
    }

    /// Bind the context to its connection's cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Raw request fields.
    pub fn request(&self) -> &Map<String, Value> {
        &self.request
    }

    /// A request field, if present and string-typed.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.request.get(key).and_then(Value::as_str)
    }

    /// Declared request type (`type` field).
    pub fn request_type(&self) -> Option<&str> {
        self.field_str("type")
    }

    /// Authenticated identity, once established.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Establish the authenticated identity.
    ///
    /// Returns `false` and leaves the context untouched if an identity is already set.
    pub fn set_user(&mut self, user: impl Into<String>) -> bool {
        if self.user.is_some() {
            tracing::warn!(request_id = %self.request_id, "Attempt to replace authenticated identity ignored");
            return false;
        }
        self.user = Some(user.into());
        true
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&GatewayError> {
        self.error.as_ref()
    }

    /// Record a failure. The first recorded error wins.
    pub fn fail(&mut self, error: GatewayError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn result(&self) -> &Value {
        &self.result
    }

    /// Store the stage result. Ignored once an error is recorded.
    pub fn set_result(&mut self, result: Value) {
        if self.error.is_none() {
            self.result = result;
        }
    }

    /// Swap the result regardless of error state. Reserved for response shaping.
    pub(crate) fn replace_result(&mut self, result: Value) -> Value {
        std::mem::replace(&mut self.result, result)
    }

    /// Token cancelled when the owning connection goes away.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Consume the context, yielding its (shaped) result.
    pub fn into_result(self) -> Value {
        self.result
    }
}
