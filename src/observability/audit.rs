//! Audit records and the sink they are written to.
//!
//! The sink is best effort: callers log a failed write and carry on.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Request fields never written to the audit trail.
const REDACTED_FIELDS: &[&str] = &["password"];

/// What an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A request reached the audit stage.
    Request,
    /// A request ended in an internal error; `detail` holds the cause.
    InternalFailure,
}

/// One structured audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub request_id: Uuid,
    pub user: Option<String>,
    pub request_type: Option<String>,
    pub payload: Value,
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Record of an accepted request, with secrets redacted from the payload.
    pub fn request(
        request_id: Uuid,
        user: Option<&str>,
        request_type: Option<&str>,
        request: &Map<String, Value>,
    ) -> Self {
        Self {
            kind: AuditKind::Request,
            request_id,
            user: user.map(str::to_string),
            request_type: request_type.map(str::to_string),
            payload: redact(request),
            detail: None,
        }
    }

    /// Record of an internal failure. The cause stays server-side.
    pub fn internal_failure(request_id: Uuid, user: Option<&str>, cause: &str) -> Self {
        Self {
            kind: AuditKind::InternalFailure,
            request_id,
            user: user.map(str::to_string),
            request_type: None,
            payload: Value::Null,
            detail: Some(cause.to_string()),
        }
    }
}

/// Failure to deliver an audit record.
#[derive(Debug, thiserror::Error)]
#[error("audit sink unavailable: {0}")]
pub struct AuditError(pub String);

/// External observability sink for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes audit records as structured events on the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        match event.kind {
            AuditKind::Request => tracing::info!(
                target: "audit",
                request_id = %event.request_id,
                user = event.user.as_deref().unwrap_or("-"),
                request_type = event.request_type.as_deref().unwrap_or("-"),
                payload = %event.payload,
                "request"
            ),
            AuditKind::InternalFailure => tracing::error!(
                target: "audit",
                request_id = %event.request_id,
                user = event.user.as_deref().unwrap_or("-"),
                cause = event.detail.as_deref().unwrap_or("-"),
                "internal failure"
            ),
        }
        Ok(())
    }
}

/// Copy of the request with secret fields masked.
pub fn redact(request: &Map<String, Value>) -> Value {
    let mut copy = request.clone();
    for field in REDACTED_FIELDS {
        if let Some(value) = copy.get_mut(*field) {
            *value = Value::String("***".to_string());
        }
    }
    Value::Object(copy)
}
