//! Error taxonomy for the gateway.
//!
//! Business-logic errors are recorded on a [`RequestContext`](crate::pipeline::RequestContext)
//! and always reach the client inside a well-formed envelope. Protocol and transport errors
//! end the connection's read loop instead.

/// Every failure a request or connection can end with.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No usable credential fields on an unauthenticated request.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Unknown user or wrong secret.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Collection is not in the user's permitted set.
    #[error("access denied to collection")]
    AccessDenied,

    /// Request shape is wrong for its declared type.
    #[error("{0}")]
    Validation(String),

    /// Per-user request threshold exceeded in the current window.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The data store connector failed.
    #[error("execution error: {0}")]
    Execution(String),

    /// Undeclared or unsupported request type.
    #[error("unsupported message type")]
    UnsupportedType,

    /// The framing channel can no longer be trusted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection-level I/O failure.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Unclassified failure. The cause never leaves the process.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Message placed in the response envelope.
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the error is recorded on a context and answered with an envelope.
    pub fn is_business(&self) -> bool {
        !matches!(
            self,
            GatewayError::Protocol(_) | GatewayError::Transport(_) | GatewayError::Internal(_)
        )
    }

    /// Stable label for metrics and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::AuthenticationRequired => "authentication_required",
            GatewayError::AuthenticationFailed => "authentication_failed",
            GatewayError::AccessDenied => "access_denied",
            GatewayError::Validation(_) => "validation_error",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::Execution(_) => "execution_error",
            GatewayError::UnsupportedType => "unsupported_type",
            GatewayError::Protocol(_) => "protocol_error",
            GatewayError::Transport(_) => "transport_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_match_protocol() {
        assert_eq!(GatewayError::AuthenticationFailed.to_string(), "authentication failed");
        assert_eq!(GatewayError::AccessDenied.to_string(), "access denied to collection");
        assert_eq!(GatewayError::RateLimited.to_string(), "rate limit exceeded");
        assert_eq!(
            GatewayError::Execution("not connected".into()).to_string(),
            "execution error: not connected"
        );
        assert_eq!(
            GatewayError::Validation("missing collection".into()).to_string(),
            "missing collection"
        );
    }

    #[test]
    fn internal_cause_is_not_echoed() {
        let err = GatewayError::Internal("registry closed for db orders".into());
        assert_eq!(err.client_message(), "internal error");
        assert!(!err.is_business());
        assert!(GatewayError::UnsupportedType.is_business());
    }
}
