use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::error;

use crate::gateway::response::ApiResponse;
use crate::git::executor::ExecutorError;
use crate::github::policy::AccessDecision;
use crate::security::gh_api::GhApiError;
use crate::security::path::PathValidationError;
use crate::security::validator::ValidationError;

/// Request-level failure, rendered as the gateway's JSON envelope
///
/// Component errors convert into this through `From`, which is where the
/// status code for each kind of failure is decided.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    MalformedRequest(String),

    /// A mistake the caller can fix; `hint` says how
    #[error("{message}")]
    AmbiguousInput {
        message: String,
        hint: Option<String>,
    },

    #[error("{message}")]
    PolicyDenied {
        message: String,
        details: Option<Map<String, Value>>,
    },

    #[error("{0}")]
    Execution(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn malformed(message: impl Into<String>) -> Self {
        GatewayError::MalformedRequest(message.into())
    }

    pub fn denied(message: impl Into<String>) -> Self {
        GatewayError::PolicyDenied {
            message: message.into(),
            details: None,
        }
    }

    pub fn ambiguous(message: impl Into<String>, hint: impl Into<String>) -> Self {
        GatewayError::AmbiguousInput {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::MalformedRequest(_) | GatewayError::AmbiguousInput { .. } => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::PolicyDenied { .. } => StatusCode::FORBIDDEN,
            GatewayError::Execution(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn data(&self) -> Option<Value> {
        match self {
            GatewayError::AmbiguousInput {
                hint: Some(hint), ..
            } => Some(json!({ "hint": hint })),
            GatewayError::PolicyDenied {
                details: Some(details),
                ..
            } => Some(Value::Object(details.clone())),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ApiResponse::failure(self.to_string(), self.data());
        (self.status_code(), body).into_response()
    }
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        if err.is_malformed() {
            GatewayError::MalformedRequest(err.to_string())
        } else {
            GatewayError::denied(err.to_string())
        }
    }
}

impl From<PathValidationError> for GatewayError {
    fn from(err: PathValidationError) -> Self {
        match err {
            PathValidationError::Required | PathValidationError::Unresolvable => {
                GatewayError::MalformedRequest(err.to_string())
            }
            PathValidationError::OutsideAllowedRoots { .. } => GatewayError::denied(err.to_string()),
        }
    }
}

impl From<GhApiError> for GatewayError {
    fn from(err: GhApiError) -> Self {
        match err {
            GhApiError::MissingPath => GatewayError::MalformedRequest(err.to_string()),
            _ => GatewayError::denied(err.to_string()),
        }
    }
}

impl From<AccessDecision> for GatewayError {
    fn from(decision: AccessDecision) -> Self {
        let mut details = decision.details.unwrap_or_default();
        if let Some(visibility) = decision.visibility {
            details.insert("visibility".to_string(), json!(visibility));
        }
        GatewayError::PolicyDenied {
            message: decision.reason,
            details: (!details.is_empty()).then_some(details),
        }
    }
}

impl From<ExecutorError> for GatewayError {
    fn from(err: ExecutorError) -> Self {
        error!(error = %err, "command execution failed");
        match err {
            ExecutorError::Timeout { program, seconds } => {
                GatewayError::Execution(format!("{} timed out after {}s", program, seconds))
            }
            _ => GatewayError::Execution("Failed to execute command".to_string()),
        }
    }
}

/// Result type for gateway handlers
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
