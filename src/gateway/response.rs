use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

/// JSON envelope shared by every gateway response
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn new(success: bool, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(false, message, data)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
