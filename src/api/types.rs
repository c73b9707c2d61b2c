//! Shared request/response types for the authentication boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authentication parameters carried as query parameters on GET/DELETE requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthQuery {
    pub timestamp: i64,
    pub hash: String,
}

/// Authentication-only request body for POST/PUT requests with no other payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthRequest {
    pub timestamp: i64,
    pub hash: String,
}

/// 401 response body for a failed authentication check.
#[derive(Debug, Clone, Serialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AuthErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
