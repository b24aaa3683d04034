use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound chat body. `message` is kept loose so a missing or non-string
/// value can be reported as a validation error rather than a decode failure.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<Value>,
}

impl From<Value> for ChatRequest {
    fn from(body: Value) -> Self {
        Self {
            message: body.get("message").cloned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
