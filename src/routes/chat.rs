use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode},
};
use serde_json::Value;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    message::{ChatRequest, ChatResponse},
    services::content_filter::{MAX_MESSAGE_CHARS, ValidationError},
    services::rate_limiter::RateLimitDecision,
    state::SharedState,
};

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Client identity for rate limiting and logs. Taken from proxy headers, so
/// a caller that controls its own headers can pick any identity.
///
/// Only the first hop of `x-forwarded-for` is used, so clients behind
/// different proxy chains share a key. Keying on the raw header value would
/// give each chain its own bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    ["x-forwarded-for", "x-real-ip"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        // x-forwarded-for may carry a hop list; the first entry is the origin
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

pub async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let client = client_key(&headers);
    let span = info_span!("chat", request_id = %Uuid::new_v4(), client = %client);

    process_chat(state, client, body).instrument(span).await
}

async fn process_chat(
    state: SharedState,
    client: String,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    if let RateLimitDecision::Limited { .. } = state.rate_limiter.check(&client).await {
        warn!("rate limit exceeded");
        return Err(AppError::RateLimited { client });
    }

    let body = body.map_err(body_error)?;
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Unexpected(format!("invalid JSON body: {e}")))?;
    let request = ChatRequest::from(payload);

    let message = state
        .content_filter
        .validate(request.message.as_ref())
        .inspect_err(|e| warn!(reason = %e, "rejected chat message"))?;

    let api_key = state.credentials.resolve()?;

    info!(message_len = message.chars().count(), "forwarding chat message");

    let reply = state.completion.complete(&api_key, &message).await?;

    info!(reply_len = reply.chars().count(), "completion succeeded");

    Ok(Json(ChatResponse { reply }))
}

/// A body over the extractor's limit can only hold an oversized message.
fn body_error(rejection: BytesRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("request body exceeds buffer limit");
        AppError::InvalidInput(ValidationError::TooLong {
            max: MAX_MESSAGE_CHARS,
        })
    } else {
        AppError::Unexpected(format!("failed to read request body: {}", rejection.body_text()))
    }
}
