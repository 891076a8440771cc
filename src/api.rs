//! api.rs — HTTP surface of the reply engine.
//!
//! One real route: `POST /reply`. The caller identity comes from the
//! `x-caller-id` header stamped by the fronting auth layer, never from the
//! body. Policy skips and fallback scheduling are 200-level outcomes; only
//! authorization, validation, rate limiting and unexpected failures map to
//! error statuses.

use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::engine::{EngineError, ReplyEngine, ReplyOutcome, ReplyRequest};
use crate::ratelimit::RateLimiter;

pub const CALLER_HEADER: &str = "x-caller-id";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReplyEngine>,
    pub limiter: Arc<RateLimiter>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/reply", post(reply))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyReq {
    conversation_id: String,
    bot_id: String,
    message_text: String,
}

enum ApiError {
    BadRequest(&'static str),
    Unauthorized(String),
    Forbidden(String),
    RateLimited,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "too many requests".to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unauthorized(msg) => ApiError::Unauthorized(msg.to_string()),
            EngineError::Forbidden(msg) => ApiError::Forbidden(msg.to_string()),
            EngineError::Internal(err) => ApiError::Internal(err.to_string()),
        }
    }
}

fn outcome_json(outcome: ReplyOutcome) -> serde_json::Value {
    match outcome {
        ReplyOutcome::Skipped(reason) => serde_json::json!({ "skipped": reason.as_str() }),
        ReplyOutcome::Scheduled { tier, delay_secs } => serde_json::json!({
            "scheduled": true,
            "tier": tier.as_str(),
            "delaySeconds": delay_secs,
        }),
        ReplyOutcome::Disabled => serde_json::json!({ "scheduled": false, "disabled": true }),
        ReplyOutcome::Silent => serde_json::json!({ "scheduled": false }),
        ReplyOutcome::Reply(text) => serde_json::json!({ "reply": text }),
    }
}

async fn reply(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ReplyReq>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller_id = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthorized("missing caller identity".to_string()))?;

    // Structural body failures map to 400, same as the blank-field check.
    let Json(body) = body.map_err(|_| ApiError::BadRequest("invalid request body"))?;

    if body.conversation_id.trim().is_empty()
        || body.bot_id.trim().is_empty()
        || body.message_text.trim().is_empty()
    {
        return Err(ApiError::BadRequest(
            "conversationId, botId and messageText are required",
        ));
    }

    // Endpoint-level limiter; independent of the conversation cooldown gate.
    if !state.limiter.check(caller_id, chrono::Utc::now()) {
        return Err(ApiError::RateLimited);
    }

    let outcome = state
        .engine
        .handle(ReplyRequest {
            match_id: body.conversation_id,
            bot_id: body.bot_id,
            caller_id: caller_id.to_string(),
            message_text: body.message_text,
        })
        .await?;

    Ok(Json(outcome_json(outcome)))
}
