//! `POST /api/invoke`: relay one prompt to the model as an SSE stream.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use folio_types::{
    ChatTurn, FailureBody, InvokeRequest, Role, StreamErrorPayload, ValidationErrorBody,
};
use tracing::{debug, info};
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::relay;
use crate::state::AppState;

/// Longest accepted prompt, in bytes.
const MAX_PROMPT_BYTES: usize = 128 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(invoke),
    components(schemas(
        InvokeRequest,
        ChatTurn,
        Role,
        StreamErrorPayload,
        ValidationErrorBody,
        FailureBody
    ))
)]
pub struct InvokeApi;

/// Routes nested under `/api`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/invoke", post(invoke))
}

/// Stream a completion for `prompt` (`POST /api/invoke`).
///
/// The body is a sequence of `data: <fragment>` events ended by
/// `data: [DONE]`, or by a single `event: error` event carrying
/// `{"error": "..."}` when the model fails mid-stream.
#[utoipa::path(
    post,
    path = "/api/invoke",
    tag = "chat",
    request_body = InvokeRequest,
    responses(
        (status = 200, description = "Completion stream", content_type = "text/event-stream", body = String),
        (status = 400, description = "Invalid request", body = ValidationErrorBody),
        (status = 500, description = "Model unavailable", body = FailureBody),
    )
)]
pub async fn invoke(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(req) = payload?;
    req.validate()?;

    if req.prompt.len() > MAX_PROMPT_BYTES {
        return Err(ServerError::BadRequest(format!(
            "prompt too large ({} bytes); maximum is {} bytes",
            req.prompt.len(),
            MAX_PROMPT_BYTES,
        )));
    }

    debug!(
        prompt_len = req.prompt.len(),
        history = req.messages.len(),
        upstream = state.upstream.name(),
        "invoke request"
    );

    let turns = relay::compose_turns(state.system_prompt(Utc::now()), &req.messages, &req.prompt);
    let fragments = state.upstream.stream_chat(turns).await?;

    info!(upstream = state.upstream.name(), "relaying completion stream");
    let events = relay::sse_events(fragments, state.config.idle_timeout);
    Ok(Sse::new(events).into_response())
}
