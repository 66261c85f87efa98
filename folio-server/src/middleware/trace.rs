use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::error::ServerError;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Request bodies at most this large are logged verbatim when JSON.
const MAX_LOGGED_BODY: usize = 1024;

/// Largest request body read at all; anything bigger is answered with 413.
pub const MAX_REQUEST_BODY: usize = 2 * 1024 * 1024;

/// Assign a trace id, open a request span, log the request and the status.
///
/// Only the request body is buffered, up to [`MAX_REQUEST_BODY`]. A larger
/// body gets 413 and an unreadable one 400, before any handler runs.
/// Response bodies pass through untouched, which keeps `text/event-stream`
/// responses streaming.
pub async fn trace_middleware(req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    async move {
        info!("→ request started");
        let header_value = HeaderValue::from_str(&trace_id.to_string()).ok();

        let (parts, body) = req.into_parts();
        let buffered = buffer_and_log(&parts.headers, body).await;
        let mut response = match buffered {
            Ok(req_bytes) => {
                let mut req = Request::from_parts(parts, Body::from(req_bytes));
                if let Some(value) = &header_value {
                    req.headers_mut().insert(X_TRACE_ID, value.clone());
                }
                next.run(req).await
            }
            Err(err) => err.into_response(),
        };

        if let Some(value) = header_value {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        let streaming = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            streaming,
            "← response started"
        );

        response
    }
    .instrument(span)
    .await
}

async fn buffer_and_log(headers: &header::HeaderMap, body: Body) -> Result<Bytes, ServerError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let is_json = content_type.contains("application/json");

    let bytes = match Limited::new(body, MAX_REQUEST_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(limit = MAX_REQUEST_BODY, "request body too large");
            return Err(ServerError::PayloadTooLarge(MAX_REQUEST_BODY));
        }
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Err(ServerError::BadRequest("Failed to read request body".to_owned()));
        }
    };

    if is_json && bytes.len() <= MAX_LOGGED_BODY {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            info!("request body: {}", text);
        }
    } else if !bytes.is_empty() {
        info!("request body: [skipped: type={}, size={}]", content_type, bytes.len());
    }

    Ok(bytes)
}
