//! Reading a relay response: SSE events in, accumulated text out.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use folio_types::{ERROR_EVENT, InvokeRequest, SENTINEL, StreamErrorPayload};
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use reqwest::header::ACCEPT;
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::{ChatMessage, ChatSession, SubmitError};
use crate::sse::{SseDecoder, SseEvent};

#[derive(Debug, Error)]
pub enum ConsumeError {
    /// The relay sent an error event.
    #[error("relay error: {0}")]
    Relay(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// The body ended before the sentinel.
    #[error("stream ended before completion")]
    Truncated,

    #[error("relay returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// Read `body` to the sentinel.
///
/// `on_update` receives the full accumulated text after every fragment,
/// never just the new piece. Returns the final text.
pub async fn consume<S, E, F>(body: S, mut on_update: F) -> Result<String, ConsumeError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
    F: FnMut(&str),
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new();
    let mut content = String::new();

    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|e| ConsumeError::Transport(e.to_string()))?;
        for event in decoder.push(&bytes) {
            if absorb(event, &mut content, &mut on_update)? == Step::Done {
                return Ok(content);
            }
        }
    }
    for event in decoder.finish() {
        if absorb(event, &mut content, &mut on_update)? == Step::Done {
            return Ok(content);
        }
    }
    Err(ConsumeError::Truncated)
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
}

fn absorb<F: FnMut(&str)>(
    event: SseEvent,
    content: &mut String,
    on_update: &mut F,
) -> Result<Step, ConsumeError> {
    if event.name() == ERROR_EVENT {
        let message = StreamErrorPayload::parse(&event.data).map_or(event.data, |p| p.error);
        return Err(ConsumeError::Relay(message));
    }
    if let Some(payload) = StreamErrorPayload::parse(&event.data) {
        return Err(ConsumeError::Relay(payload.error));
    }
    if event.data == SENTINEL {
        return Ok(Step::Done);
    }
    content.push_str(&event.data);
    on_update(content);
    Ok(Step::Continue)
}

/// HTTP client for a folio relay.
#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: String,
    http: Client,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConsumeError> {
        let http = Client::builder()
            .user_agent(concat!("folio-client/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConsumeError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    pub fn invoke_url(&self) -> String {
        format!("{}/api/invoke", self.base_url.trim_end_matches('/'))
    }

    /// `POST /api/invoke` and [`consume`] the answer.
    pub async fn invoke<F: FnMut(&str)>(
        &self,
        request: &InvokeRequest,
        on_update: F,
    ) -> Result<String, ConsumeError> {
        let response = self.open(request).await?;
        consume(response.bytes_stream(), on_update).await
    }

    /// `POST /api/invoke` up to the response head. The body is left unread.
    pub async fn open(&self, request: &InvokeRequest) -> Result<Response, ConsumeError> {
        debug!(history = request.messages.len(), "invoking relay");
        let response = self
            .http
            .post(self.invoke_url())
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| ConsumeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConsumeError::Status {
                status: status.as_u16(),
                message: error_message(text),
            });
        }
        Ok(response)
    }
}

/// The `error` field of a JSON error body, or the body itself.
fn error_message(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or(body)
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Consume(#[from] ConsumeError),
}

/// One full exchange: submit `prompt`, stream the answer into `session`,
/// and hand every new snapshot to `render`.
///
/// On failure the session's placeholder already shows the error text when
/// this returns.
pub async fn send<R>(
    client: &RelayClient,
    session: &mut ChatSession,
    prompt: &str,
    mut render: R,
) -> Result<String, SendError>
where
    R: FnMut(&Arc<[ChatMessage]>),
{
    let pending = session.submit(prompt)?;
    let request_id = pending.request_id;
    render(&session.snapshot());

    let result = match client.open(&pending.to_invoke()).await {
        Ok(response) => {
            session.mark_streaming(request_id);
            consume(response.bytes_stream(), |text| {
                if let Some(snapshot) = session.apply_update(request_id, text) {
                    render(&snapshot);
                }
            })
            .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(text) => {
            if let Some(snapshot) = session.complete(request_id, &text) {
                render(&snapshot);
            }
            Ok(text)
        }
        Err(e) => {
            warn!(error = %e, "response failed");
            if let Some(snapshot) = session.fail(request_id) {
                render(&snapshot);
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod test {
    use axum::Router;
    use axum::http::{StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use folio_types::Role;
    use futures::stream;
    use tracing_test::traced_test;

    use super::*;
    use crate::session::{ERROR_TEXT, RequestState};

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + use<> {
        let owned: Vec<_> = parts.iter().map(|p| Ok(Bytes::from(p.to_string()))).collect();
        stream::iter(owned)
    }

    async fn consume_all(parts: &[&str]) -> (Result<String, ConsumeError>, Vec<String>) {
        let mut updates = Vec::new();
        let result = consume(chunks(parts), |text| updates.push(text.to_owned())).await;
        (result, updates)
    }

    #[tokio::test]
    async fn updates_are_prefix_sums() {
        let fragments = ["The", " quick", "", " brown", " fox\njumps", " ✓"];
        let body: String = fragments
            .iter()
            .map(|f| {
                let lines: Vec<_> = f.split('\n').map(|l| format!("data: {l}")).collect();
                format!("{}\n\n", lines.join("\n"))
            })
            .chain(std::iter::once("data: [DONE]\n\n".to_owned()))
            .collect();

        let (result, updates) = consume_all(&[&body[..11], &body[11..40], &body[40..]]).await;

        let mut expected = Vec::new();
        let mut acc = String::new();
        for f in fragments {
            acc.push_str(f);
            expected.push(acc.clone());
        }
        assert_eq!(updates, expected);
        assert_eq!(result.unwrap(), fragments.concat());
    }

    #[tokio::test]
    async fn hello_scenario() {
        let (result, updates) =
            consume_all(&["data: Hi\n\ndata:  there\n\ndata: [DONE]\n\n"]).await;
        assert_eq!(updates, vec!["Hi", "Hi there"]);
        assert_eq!(result.unwrap(), "Hi there");
    }

    #[tokio::test]
    async fn split_control_lookalikes_are_text() {
        let (result, _) = consume_all(&["data: [\n\ndata: DONE]\n\ndata: [DONE]\n\n"]).await;
        assert_eq!(result.unwrap(), "[DONE]");
    }

    #[tokio::test]
    async fn split_error_lookalike_is_text() {
        let body = "data: Example:\n\ndata:  {\n\ndata: \"error\":\"x\"}\n\ndata: [DONE]\n\n";
        let (result, _) = consume_all(&[body]).await;
        assert_eq!(result.unwrap(), r#"Example: {"error":"x"}"#);
    }

    #[tokio::test]
    async fn error_event_fails_the_response() {
        let (result, updates) = consume_all(&[
            "data: partial\n\nevent: error\ndata: {\"error\":\"Streaming error occurred\"}\n\n",
        ])
        .await;
        assert_eq!(updates, vec!["partial"]);
        match result {
            Err(ConsumeError::Relay(message)) => assert_eq!(message, "Streaming error occurred"),
            other => panic!("expected relay error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unnamed_error_payload_also_fails() {
        let (result, _) = consume_all(&["data: {\"error\":\"boom\"}\n\n"]).await;
        assert!(matches!(result, Err(ConsumeError::Relay(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn body_without_sentinel_is_truncated() {
        let (result, updates) = consume_all(&["data: Hi\n\ndata: the"]).await;
        assert_eq!(updates, vec!["Hi", "Hithe"]);
        assert!(matches!(result, Err(ConsumeError::Truncated)));
    }

    #[tokio::test]
    async fn transport_errors_surface() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"data: Hi\n\n")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let result = consume(body, |_| {}).await;
        assert!(
            matches!(result, Err(ConsumeError::Transport(m)) if m.contains("connection reset"))
        );
    }

    // ── Against a live HTTP server ──────────────────────────────────────────

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn relay_answering(body: &'static str) -> Router {
        Router::new().route(
            "/api/invoke",
            post(move || async move { ([(header::CONTENT_TYPE, "text/event-stream")], body) }),
        )
    }

    #[tokio::test]
    async fn relay_client_posts_and_streams() {
        let base = serve(relay_answering("data: Hi\n\ndata:  there\n\ndata: [DONE]\n\n")).await;
        let client = RelayClient::new(base).unwrap();
        assert!(client.invoke_url().ends_with("/api/invoke"));

        let request = InvokeRequest {
            prompt: "Hello".into(),
            messages: vec![],
        };
        let mut updates = Vec::new();
        let text = client.invoke(&request, |t| updates.push(t.to_owned())).await.unwrap();
        assert_eq!(text, "Hi there");
        assert_eq!(updates, vec!["Hi", "Hi there"]);
    }

    #[tokio::test]
    async fn relay_client_reports_json_error_status() {
        let app = Router::new().route(
            "/api/invoke",
            post(|| async {
                let body = serde_json::json!({ "error": "Prompt is required" });
                (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
            }),
        );
        let client = RelayClient::new(serve(app).await).unwrap();
        let request = InvokeRequest {
            prompt: String::new(),
            messages: vec![],
        };
        match client.invoke(&request, |_| {}).await {
            Err(ConsumeError::Status { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Prompt is required");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_drives_the_session_to_completion() {
        let body = "data: Hi\n\ndata:  there\n\ndata: [DONE]\n\n";
        let client = RelayClient::new(serve(relay_answering(body)).await).unwrap();
        let mut session = ChatSession::new();
        let mut rendered = Vec::new();

        let text = send(&client, &mut session, "Hello", |s| rendered.push(s.clone()))
            .await
            .unwrap();

        assert_eq!(text, "Hi there");
        assert_eq!(session.state(), RequestState::Complete);
        assert!(!session.is_loading());
        let last = session.snapshot();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].role, Role::User);
        assert_eq!(last[1].content, "Hi there");

        // submit, two fragments, completion
        assert_eq!(rendered.len(), 4);
        assert_eq!(rendered[0][1].content, "");
        // earlier snapshots are untouched by later updates
        assert_eq!(rendered[1][1].content, "Hi");
        assert_eq!(rendered[2][1].content, "Hi there");
    }

    #[tokio::test]
    #[traced_test]
    async fn send_failure_shows_error_text() {
        let body =
            "data: partial\n\nevent: error\ndata: {\"error\":\"Streaming error occurred\"}\n\n";
        let client = RelayClient::new(serve(relay_answering(body)).await).unwrap();
        let mut session = ChatSession::new();

        let result = send(&client, &mut session, "Hello", |_| {}).await;

        assert!(matches!(result, Err(SendError::Consume(ConsumeError::Relay(_)))));
        assert_eq!(session.state(), RequestState::Failed);
        assert!(!session.is_loading());
        assert_eq!(session.snapshot()[1].content, ERROR_TEXT);
        assert!(logs_contain("response failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn send_enters_streaming_even_for_an_empty_answer() {
        let client = RelayClient::new(serve(relay_answering("data: [DONE]\n\n")).await).unwrap();
        let mut session = ChatSession::new();

        let text = send(&client, &mut session, "Hello", |_| {}).await.unwrap();

        assert_eq!(text, "");
        assert_eq!(session.state(), RequestState::Complete);
        assert!(logs_contain("response streaming"));
    }

    #[tokio::test]
    async fn send_rejects_blank_prompt_without_a_request() {
        // Nothing listens here; a request would fail with a transport error.
        let client = RelayClient::new("http://127.0.0.1:9").unwrap();
        let mut session = ChatSession::new();
        let result = send(&client, &mut session, "   ", |_| {}).await;
        assert!(matches!(result, Err(SendError::Submit(SubmitError::Blank))));
        assert!(session.snapshot().is_empty());
        assert_eq!(session.state(), RequestState::Idle);
    }
}
