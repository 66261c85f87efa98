//! OpenAI-compatible streaming adapter.
//!
//! Groq and Kluster both expose `POST /chat/completions` with
//! `stream: true`, answering with an SSE body of JSON chunks terminated by
//! `data: [DONE]`. Only `choices[0].delta.content` is relayed.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

use crate::{FragmentStream, UpstreamClient, UpstreamError, UpstreamSettings, UpstreamTurn};

const DONE_MARKER: &str = "[DONE]";

/// Longest error body kept from a rejected request.
const MAX_ERROR_BODY: usize = 512;

/// Streaming client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatClient {
    name: String,
    settings: UpstreamSettings,
    http: Client,
}

impl OpenAiCompatClient {
    pub fn new(settings: UpstreamSettings) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .user_agent(concat!("folio-upstream/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(settings.connect_timeout)
            .build()?;

        Ok(Self {
            name: settings.provider.to_string(),
            settings,
            http,
        })
    }

    pub fn settings(&self) -> &UpstreamSettings {
        &self.settings
    }

    fn request_body(&self, turns: &[UpstreamTurn]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model":    self.settings.model,
            "messages": turns,
            "stream":   true,
        });
        if let Some(temperature) = self.settings.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = self.settings.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl UpstreamClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_chat(&self, turns: Vec<UpstreamTurn>) -> Result<FragmentStream, UpstreamError> {
        let url = self.settings.completions_url();
        debug!(
            provider = %self.name,
            model = %self.settings.model,
            turns = turns.len(),
            "opening upstream completion stream"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .header(ACCEPT, "text/event-stream")
            .json(&self.request_body(&turns))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_utf8(&mut body, MAX_ERROR_BODY);
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(fragments(response.bytes_stream()))
    }
}

/// Turn a raw completion body into a fragment stream.
///
/// The stream ends at `[DONE]`, at the end of the body, or right after the
/// first error it yields.
pub fn fragments<S, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<UpstreamError> + 'static,
{
    let state = ReadState {
        body: Box::pin(body),
        decoder: ChunkDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                match item {
                    Decoded::Fragment(text) => return Some((Ok(text), st)),
                    Decoded::Done => {
                        st.finished = true;
                        st.pending.clear();
                        return None;
                    }
                    Decoded::Failed(err) => {
                        st.finished = true;
                        st.pending.clear();
                        return Some((Err(err), st));
                    }
                }
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let decoded = st.decoder.push(&bytes);
                    st.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.finished = true;
                    let decoded = st.decoder.finish();
                    st.pending.extend(decoded);
                }
            }
        }
    }))
}

struct ReadState<S> {
    body: Pin<Box<S>>,
    decoder: ChunkDecoder,
    pending: VecDeque<Decoded>,
    finished: bool,
}

#[derive(Debug)]
enum Decoded {
    Fragment(String),
    Done,
    Failed(UpstreamError),
}

/// Line-oriented SSE reader for provider bodies.
///
/// Only complete lines are decoded, so UTF-8 sequences split across network
/// chunks are reassembled before conversion.
#[derive(Debug, Default)]
struct ChunkDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl ChunkDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            self.handle_line(line.strip_suffix('\r').unwrap_or(&line), &mut out);
        }
        out
    }

    fn finish(&mut self) -> Vec<Decoded> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw);
            self.handle_line(line.strip_suffix('\r').unwrap_or(&line), &mut out);
        }
        self.dispatch(&mut out);
        out
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<Decoded>) {
        if line.is_empty() {
            self.dispatch(out);
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.strip_prefix(' ').unwrap_or(value).to_owned());
        }
        // `event:`, `id:`, `retry:` and `:comment` lines carry nothing we relay.
    }

    fn dispatch(&mut self, out: &mut Vec<Decoded>) {
        if self.data.is_empty() {
            return;
        }
        let data = self.data.join("\n");
        self.data.clear();
        if let Some(decoded) = decode_event(&data) {
            out.push(decoded);
        }
    }
}

fn decode_event(data: &str) -> Option<Decoded> {
    if data.trim() == DONE_MARKER {
        return Some(Decoded::Done);
    }
    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return Some(Decoded::Failed(UpstreamError::Provider(err.message)));
            }
            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
                .map(Decoded::Fragment)
        }
        Err(e) => Some(Decoded::Failed(UpstreamError::MalformedChunk(e.to_string()))),
    }
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
}

fn truncate_utf8(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

// ── Tests ──────────────────────────────────────────────────────────────────────
