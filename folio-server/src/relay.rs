//! Upstream-to-browser relay loop.
//!
//! One fragment in, one SSE event out, in receipt order. The loop pulls the
//! next fragment only after the previous event has been handed to the
//! response body, so nothing is buffered or coalesced here.

use std::time::{Duration, Instant};

use axum::response::sse::Event;
use folio_types::{ChatTurn, ERROR_EVENT, SENTINEL, StreamErrorPayload};
use folio_upstream::{FragmentStream, UpstreamError, UpstreamTurn};
use futures::{Stream, StreamExt, stream};
use tracing::{Instrument, Span, info, warn};

/// What the relay emits for one upstream step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Fragment(String),
    /// Upstream ended normally.
    Done,
    /// Upstream failed or stalled; the stream ends here.
    Failed,
}

impl RelayEvent {
    /// SSE events for this step. Usually one; see [`fragment_payloads`].
    pub fn into_sse(self) -> Vec<Event> {
        match self {
            RelayEvent::Fragment(text) => fragment_payloads(&text)
                .into_iter()
                .map(|data| Event::default().data(data))
                .collect(),
            RelayEvent::Done => vec![Event::default().data(SENTINEL)],
            RelayEvent::Failed => vec![
                Event::default()
                    .event(ERROR_EVENT)
                    .data(StreamErrorPayload::default().to_data()),
            ],
        }
    }
}

/// Conversation sent upstream: system instruction, prior turns, then the
/// new prompt as the last user turn.
pub fn compose_turns(
    system_prompt: String,
    history: &[ChatTurn],
    prompt: &str,
) -> Vec<UpstreamTurn> {
    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(UpstreamTurn::system(system_prompt));
    turns.extend(history.iter().map(UpstreamTurn::from));
    turns.push(UpstreamTurn::user(prompt));
    turns
}

/// Data payloads carrying one fragment.
///
/// Carriage returns become `\n` (an SSE data line cannot hold them; the
/// decoder rejoins multi-line data with `\n`). A fragment that would read as
/// the sentinel is split after its first character. One that would read as
/// an error payload is split right after its opening brace, which leaves
/// neither part a JSON object. The browser concatenates the parts back into
/// the same text.
pub fn fragment_payloads(text: &str) -> Vec<String> {
    let text = if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_owned()
    };

    let split_at = if text == SENTINEL {
        text.chars().next().map(char::len_utf8)
    } else if StreamErrorPayload::parse(&text).is_some() {
        text.find('{').map(|brace| brace + 1)
    } else {
        None
    };

    match split_at {
        Some(at) => vec![text[..at].to_owned(), text[at..].to_owned()],
        None => vec![text],
    }
}

struct RelayState {
    fragments: FragmentStream,
    idle_timeout: Duration,
    relayed: usize,
    bytes: usize,
    started: Instant,
}

/// Drive `fragments` to completion as relay events.
///
/// Ends with exactly one of [`RelayEvent::Done`] or [`RelayEvent::Failed`].
/// Each wait for the next fragment is bounded by `idle_timeout`. Dropping the
/// returned stream drops the upstream stream with it. Every step runs in the
/// span that was current when the relay was created.
pub fn relay_events(
    fragments: FragmentStream,
    idle_timeout: Duration,
) -> impl Stream<Item = RelayEvent> + Send {
    let state = RelayState {
        fragments,
        idle_timeout,
        relayed: 0,
        bytes: 0,
        started: Instant::now(),
    };
    let span = Span::current();

    stream::unfold(Some(state), move |state| step(state).instrument(span.clone()))
}

async fn step(state: Option<RelayState>) -> Option<(RelayEvent, Option<RelayState>)> {
    let mut st = state?;
    match tokio::time::timeout(st.idle_timeout, st.fragments.next()).await {
        Ok(Some(Ok(text))) => {
            st.relayed += 1;
            st.bytes += text.len();
            Some((RelayEvent::Fragment(text), Some(st)))
        }
        Ok(None) => {
            info!(
                fragments = st.relayed,
                bytes = st.bytes,
                elapsed_ms = st.started.elapsed().as_millis(),
                "upstream stream complete"
            );
            Some((RelayEvent::Done, None))
        }
        Ok(Some(Err(e))) => {
            warn!(error = %e, fragments = st.relayed, "upstream failed mid-stream");
            Some((RelayEvent::Failed, None))
        }
        Err(_) => {
            let err = UpstreamError::Timeout(st.idle_timeout);
            warn!(error = %err, fragments = st.relayed, "upstream stalled");
            Some((RelayEvent::Failed, None))
        }
    }
}

/// [`relay_events`] framed as SSE, ready for `axum::response::Sse`.
pub fn sse_events(
    fragments: FragmentStream,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> + Send {
    relay_events(fragments, idle_timeout)
        .flat_map(|event| stream::iter(event.into_sse()))
        .map(Ok)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll};

    use folio_upstream::{ScriptedUpstream, TurnRole, UpstreamClient};
    use tracing_test::traced_test;

    use super::*;

    /// Upstream stream that flags when it is dropped.
    struct DropWatched {
        inner: FragmentStream,
        dropped: Arc<AtomicBool>,
    }

    impl Stream for DropWatched {
        type Item = Result<String, UpstreamError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.as_mut().poll_next(cx)
        }
    }

    impl Drop for DropWatched {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    async fn run(upstream: ScriptedUpstream, idle: Duration) -> Vec<RelayEvent> {
        let fragments = upstream.stream_chat(vec![UpstreamTurn::user("x")]).await.unwrap();
        relay_events(fragments, idle).collect().await
    }

    fn frag(s: &str) -> RelayEvent {
        RelayEvent::Fragment(s.to_owned())
    }

    #[test]
    fn compose_puts_system_first_and_prompt_last() {
        let history = vec![ChatTurn::user("Hi"), ChatTurn::assistant("Hello!")];
        let turns = compose_turns("sys".into(), &history, "What next?");
        let roles: Vec<_> = turns.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![TurnRole::System, TurnRole::User, TurnRole::Assistant, TurnRole::User]
        );
        assert_eq!(turns[0].content, "sys");
        assert_eq!(turns[3].content, "What next?");
    }

    #[tokio::test]
    async fn fragments_relay_in_order_then_done() {
        let events = run(ScriptedUpstream::new(["Hi", " there"]), Duration::from_secs(1)).await;
        assert_eq!(events, vec![frag("Hi"), frag(" there"), RelayEvent::Done]);
    }

    #[tokio::test]
    async fn empty_upstream_is_just_done() {
        let events = run(ScriptedUpstream::new(Vec::<String>::new()), Duration::from_secs(1)).await;
        assert_eq!(events, vec![RelayEvent::Done]);
    }

    #[tokio::test]
    #[traced_test]
    async fn mid_stream_error_ends_without_done() {
        let upstream = ScriptedUpstream::new(["a", "b", "c"]).failing_after(1);
        let events = run(upstream, Duration::from_secs(1)).await;
        assert_eq!(events, vec![frag("a"), RelayEvent::Failed]);
        assert!(logs_contain("upstream failed mid-stream"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn stalled_upstream_times_out() {
        let upstream = ScriptedUpstream::new(["a", "b"]).stalling_after(1);
        let events = run(upstream, Duration::from_secs(30)).await;
        assert_eq!(events, vec![frag("a"), RelayEvent::Failed]);
        assert!(logs_contain("upstream stalled"));
    }

    #[tokio::test]
    async fn dropping_the_response_drops_the_upstream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let fragments: FragmentStream = Box::pin(DropWatched {
            inner: stream::iter(vec![Ok("a".to_owned())]).chain(stream::pending()).boxed(),
            dropped: dropped.clone(),
        });

        let mut events = Box::pin(sse_events(fragments, Duration::from_secs(30)));
        assert!(events.next().await.is_some());
        assert!(!dropped.load(Ordering::SeqCst));

        drop(events);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn payloads_normalise_carriage_returns() {
        assert_eq!(fragment_payloads("a\r\nb\rc"), vec!["a\nb\nc"]);
        assert_eq!(fragment_payloads(" there"), vec![" there"]);
        assert_eq!(fragment_payloads(""), vec![""]);
    }

    #[test]
    fn payloads_never_look_like_control_events() {
        assert_eq!(fragment_payloads("[DONE]"), vec!["[", "DONE]"]);
        for error_like in [
            r#"{"error":"nope"}"#,
            r#" {"error":"x"}"#,
            "\n\t{\"error\": \"x\"}",
            "{ \"error\" : \"x\" }",
        ] {
            let parts = fragment_payloads(error_like);
            assert_eq!(parts.len(), 2, "{error_like:?}");
            assert_eq!(parts.concat(), error_like);
            assert!(
                parts.iter().all(|p| StreamErrorPayload::parse(p).is_none() && p != SENTINEL),
                "{parts:?}"
            );
        }
    }
}
