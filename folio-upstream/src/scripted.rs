//! Deterministic upstream for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::{FragmentStream, UpstreamClient, UpstreamError, UpstreamTurn};

#[derive(Debug, Clone, Copy)]
enum Ending {
    Normal,
    FailAfter(usize),
    StallAfter(usize),
    Refuse,
}

/// Replays a fixed list of fragments and records every conversation it was
/// asked to complete.
pub struct ScriptedUpstream {
    fragments: Vec<String>,
    ending: Ending,
    received: Mutex<Vec<Vec<UpstreamTurn>>>,
}

impl ScriptedUpstream {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ending: Ending::Normal,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Yield an error after `n` fragments instead of ending normally.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.ending = Ending::FailAfter(n);
        self
    }

    /// Never yield anything after `n` fragments.
    pub fn stalling_after(mut self, n: usize) -> Self {
        self.ending = Ending::StallAfter(n);
        self
    }

    /// Refuse the request before any stream exists.
    pub fn refusing(mut self) -> Self {
        self.ending = Ending::Refuse;
        self
    }

    /// Conversations received so far, oldest first.
    pub fn received(&self) -> Vec<Vec<UpstreamTurn>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, turns: Vec<UpstreamTurn>) -> Result<FragmentStream, UpstreamError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(turns);
        }

        let ok = |f: &String| Ok::<String, UpstreamError>(f.clone());
        match self.ending {
            Ending::Refuse => Err(UpstreamError::Status {
                status: 503,
                body: "scripted refusal".to_owned(),
            }),
            Ending::Normal => {
                let items: Vec<_> = self.fragments.iter().map(ok).collect();
                Ok(stream::iter(items).boxed())
            }
            Ending::FailAfter(n) => {
                let mut items: Vec<_> = self.fragments.iter().take(n).map(ok).collect();
                items.push(Err(UpstreamError::Provider("scripted failure".to_owned())));
                // Fragments past the failure must never be seen.
                items.extend(self.fragments.iter().skip(n).map(ok));
                Ok(stream::iter(items).boxed())
            }
            Ending::StallAfter(n) => {
                let items: Vec<_> = self.fragments.iter().take(n).map(ok).collect();
                Ok(stream::iter(items).chain(stream::pending()).boxed())
            }
        }
    }
}
