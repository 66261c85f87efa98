//! Upstream chat-completion clients.
//!
//! The relay only sees the [`UpstreamClient`] capability: hand it the full
//! list of turns, get back a lazy stream of text fragments. Provider
//! specifics (endpoint, auth, chunk format) live in the adapters.

pub mod error;
pub mod openai;
pub mod provider;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

use std::pin::Pin;

use async_trait::async_trait;
use folio_types::{ChatTurn, Role};
use futures::Stream;
use serde::{Deserialize, Serialize};

pub use error::UpstreamError;
pub use openai::OpenAiCompatClient;
pub use provider::{Provider, UpstreamSettings};
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedUpstream;

/// Ordered text fragments; ends normally or with one error.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

/// Role of a turn as sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl From<Role> for TurnRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => TurnRole::User,
            Role::Assistant => TurnRole::Assistant,
        }
    }
}

/// A message in the provider-facing conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamTurn {
    pub role: TurnRole,
    pub content: String,
}

impl UpstreamTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }
}

impl From<&ChatTurn> for UpstreamTurn {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            role: turn.role.into(),
            content: turn.content.clone(),
        }
    }
}

/// A provider able to stream a chat completion.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Open a streaming completion for `turns`.
    ///
    /// An `Err` here means nothing was streamed (connect failure, rejected
    /// request). Errors after that arrive as the stream's last item.
    async fn stream_chat(&self, turns: Vec<UpstreamTurn>) -> Result<FragmentStream, UpstreamError>;
}
