//! Per-request chat state machine.
//!
//! ```text
//! Idle → Sending → Streaming → Complete
//!                     ↘          Failed
//! ```
//!
//! The conversation is published as immutable snapshots: every change builds
//! a fresh `Arc<[ChatMessage]>`, so a renderer holding an older one never
//! sees it move underneath it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use folio_types::{ChatTurn, InvokeRequest, Role};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Assistant text shown in place of a failed response.
pub const ERROR_TEXT: &str = "An error has occurred";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RequestState {
    Idle,
    Sending,
    Streaming,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("prompt is blank")]
    Blank,
    #[error("a response is still in progress")]
    Busy,
}

/// What to send for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Id of the assistant placeholder this request fills.
    pub request_id: Uuid,
    pub prompt: String,
    /// Prior turns, oldest first. Excludes `prompt` itself.
    pub history: Vec<ChatTurn>,
}

impl PendingRequest {
    pub fn to_invoke(&self) -> InvokeRequest {
        InvokeRequest {
            prompt: self.prompt.clone(),
            messages: self.history.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ChatSession {
    messages: Arc<[ChatMessage]>,
    state: RequestState,
    active: Option<Uuid>,
    failed: HashSet<Uuid>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: Arc::from(Vec::new()),
            state: RequestState::Idle,
            active: None,
            failed: HashSet::new(),
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, RequestState::Sending | RequestState::Streaming)
    }

    pub fn snapshot(&self) -> Arc<[ChatMessage]> {
        Arc::clone(&self.messages)
    }

    /// Start a request for `prompt`.
    ///
    /// Appends the user message and an empty assistant placeholder. A blank
    /// prompt, or a submission while a response is in progress, changes
    /// nothing.
    pub fn submit(&mut self, prompt: &str) -> Result<PendingRequest, SubmitError> {
        if prompt.trim().is_empty() {
            return Err(SubmitError::Blank);
        }
        if self.is_loading() {
            return Err(SubmitError::Busy);
        }

        let history = self.history();
        let user = ChatMessage::new(Role::User, prompt);
        let placeholder = ChatMessage::new(Role::Assistant, "");
        let request_id = placeholder.id;

        self.messages = self.messages.iter().cloned().chain([user, placeholder]).collect();
        self.state = RequestState::Sending;
        self.active = Some(request_id);
        debug!(%request_id, history = history.len(), "request submitted");

        Ok(PendingRequest {
            request_id,
            prompt: prompt.to_owned(),
            history,
        })
    }

    /// The relay has started answering `request_id`: `Sending → Streaming`.
    ///
    /// Returns `false` when `request_id` is not the request in progress.
    pub fn mark_streaming(&mut self, request_id: Uuid) -> bool {
        if !self.is_active(request_id) {
            return false;
        }
        if self.state == RequestState::Sending {
            debug!(%request_id, "response streaming");
            self.state = RequestState::Streaming;
        }
        true
    }

    /// Show `full_text` as the placeholder's content.
    ///
    /// Returns the new snapshot, or `None` when `request_id` is not the
    /// request in progress.
    pub fn apply_update(
        &mut self,
        request_id: Uuid,
        full_text: &str,
    ) -> Option<Arc<[ChatMessage]>> {
        if !self.mark_streaming(request_id) {
            return None;
        }
        Some(self.replace_content(request_id, full_text))
    }

    pub fn complete(&mut self, request_id: Uuid, final_text: &str) -> Option<Arc<[ChatMessage]>> {
        if !self.is_active(request_id) {
            return None;
        }
        self.state = RequestState::Complete;
        self.active = None;
        Some(self.replace_content(request_id, final_text))
    }

    /// End the request in error. The placeholder shows [`ERROR_TEXT`] and is
    /// left out of the history of later requests.
    pub fn fail(&mut self, request_id: Uuid) -> Option<Arc<[ChatMessage]>> {
        if !self.is_active(request_id) {
            return None;
        }
        self.state = RequestState::Failed;
        self.active = None;
        self.failed.insert(request_id);
        Some(self.replace_content(request_id, ERROR_TEXT))
    }

    fn is_active(&self, request_id: Uuid) -> bool {
        self.active == Some(request_id) && self.is_loading()
    }

    fn replace_content(&mut self, id: Uuid, content: &str) -> Arc<[ChatMessage]> {
        self.messages = self
            .messages
            .iter()
            .map(|m| {
                if m.id == id {
                    ChatMessage {
                        content: content.to_owned(),
                        ..m.clone()
                    }
                } else {
                    m.clone()
                }
            })
            .collect();
        self.snapshot()
    }

    fn history(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .filter(|m| !self.failed.contains(&m.id))
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }
}
