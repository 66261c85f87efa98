//! SSE framing shared by the relay and the consumer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Data of the final event of a successful stream.
pub const SENTINEL: &str = "[DONE]";

/// Event name carried by the in-band error event.
pub const ERROR_EVENT: &str = "error";

/// Message sent to the browser when the upstream fails mid-stream.
pub const STREAM_ERROR_MESSAGE: &str = "Streaming error occurred";

/// Data of the in-band error event: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StreamErrorPayload {
    pub error: String,
}

impl StreamErrorPayload {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Serialise to the event's data line.
    pub fn to_data(&self) -> String {
        serde_json::json!({ "error": self.error }).to_string()
    }

    /// Recognise an error payload inside an event's data.
    ///
    /// Returns `None` for anything that is not a JSON object with a string
    /// `error` key, so ordinary text fragments never match.
    pub fn parse(data: &str) -> Option<Self> {
        if !data.trim_start().starts_with('{') {
            return None;
        }
        serde_json::from_str(data).ok()
    }
}

impl Default for StreamErrorPayload {
    fn default() -> Self {
        Self::new(STREAM_ERROR_MESSAGE)
    }
}
