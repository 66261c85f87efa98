//! Client side of the folio relay.
//!
//! - [`sse`]: incremental `text/event-stream` decoding.
//! - [`consumer`]: reading a relay response into accumulated text, and the
//!   [`RelayClient`] that issues `POST /api/invoke`.
//! - [`session`]: the per-request chat state machine and its snapshots.
//!
//! [`send`] ties them together for one prompt.

pub mod consumer;
pub mod session;
pub mod sse;

pub use consumer::{ConsumeError, RelayClient, SendError, consume, send};
pub use session::{ChatMessage, ChatSession, ERROR_TEXT, PendingRequest, RequestState, SubmitError};
pub use sse::{SseDecoder, SseEvent};
