//! Wire types shared by the folio relay server and its clients.
//!
//! Everything here is plain data: the request body accepted by
//! `POST /api/invoke`, the SSE framing constants, and the JSON bodies the
//! server answers with outside the stream.

pub mod api;
pub mod chat;
pub mod stream;

pub use api::{FailureBody, HealthResponse, NotFoundBody, ValidationErrorBody};
pub use chat::{ChatTurn, InvokeRequest, Role};
pub use stream::{ERROR_EVENT, SENTINEL, STREAM_ERROR_MESSAGE, StreamErrorPayload};
