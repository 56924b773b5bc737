//! History-aware question answering over the loaded corpus.

pub mod ask;
pub mod types;

pub use ask::{validate_request, ChatPipeline};
pub use types::{normalize_reply, HistoryGate, QueryContext};
