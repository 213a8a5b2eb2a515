mod api;

pub use api::{ChatMessage, ChatRequest, Normalized, Role, StreamChunk};
