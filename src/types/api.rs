use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of the conversation history. Entries are appended, never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Vendor-neutral request handed to a provider adapter for encoding.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

/// Normalized model output extracted from the accumulated stream buffer.
///
/// `consumed_length` is the number of bytes at the front of the buffer that
/// produced `text`; the caller drops them before normalizing again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub text: String,
    pub consumed_length: usize,
}

/// Outcome of one normalization attempt over the accumulated buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// No complete structured piece yet; wait for more bytes.
    Incomplete,
    /// A complete piece was decoded. `text` may be empty for envelopes that
    /// carry no output (pings, stop events).
    Parsed(StreamChunk),
    /// Complete pieces were found but none could be decoded; drop them.
    Malformed { consumed_length: usize },
    /// The vendor sent an error object in place of output. The stream is
    /// over; nothing after it is read.
    Failed {
        message: String,
        consumed_length: usize,
    },
}

impl Normalized {
    pub fn consumed_length(&self) -> usize {
        match self {
            Normalized::Incomplete => 0,
            Normalized::Parsed(chunk) => chunk.consumed_length,
            Normalized::Malformed { consumed_length }
            | Normalized::Failed {
                consumed_length, ..
            } => *consumed_length,
        }
    }
}
