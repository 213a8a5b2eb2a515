//! Drives one request/response cycle: prompt, stream, scan, then patch.

mod core;
mod prompt;
mod state;


pub use prompt::{incomplete_block_prompt, patch_retry_prompt, SYSTEM_PROMPT};
pub use state::{BusyGuard, Session, SessionUpdate, TurnOutcome};
