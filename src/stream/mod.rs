//! Response pipeline: raw bytes -> accumulator -> provider normalizer ->
//! block scanner. Everything here runs synchronously per network chunk, in
//! arrival order.

pub mod accumulator;
pub mod scanner;

pub use accumulator::ChunkAccumulator;
pub use scanner::{BlockScanner, ScanEvent, ScannerPhase};

use crate::api::Provider;
use crate::types::Normalized;
use std::sync::Arc;

pub struct ResponsePipeline {
    provider: Arc<dyn Provider>,
    accumulator: ChunkAccumulator,
    scanner: BlockScanner,
    normalized_text: String,
    dropped_fragments: usize,
    failure: Option<String>,
}

impl ResponsePipeline {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            accumulator: ChunkAccumulator::new(),
            scanner: BlockScanner::new(),
            normalized_text: String::new(),
            dropped_fragments: 0,
            failure: None,
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<ScanEvent> {
        self.accumulator.add_bytes(bytes);
        self.normalize_available()
    }

    /// Ends the stream. A final envelope missing its trailing delimiter is
    /// still decoded, then the scanner flushes whatever it holds.
    pub fn finish(&mut self) -> Vec<ScanEvent> {
        self.accumulator.flush_pending_bytes();
        self.accumulator.add_chunk("\n\n");
        let mut events = self.normalize_available();
        events.extend(self.scanner.finish());
        events
    }

    /// All normalized model text received so far.
    pub fn normalized_text(&self) -> &str {
        &self.normalized_text
    }

    pub fn into_normalized_text(self) -> String {
        self.normalized_text
    }

    pub fn dropped_fragments(&self) -> usize {
        self.dropped_fragments
    }

    /// Error the vendor reported inside the stream. Once set, further input
    /// is ignored.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn phase(&self) -> ScannerPhase {
        self.scanner.phase()
    }

    fn normalize_available(&mut self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        if self.failure.is_some() {
            return events;
        }

        loop {
            let normalized = self.provider.convert_stream(self.accumulator.buffer());
            let consumed = normalized.consumed_length();
            match normalized {
                Normalized::Incomplete => break,
                Normalized::Parsed(chunk) => {
                    if !chunk.text.is_empty() {
                        self.normalized_text.push_str(&chunk.text);
                        events.extend(self.scanner.push(&chunk.text));
                    }
                }
                Normalized::Malformed { .. } => self.dropped_fragments += 1,
                Normalized::Failed { message, .. } => {
                    self.failure = Some(message);
                    self.accumulator.clear_buffer(consumed);
                    break;
                }
            }
            if consumed == 0 {
                break;
            }
            self.accumulator.clear_buffer(consumed);
        }

        events
    }
}
