use crate::diff_block::{parse_diff_block, DiffBlock, CURRENT_MARKER, FENCE};

const FENCE_CLOSE: &str = "\n```";

/// Output of the block scanner, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Text outside fenced regions. Adjacent segments may be split
    /// differently depending on how input was chunked.
    Plain(String),
    CodeStarted,
    CodeEnded,
    Diff(DiffBlock),
    /// A fenced region that is not a CURRENT/NEW block.
    RawCode(String),
    /// A region that carries the CURRENT header but cannot be used.
    Malformed { raw: String, reason: String },
    /// The stream ended inside a fenced region.
    Unterminated(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerPhase {
    Plain,
    AwaitingBoundary,
    Code,
}

/// Incremental fence scanner.
///
/// Plain text is forwarded as soon as it cannot be the start of a fence;
/// a trailing partial fence (`` ` `` or ``` `` ``` at the start of a line)
/// is held back. Fenced regions are buffered until the closing fence line is
/// confirmed, then parsed as a whole.
#[derive(Debug)]
pub struct BlockScanner {
    plain_buffer: String,
    code_buffer: String,
    is_buffering_code: bool,
    is_awaiting_more_input: bool,
    at_line_start: bool,
    close_search_from: usize,
}

impl Default for BlockScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockScanner {
    pub fn new() -> Self {
        Self {
            plain_buffer: String::new(),
            code_buffer: String::new(),
            is_buffering_code: false,
            is_awaiting_more_input: false,
            at_line_start: true,
            close_search_from: FENCE.len(),
        }
    }

    pub fn phase(&self) -> ScannerPhase {
        if self.is_buffering_code {
            ScannerPhase::Code
        } else if self.is_awaiting_more_input {
            ScannerPhase::AwaitingBoundary
        } else {
            ScannerPhase::Plain
        }
    }

    pub fn push(&mut self, text: &str) -> Vec<ScanEvent> {
        if self.is_buffering_code {
            self.code_buffer.push_str(text);
        } else {
            self.plain_buffer.push_str(text);
        }

        let mut events = Vec::new();
        self.drain(false, &mut events);
        events
    }

    /// Flushes held text at end of stream.
    pub fn finish(&mut self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        self.drain(true, &mut events);

        if self.is_buffering_code {
            let raw = std::mem::take(&mut self.code_buffer);
            events.push(ScanEvent::Unterminated(raw));
        }
        *self = Self::new();
        events
    }

    fn drain(&mut self, end_of_stream: bool, events: &mut Vec<ScanEvent>) {
        loop {
            if self.is_buffering_code {
                match find_fence_close(&self.code_buffer, self.close_search_from, end_of_stream) {
                    CloseSearch::Found(end) => {
                        let rest = self.code_buffer.split_off(end);
                        let region = std::mem::take(&mut self.code_buffer);
                        self.is_buffering_code = false;
                        self.is_awaiting_more_input = false;
                        self.close_search_from = FENCE.len();
                        self.plain_buffer = rest;
                        self.at_line_start = false;

                        events.push(ScanEvent::CodeEnded);
                        events.push(classify_region(region));
                    }
                    CloseSearch::Pending(resume) => {
                        self.close_search_from = resume;
                        self.is_awaiting_more_input = true;
                        return;
                    }
                }
            } else if let Some(open) = find_fence_open(&self.plain_buffer, self.at_line_start) {
                self.code_buffer = self.plain_buffer.split_off(open);
                let before = std::mem::take(&mut self.plain_buffer);
                if !before.is_empty() {
                    events.push(ScanEvent::Plain(before));
                }
                self.is_buffering_code = true;
                self.is_awaiting_more_input = false;
                self.close_search_from = FENCE.len();
                events.push(ScanEvent::CodeStarted);
            } else {
                let emit_until = if end_of_stream {
                    self.plain_buffer.len()
                } else {
                    held_tail_start(&self.plain_buffer, self.at_line_start)
                };
                if emit_until > 0 {
                    let held = self.plain_buffer.split_off(emit_until);
                    let emitted = std::mem::replace(&mut self.plain_buffer, held);
                    self.at_line_start = emitted.ends_with('\n');
                    events.push(ScanEvent::Plain(emitted));
                }
                self.is_awaiting_more_input = !self.plain_buffer.is_empty();
                return;
            }
        }
    }
}

enum CloseSearch {
    Found(usize),
    Pending(usize),
}

/// A fence opens at the start of a line.
fn find_fence_open(buffer: &str, at_line_start: bool) -> Option<usize> {
    buffer.match_indices(FENCE).map(|(index, _)| index).find(|&index| {
        if index == 0 {
            at_line_start
        } else {
            buffer.as_bytes()[index - 1] == b'\n'
        }
    })
}

/// Start of the trailing text that could still grow into a fence.
fn held_tail_start(buffer: &str, at_line_start: bool) -> usize {
    let line_start = match buffer.rfind('\n') {
        Some(index) => index + 1,
        None if at_line_start => 0,
        None => return buffer.len(),
    };
    let tail = &buffer[line_start..];
    if !tail.is_empty() && tail.len() < FENCE.len() && FENCE.starts_with(tail) {
        line_start
    } else {
        buffer.len()
    }
}

/// A fence closes on a line holding only ``` (and optional whitespace).
/// Returns the index just past the closing backticks.
fn find_fence_close(buffer: &str, from: usize, end_of_stream: bool) -> CloseSearch {
    let mut search = floor_char_boundary(buffer, from.max(FENCE.len()).min(buffer.len()));

    while let Some(offset) = buffer[search..].find(FENCE_CLOSE) {
        let candidate = search + offset;
        let after = candidate + FENCE_CLOSE.len();
        let rest = &buffer[after..];
        match rest.find('\n') {
            Some(line_end) if rest[..line_end].trim().is_empty() => {
                return CloseSearch::Found(after);
            }
            Some(_) => {}
            None if rest.trim().is_empty() => {
                if end_of_stream {
                    return CloseSearch::Found(after);
                }
                return CloseSearch::Pending(candidate);
            }
            None => {}
        }
        search = candidate + 1;
    }

    let resume = buffer.len().saturating_sub(FENCE_CLOSE.len() - 1).max(FENCE.len());
    CloseSearch::Pending(floor_char_boundary(buffer, resume.min(buffer.len())))
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn classify_region(region: String) -> ScanEvent {
    match parse_diff_block(&region) {
        Some(block) if block.is_complete() => ScanEvent::Diff(block),
        Some(_) => ScanEvent::Malformed {
            raw: region,
            reason: "CURRENT or NEW section is empty".to_string(),
        },
        None if region.contains(CURRENT_MARKER) => ScanEvent::Malformed {
            raw: region,
            reason: "missing or out-of-order diff delimiter".to_string(),
        },
        None => ScanEvent::RawCode(region),
    }
}
