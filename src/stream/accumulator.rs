/// Sliding window over the raw response text.
///
/// Every append hands back the whole unconsumed buffer, because a delimiter
/// may straddle two network chunks. Callers drop the prefix they consumed
/// with [`ChunkAccumulator::clear_buffer`].
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    buffer: String,
    pending_bytes: Vec<u8>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunk(&mut self, text: &str) -> &str {
        self.buffer.push_str(text);
        &self.buffer
    }

    /// Appends raw network bytes. A multi-byte character cut at the end of
    /// `bytes` is kept back until the rest of it arrives.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> &str {
        self.pending_bytes.extend_from_slice(bytes);

        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending_bytes.clear();
                    break;
                }
                Err(error) => {
                    let valid = error.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending_bytes[..valid]) {
                        self.buffer.push_str(text);
                    }
                    match error.error_len() {
                        None => {
                            self.pending_bytes.drain(..valid);
                            break;
                        }
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + invalid_len);
                        }
                    }
                }
            }
        }

        &self.buffer
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.pending_bytes.is_empty()
    }

    /// Drops the first `consumed_length` bytes, rounded down to a char boundary.
    pub fn clear_buffer(&mut self, consumed_length: usize) {
        let mut end = consumed_length.min(self.buffer.len());
        while end > 0 && !self.buffer.is_char_boundary(end) {
            end -= 1;
        }
        self.buffer.drain(..end);
    }

    /// Flushes bytes of an incomplete trailing character at end of stream.
    pub fn flush_pending_bytes(&mut self) -> &str {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.buffer.push_str(&tail);
            self.pending_bytes.clear();
        }
        &self.buffer
    }
}
