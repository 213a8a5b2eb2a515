//! Vendor stream normalization.
//!
//! Providers stream their output in one of two wire shapes. Both policies
//! work on the accumulated buffer and report how many bytes they consumed so
//! the caller can slide the window and call again.

use super::logging::{emit_stream_error_event, emit_stream_parse_error};
use crate::types::{Normalized, StreamChunk};
use serde_json::Value;

/// Event-delimited envelopes (`event: ...\ndata: {...}\n\n`).
///
/// Every complete piece (terminated by a blank line) is scanned for its
/// outermost `{...}` span. Pieces without JSON (`data: [DONE]`, keep-alive
/// comments) and pieces that fail to parse act as inert placeholders. The
/// text extracted from all complete pieces is concatenated. An error
/// envelope ends the scan: text decoded before it is returned first, and the
/// next call reports `Failed`.
pub fn normalize_event_envelopes<F>(provider: &str, buffer: &str, extract: F) -> Normalized
where
    F: Fn(&Value) -> Option<String>,
{
    let mut consumed = 0usize;
    let mut pieces = 0usize;
    let mut failed = 0usize;
    let mut text = String::new();

    while let Some((start, delimiter_len)) = next_event_boundary(&buffer[consumed..]) {
        let piece_start = consumed;
        let piece = &buffer[consumed..consumed + start];
        consumed += start + delimiter_len;
        pieces += 1;

        match parse_envelope(piece) {
            Envelope::Placeholder => {}
            Envelope::Invalid(error, fragment) => {
                failed += 1;
                emit_stream_parse_error(provider, fragment, &error);
            }
            Envelope::Value(value) => {
                if let Some(message) = vendor_error(&value) {
                    if !text.is_empty() {
                        return Normalized::Parsed(StreamChunk {
                            text,
                            consumed_length: piece_start,
                        });
                    }
                    emit_stream_error_event(provider, &message);
                    return Normalized::Failed {
                        message,
                        consumed_length: consumed,
                    };
                }
                if let Some(delta) = extract(&value) {
                    text.push_str(&delta);
                }
            }
        }
    }

    if pieces == 0 {
        Normalized::Incomplete
    } else if text.is_empty() && failed > 0 {
        Normalized::Malformed {
            consumed_length: consumed,
        }
    } else {
        Normalized::Parsed(StreamChunk {
            text,
            consumed_length: consumed,
        })
    }
}

/// A single JSON object embedded at an unknown offset (JSON arrays streamed
/// element by element, NDJSON).
///
/// Scans forward from each `{` until a complete object decodes. An object
/// that is still being received stops the scan and reports `Incomplete`; a
/// `{` that cannot start a valid object is skipped. An object carrying an
/// `error` field reports `Failed`.
pub fn normalize_embedded_object<F>(provider: &str, buffer: &str, extract: F) -> Normalized
where
    F: Fn(&Value) -> Option<String>,
{
    let mut search_from = 0usize;

    while let Some(offset) = buffer[search_from..].find('{') {
        let start = search_from + offset;
        let mut values = serde_json::Deserializer::from_str(&buffer[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                let end = start + values.byte_offset();
                if let Some(message) = vendor_error(&value) {
                    emit_stream_error_event(provider, &message);
                    return Normalized::Failed {
                        message,
                        consumed_length: end,
                    };
                }
                return Normalized::Parsed(StreamChunk {
                    text: extract(&value).unwrap_or_default(),
                    consumed_length: end,
                });
            }
            Some(Err(error)) if error.is_eof() => return Normalized::Incomplete,
            Some(Err(_)) => search_from = start + 1,
            None => return Normalized::Incomplete,
        }
    }

    Normalized::Incomplete
}

/// Error object sent in place of output once the response has started,
/// either `{"error": {"type": .., "message": ..}}` or `{"error": ".."}`.
fn vendor_error(value: &Value) -> Option<String> {
    let error = value.get("error").filter(|error| !error.is_null())?;
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.trim().is_empty());
    let kind = error.get("type").and_then(Value::as_str);
    Some(match (kind, message) {
        (Some(kind), Some(message)) => format!("{kind}: {message}"),
        (None, Some(message)) => message.to_string(),
        _ => error.to_string(),
    })
}

enum Envelope<'a> {
    Placeholder,
    Invalid(serde_json::Error, &'a str),
    Value(Value),
}

fn parse_envelope(piece: &str) -> Envelope<'_> {
    let (Some(open), Some(close)) = (piece.find('{'), piece.rfind('}')) else {
        return Envelope::Placeholder;
    };
    if close < open {
        return Envelope::Placeholder;
    }

    let fragment = &piece[open..=close];
    match serde_json::from_str::<Value>(fragment) {
        Ok(value) => Envelope::Value(value),
        Err(error) => Envelope::Invalid(error, fragment),
    }
}

fn next_event_boundary(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|index| (index, 2));
    let crlf = buffer.find("\r\n\r\n").map(|index| (index, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if b.0 <= a.0 { b } else { a }),
        (a, b) => a.or(b),
    }
}
