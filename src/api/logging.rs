use crate::util::{excerpt, parse_bool_str};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};
use std::time::Duration;

const DEFAULT_LOG_PATH: &str = "/tmp/diffcast-debug.log";
const DEBUG_PAYLOAD_ENV: &str = "DIFFCAST_DEBUG_PAYLOAD";
const LOG_PATH_ENV: &str = "DIFFCAST_LOG_PATH";
const MAX_FRAGMENT_CHARS: usize = 400;

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(|v| parse_bool_str(&v))
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message = format!(
        "DIFFCAST DEBUG payload_request url={request_url}\npayload:\n{formatted_payload}\n"
    );
    emit_log_message(&message);
}

pub fn emit_stream_parse_error(provider: &str, fragment: &str, parse_error: &serde_json::Error) {
    let message = format!(
        "DIFFCAST ERROR stream_parse_failed provider={provider} error={parse_error}\nfragment:\n{}\n",
        excerpt(fragment, MAX_FRAGMENT_CHARS)
    );
    emit_log_message(&message);
}

pub fn emit_stream_error_event(provider: &str, detail: &str) {
    let message = format!("DIFFCAST ERROR stream_error_event provider={provider}\n{detail}\n");
    emit_log_message(&message);
}

pub fn emit_rate_limit_retry(request_url: &str, attempt: u32, delay: Duration) {
    let message = format!(
        "DIFFCAST WARN rate_limited url={request_url} attempt={attempt} retry_in_ms={}\n",
        delay.as_millis()
    );
    emit_log_message(&message);
}

pub fn emit_warning(event: &str, detail: &str) {
    let message = format!("DIFFCAST WARN {event}\n{detail}\n");
    emit_log_message(&message);
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprintln!("{message}");
}

fn resolve_log_path() -> Option<String> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}
