use super::header;
use crate::api::provider::Provider;
use crate::api::stream::normalize_event_envelopes;
use crate::types::{ChatRequest, Normalized, Role};
use anyhow::{anyhow, Result};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};

/// OpenAI-compatible chat completions (also served by most local gateways).
pub struct OpenAiProvider {
    api_url: String,
}

impl OpenAiProvider {
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: adapt_to_chat_completions_url(api_url),
        }
    }
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn endpoint(&self, _stream: bool) -> String {
        self.api_url.clone()
    }

    fn headers(&self, api_key: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let (name, value) = header("content-type", "application/json")?;
        headers.insert(name, value);
        if let Some(api_key) = api_key {
            let (name, value) = header("authorization", &format!("Bearer {api_key}"))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn payload(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(json!({ "role": "system", "content": request.system }));
        messages.extend(
            request
                .messages
                .iter()
                .filter(|message| message.role != Role::System)
                .map(|message| json!({ "role": message.role.as_str(), "content": message.content })),
        );

        json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "stream": stream,
            "messages": messages,
        })
    }

    fn extract_response(&self, raw_body: &str) -> Result<String> {
        let value: Value = serde_json::from_str(raw_body)?;
        value
            .pointer("/choices/0/message/content")
            .and_then(|content| content.as_str())
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow!("response has no choices[0].message.content"))
    }

    fn convert_stream(&self, buffer: &str) -> Normalized {
        normalize_event_envelopes(self.name(), buffer, |envelope| {
            envelope
                .pointer("/choices/0/delta/content")
                .and_then(|content| content.as_str())
                .map(ToOwned::to_owned)
        })
    }
}

fn adapt_to_chat_completions_url(api_url: &str) -> String {
    let normalized = api_url.trim().trim_end_matches('/');
    if normalized.ends_with("/chat/completions") {
        return normalized.to_string();
    }
    if let Some(prefix) = normalized.strip_suffix("/messages") {
        return format!("{prefix}/chat/completions");
    }
    if normalized.ends_with("/v1") {
        return format!("{normalized}/chat/completions");
    }
    normalized.to_string()
}
