use super::header;
use crate::api::provider::Provider;
use crate::api::stream::normalize_embedded_object;
use crate::types::{ChatRequest, Normalized, Role};
use anyhow::{anyhow, Result};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};

/// Ollama `/api/chat`, streamed as newline-delimited JSON objects.
pub struct OllamaProvider {
    api_url: String,
}

impl OllamaProvider {
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.trim().to_string(),
        }
    }
}

impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
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
            "stream": stream,
            "messages": messages,
            "options": { "num_predict": request.max_tokens },
        })
    }

    fn extract_response(&self, raw_body: &str) -> Result<String> {
        let value: Value = serde_json::from_str(raw_body)?;
        message_content(&value).ok_or_else(|| anyhow!("response has no message.content"))
    }

    fn convert_stream(&self, buffer: &str) -> Normalized {
        normalize_embedded_object(self.name(), buffer, message_content)
    }
}

fn message_content(value: &Value) -> Option<String> {
    value
        .pointer("/message/content")
        .and_then(|content| content.as_str())
        .map(ToOwned::to_owned)
}
