use super::header;
use crate::api::provider::Provider;
use crate::api::stream::normalize_event_envelopes;
use crate::types::{ChatRequest, Normalized, Role};
use anyhow::{anyhow, Result};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};

/// Anthropic Messages API.
pub struct AnthropicProvider {
    api_url: String,
    version: String,
}

impl AnthropicProvider {
    pub fn new(api_url: &str, version: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            version: version.to_string(),
        }
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn endpoint(&self, _stream: bool) -> String {
        self.api_url.clone()
    }

    fn headers(&self, api_key: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let (name, value) = header("content-type", "application/json")?;
        headers.insert(name, value);
        if let Some(api_key) = api_key {
            let (name, value) = header("x-api-key", api_key)?;
            headers.insert(name, value);
        }
        if !self.version.trim().is_empty() {
            let (name, value) = header("anthropic-version", &self.version)?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn payload(&self, request: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
            .collect();

        json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "stream": stream,
            "system": request.system,
            "messages": messages,
        })
    }

    fn extract_response(&self, raw_body: &str) -> Result<String> {
        let value: Value = serde_json::from_str(raw_body)?;
        let blocks = value
            .get("content")
            .and_then(|content| content.as_array())
            .ok_or_else(|| anyhow!("response has no content array"))?;

        Ok(blocks
            .iter()
            .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|block| block.get("text").and_then(|text| text.as_str()))
            .collect())
    }

    fn convert_stream(&self, buffer: &str) -> Normalized {
        normalize_event_envelopes(self.name(), buffer, |envelope| {
            match envelope.get("type").and_then(|t| t.as_str()) {
                Some("content_block_delta") => envelope
                    .get("delta")
                    .filter(|delta| delta.get("type").and_then(|t| t.as_str()) == Some("text_delta"))
                    .and_then(|delta| delta.get("text"))
                    .and_then(|text| text.as_str())
                    .map(ToOwned::to_owned),
                Some("content_block_start") => envelope
                    .get("content_block")
                    .and_then(|block| block.get("text"))
                    .and_then(|text| text.as_str())
                    .filter(|text| !text.is_empty())
                    .map(ToOwned::to_owned),
                _ => None,
            }
        })
    }
}
