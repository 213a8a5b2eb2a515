use super::header;
use crate::api::provider::Provider;
use crate::api::stream::normalize_embedded_object;
use crate::types::{ChatRequest, Normalized, Role};
use anyhow::{anyhow, Result};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};

/// Gemini `generateContent`. The streaming variant (without `alt=sse`)
/// delivers one JSON array whose elements arrive incrementally.
pub struct GeminiProvider {
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn endpoint(&self, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        format!("{}/models/{}:{method}", self.base_url, self.model)
    }

    fn headers(&self, api_key: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let (name, value) = header("content-type", "application/json")?;
        headers.insert(name, value);
        if let Some(api_key) = api_key {
            let (name, value) = header("x-goog-api-key", api_key)?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn payload(&self, request: &ChatRequest, _stream: bool) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| {
                let role = if message.role == Role::Assistant {
                    "model"
                } else {
                    "user"
                };
                json!({ "role": role, "parts": [{ "text": message.content }] })
            })
            .collect();

        json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": contents,
            "generationConfig": { "maxOutputTokens": request.max_tokens },
        })
    }

    fn extract_response(&self, raw_body: &str) -> Result<String> {
        let value: Value = serde_json::from_str(raw_body)?;
        candidate_text(&value).ok_or_else(|| anyhow!("response has no candidate text"))
    }

    fn convert_stream(&self, buffer: &str) -> Normalized {
        normalize_embedded_object(self.name(), buffer, candidate_text)
    }
}

fn candidate_text(value: &Value) -> Option<String> {
    let parts = value.pointer("/candidates/0/content/parts")?.as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|text| text.as_str()))
            .collect(),
    )
}
