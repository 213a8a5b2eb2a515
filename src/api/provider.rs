use crate::types::{ChatRequest, Normalized};
use anyhow::Result;
use reqwest::header::HeaderMap;
use serde_json::Value;

/// Vendor adapter. The client and the response pipeline only ever talk to a
/// provider through this trait.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn endpoint(&self, stream: bool) -> String;

    fn headers(&self, api_key: Option<&str>) -> Result<HeaderMap>;

    fn payload(&self, request: &ChatRequest, stream: bool) -> Value;

    /// Extracts the assistant text from a complete, non-streamed response body.
    fn extract_response(&self, raw_body: &str) -> Result<String>;

    /// Normalizes the front of the accumulated stream buffer.
    fn convert_stream(&self, buffer: &str) -> Normalized;
}
