mod anthropic;
mod gemini;
mod ollama;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use super::provider::Provider;
use crate::config::{Config, ProviderKind};
use anyhow::{Context, Result};
use reqwest::header::{HeaderName, HeaderValue};
use std::sync::Arc;

pub fn provider_for(config: &Config) -> Arc<dyn Provider> {
    match config.provider {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            &config.api_url,
            &config.anthropic_version,
        )),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(&config.api_url)),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(&config.api_url, &config.model)),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(&config.api_url)),
    }
}

fn header(name: &'static str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let value = HeaderValue::from_str(value)
        .with_context(|| format!("invalid value for header '{name}'"))?;
    Ok((HeaderName::from_static(name), value))
}
