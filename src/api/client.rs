use super::error::{parse_error_message, ApiError};
use super::logging::{debug_payload_enabled, emit_debug_payload, emit_rate_limit_retry};
use super::provider::Provider;
use super::providers::provider_for;
use super::retry::{is_retryable_status, retry_delay};
use crate::config::Config;
use crate::types::{ChatMessage, ChatRequest};
use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    provider: Arc<dyn Provider>,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    max_retries: u32,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            provider: provider_for(config),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            #[cfg(test)]
            mock_stream_producer: None,
        })
    }

    #[cfg(test)]
    pub fn new_mock(
        mock_producer: Arc<dyn MockStreamProducer>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider,
            api_key: None,
            model: "mock-model".to_string(),
            max_tokens: 1024,
            max_retries: 0,
            mock_stream_producer: Some(mock_producer),
        }
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.provider)
    }

    pub fn request(&self, system: &str, messages: &[ChatMessage]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.to_string(),
            messages: messages.to_vec(),
        }
    }

    /// Opens a streaming request. Dropping the returned stream closes the
    /// connection.
    pub async fn create_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(request);
            }
        }

        let response = self.send_with_retry(request, true).await?;
        let request_url = response.url().to_string();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| anyhow::Error::from(ApiError::from_reqwest(error, &request_url)))
        });
        Ok(Box::pin(stream))
    }

    /// Non-streaming request; the body is decoded by the provider adapter.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let response = self.send_with_retry(request, false).await?;
        let request_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|error| ApiError::from_reqwest(error, &request_url))?;
        self.provider.extract_response(&body).map_err(|error| {
            ApiError::InvalidResponse {
                url: request_url,
                message: error.to_string(),
            }
            .into()
        })
    }

    async fn send_with_retry(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response> {
        let request_url = self.provider.endpoint(stream);
        let payload = self.provider.payload(request, stream);
        let headers = self.provider.headers(self.api_key.as_deref())?;

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, &payload);
        }

        let mut attempt = 0u32;
        loop {
            let response = self
                .http
                .post(&request_url)
                .headers(headers.clone())
                .json(&payload)
                .send()
                .await
                .map_err(|error| ApiError::from_reqwest(error, &request_url))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if is_retryable_status(status) {
                if attempt < self.max_retries {
                    let delay = retry_delay(attempt);
                    emit_rate_limit_retry(&request_url, attempt + 1, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(ApiError::RateLimited {
                    url: request_url,
                    attempts: attempt + 1,
                }
                .into());
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                url: request_url,
                status,
                message: parse_error_message(status, &body),
            }
            .into());
        }
    }
}
