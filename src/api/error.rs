use reqwest::StatusCode;
use thiserror::Error;

/// Network-layer failures. Everything above the client sees these through
/// `anyhow` and can downcast to recover the HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API endpoint '{url}' returned HTTP {status}: {message}")]
    Status {
        url: String,
        status: StatusCode,
        message: String,
    },
    #[error("API endpoint '{url}' is still rate limited after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },
    #[error("cannot reach API endpoint '{url}': {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("API request to '{url}' failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response body from '{url}': {message}")]
    InvalidResponse { url: String, message: String },
    #[error("API endpoint '{url}' reported an error mid-stream: {message}")]
    StreamFailed { url: String, message: String },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::Request { source, .. } | ApiError::Connect { source, .. } => source.status(),
            ApiError::InvalidResponse { .. } | ApiError::StreamFailed { .. } => None,
        }
    }

    pub(crate) fn from_reqwest(error: reqwest::Error, url: &str) -> Self {
        if error.is_connect() {
            ApiError::Connect {
                url: url.to_string(),
                source: error,
            }
        } else {
            ApiError::Request {
                url: url.to_string(),
                source: error,
            }
        }
    }
}

/// Pulls a human-readable message out of an error response body, falling back
/// to the raw body or the status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            let error = value.get("error")?;
            error
                .get("message")
                .and_then(|message| message.as_str())
                .or_else(|| error.as_str())
                .map(ToOwned::to_owned)
        });

    match from_json {
        Some(message) if !message.trim().is_empty() => message,
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}
