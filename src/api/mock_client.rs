use crate::api::client::{ByteStream, MockStreamProducer};
use crate::types::ChatRequest;
use anyhow::Result;
use bytes::Bytes;
use futures::stream;
use std::sync::{Arc, Mutex};

/// Replays canned raw vendor chunks, one response per `create_stream` call.
/// Chunks are delivered exactly as given so tests can split envelopes
/// anywhere.
#[derive(Clone)]
pub struct MockApiClient {
    responses: Arc<Mutex<Vec<Vec<String>>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockApiClient {
    pub fn new(responses: Vec<Vec<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl MockStreamProducer for MockApiClient {
    fn create_mock_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(request.clone());

        let mut responses_guard = self.responses.lock().unwrap();
        if responses_guard.is_empty() {
            return Err(anyhow::anyhow!(
                "MockApiClient: No more responses configured"
            ));
        }
        let raw_chunks = responses_guard.remove(0);

        let byte_chunks: Vec<Result<Bytes>> = raw_chunks
            .into_iter()
            .map(|s| Ok(Bytes::from(s)))
            .collect();

        Ok(Box::pin(stream::iter(byte_chunks)))
    }
}

/// Frames `text` as OpenAI-style `data:` envelopes split into `pieces`
/// deltas, followed by the `[DONE]` marker.
pub fn openai_sse_chunks(text: &str, pieces: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = chars.len().div_ceil(pieces.max(1)).max(1);
    let mut out: Vec<String> = chars
        .chunks(size)
        .map(|piece| {
            let delta: String = piece.iter().collect();
            let envelope = serde_json::json!({
                "choices": [{ "index": 0, "delta": { "content": delta } }]
            });
            format!("data: {envelope}\n\n")
        })
        .collect();
    out.push("data: [DONE]\n\n".to_string());
    out
}
