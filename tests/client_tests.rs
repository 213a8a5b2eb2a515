use diffcast::api::{ApiClient, ApiError};
use diffcast::config::{ApplyMode, Config, ProviderKind};
use diffcast::stream::ResponsePipeline;
use diffcast::types::ChatMessage;
use futures::StreamExt;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct CannedResponse {
    status: u16,
    content_type: &'static str,
    body: String,
}

/// Serves the canned responses in order, one per connection.
async fn spawn_server(responses: Vec<CannedResponse>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            read_request(&mut socket).await;
            counter.fetch_add(1, Ordering::SeqCst);
            let reply = format!(
                "HTTP/1.1 {} X\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                response.status,
                response.content_type,
                response.body.len(),
                response.body
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{address}/v1"), hits)
}

async fn read_request(socket: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let Ok(read) = socket.read(&mut buf).await else {
            return;
        };
        if read == 0 {
            return;
        }
        data.extend_from_slice(&buf[..read]);
        let text = String::from_utf8_lossy(&data);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                return;
            }
        }
    }
}

fn config(api_url: &str, max_retries: u32) -> Config {
    Config {
        provider: ProviderKind::OpenAi,
        api_key: Some("test-key".to_string()),
        model: "test-model".to_string(),
        api_url: api_url.to_string(),
        anthropic_version: "2023-06-01".to_string(),
        max_tokens: 1024,
        max_retries,
        patch_attempts: 2,
        apply_mode: ApplyMode::DryRun,
        working_dir: PathBuf::from("."),
    }
}

fn sse_body(text: &str) -> String {
    let envelope = serde_json::json!({ "choices": [{ "delta": { "content": text } }] });
    format!("data: {envelope}\n\ndata: [DONE]\n\n")
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let (url, hits) = spawn_server(vec![
        CannedResponse {
            status: 429,
            content_type: "application/json",
            body: "{\"error\":{\"message\":\"slow down\"}}".to_string(),
        },
        CannedResponse {
            status: 200,
            content_type: "text/event-stream",
            body: sse_body("hello"),
        },
    ])
    .await;
    let client = ApiClient::new(&config(&url, 2)).expect("client");
    let request = client.request("sys", &[ChatMessage::user("hi")]);

    let mut stream = client.create_stream(&request).await.expect("stream after retry");
    let mut pipeline = ResponsePipeline::new(client.provider());
    while let Some(chunk) = stream.next().await {
        pipeline.push_bytes(&chunk.expect("chunk"));
    }
    pipeline.finish();

    assert_eq!(pipeline.normalized_text(), "hello");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limit_without_retries_left_fails() {
    let (url, hits) = spawn_server(vec![CannedResponse {
        status: 429,
        content_type: "application/json",
        body: "{}".to_string(),
    }])
    .await;
    let client = ApiClient::new(&config(&url, 0)).expect("client");
    let request = client.request("sys", &[ChatMessage::user("hi")]);

    let error = match client.create_stream(&request).await {
        Ok(_) => panic!("expected rate limit error"),
        Err(error) => error,
    };
    let api_error = error.downcast_ref::<ApiError>().expect("typed api error");
    assert!(matches!(api_error, ApiError::RateLimited { attempts: 1, .. }));
    assert_eq!(api_error.status(), Some(StatusCode::TOO_MANY_REQUESTS));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_auth_failure_carries_status_and_message() {
    let (url, hits) = spawn_server(vec![CannedResponse {
        status: 401,
        content_type: "application/json",
        body: "{\"error\":{\"message\":\"invalid api key\"}}".to_string(),
    }])
    .await;
    let client = ApiClient::new(&config(&url, 3)).expect("client");
    let request = client.request("sys", &[ChatMessage::user("hi")]);

    let error = match client.create_stream(&request).await {
        Ok(_) => panic!("expected auth error"),
        Err(error) => error,
    };
    let api_error = error.downcast_ref::<ApiError>().expect("typed api error");
    assert_eq!(api_error.status(), Some(StatusCode::UNAUTHORIZED));
    assert!(error.to_string().contains("invalid api key"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_complete_extracts_message_text() {
    let (url, _) = spawn_server(vec![CannedResponse {
        status: 200,
        content_type: "application/json",
        body: "{\"choices\":[{\"message\":{\"role\":\"assistant\",\"content\":\"done\"}}]}"
            .to_string(),
    }])
    .await;
    let client = ApiClient::new(&config(&url, 0)).expect("client");
    let request = client.request("sys", &[ChatMessage::user("hi")]);

    assert_eq!(client.complete(&request).await.expect("completion"), "done");
}

#[tokio::test]
async fn test_unparseable_completion_is_invalid_response() {
    let (url, _) = spawn_server(vec![CannedResponse {
        status: 200,
        content_type: "application/json",
        body: "{\"unexpected\":true}".to_string(),
    }])
    .await;
    let client = ApiClient::new(&config(&url, 0)).expect("client");
    let request = client.request("sys", &[]);

    let error = client.complete(&request).await.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<ApiError>(),
        Some(ApiError::InvalidResponse { .. })
    ));
}
