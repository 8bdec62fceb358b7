//! HTTP Backend Integration Tests
//!
//! Drives [`HttpApi`] against an in-process HTTP/1.1 server that answers each
//! connection with one scripted response. Streamed replies are written with
//! chunked transfer encoding, one HTTP chunk per scripted piece, so multi-byte
//! characters and `data:` lines can be split across network reads.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use parley_core::api::{ChatApi, HttpApi, TranscriberProbe};
use parley_core::app::{ChatApp, SubmitOutcome, CHAT_FAILURE};
use parley_core::config::{ChatEndpoint, ClientConfig};
use parley_core::recording::{AudioPayload, MemoryAudioSource};
use parley_core::{ClientError, Sender, SessionId};

// =============================================================================
// Test Server
// =============================================================================

/// One scripted response
struct Reply {
    status: u16,
    content_type: &'static str,
    chunks: Vec<Vec<u8>>,
    pace: Option<Duration>,
}

impl Reply {
    fn json(value: Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            chunks: vec![value.to_string().into_bytes()],
            pace: None,
        }
    }

    fn stream(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            chunks,
            pace: None,
        }
    }

    /// Stream with a pause before every chunk
    fn paced(chunks: Vec<Vec<u8>>, pace: Duration) -> Self {
        Self {
            pace: Some(pace),
            ..Self::stream(chunks)
        }
    }

    fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            chunks: vec![body.as_bytes().to_vec()],
            pace: None,
        }
    }
}

/// What the server received
#[derive(Debug)]
struct Captured {
    request_line: String,
    headers: String,
    body: Vec<u8>,
}

impl Captured {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_request(stream: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "connection closed before headers");
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers = head.to_lowercase();

    let content_length = headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok());
    let chunked = headers.contains("transfer-encoding: chunked");

    let mut body = buf[header_end..].to_vec();
    loop {
        let done = match content_length {
            Some(len) => body.len() >= len,
            None if chunked => body.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if done {
            break;
        }
        let n = stream.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }

    Captured {
        request_line,
        headers,
        body,
    }
}

async fn write_reply(stream: &mut TcpStream, reply: Reply) {
    let head = format!(
        "HTTP/1.1 {} X\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        reply.status, reply.content_type
    );
    stream.write_all(head.as_bytes()).await.unwrap();
    for chunk in reply.chunks {
        if chunk.is_empty() {
            continue;
        }
        if let Some(pace) = reply.pace {
            tokio::time::sleep(pace).await;
        }
        stream
            .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
            .await
            .unwrap();
        stream.write_all(&chunk).await.unwrap();
        stream.write_all(b"\r\n").await.unwrap();
        stream.flush().await.unwrap();
        tokio::task::yield_now().await;
    }
    stream.write_all(b"0\r\n\r\n").await.unwrap();
    stream.flush().await.unwrap();
}

/// Serve `replies` in order, one per connection. Returns the base URL and
/// the captured requests.
async fn serve(replies: Vec<Reply>) -> (String, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for reply in replies {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let captured = read_request(&mut stream).await;
            let _ = tx.send(captured);
            write_reply(&mut stream, reply).await;
        }
    });

    (url, rx)
}

fn config_for(url: &str, endpoint: ChatEndpoint) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.base_url = url.to_string();
    config.ollama_url = url.to_string();
    config.endpoint = endpoint;
    config
}

fn app_for(config: &ClientConfig) -> ChatApp {
    let api = Arc::new(HttpApi::from_config(config).unwrap());
    let (tx, _rx) = mpsc::unbounded_channel();
    ChatApp::from_config(api, Arc::new(MemoryAudioSource::default()), config, tx)
}

// =============================================================================
// Chat Streaming
// =============================================================================

#[tokio::test]
async fn test_single_endpoint_streams_split_utf8() {
    let mut split = b"data: {\"type\":\"content\",\"content\":\"Caf".to_vec();
    split.push(0xC3);
    let (url, mut requests) = serve(vec![Reply::stream(vec![
        b"data: {\"type\":\"session_info\",\"session_id\":5}\n\n".to_vec(),
        split,
        b"\xA9\"}\n\nda".to_vec(),
        b"ta: {\"type\":\"content\",\"content\":\" ok\"}\n\n".to_vec(),
        b"data: {\"type\":\"complete\",\"full_response\":\"Caf\xC3\xA9 ok\"}\n\n".to_vec(),
    ])])
    .await;

    let app = app_for(&config_for(&url, ChatEndpoint::Single));
    let outcome = app.submit("Hello").await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Replied(_)));

    let messages = app.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].content, "Café ok");
    assert!(!messages[2].streaming);
    assert_eq!(app.session_id(), Some(SessionId::from(5)));

    let request = requests.recv().await.unwrap();
    assert_eq!(request.request_line, "POST /api/chat/single HTTP/1.1");
    assert_eq!(
        request.json(),
        json!({"message": "Hello", "model": "llama3.2", "provider": "ollama", "session_id": null})
    );
}

#[tokio::test]
async fn test_string_session_id_sent_back_as_issued() {
    let (url, mut requests) = serve(vec![
        Reply::stream(vec![
            b"data: {\"type\":\"session_info\",\"session_id\":\"007\"}\n\n".to_vec(),
            b"data: {\"type\":\"content\",\"content\":\"one\"}\n\n".to_vec(),
        ]),
        Reply::stream(vec![b"data: {\"type\":\"content\",\"content\":\"two\"}\n\n".to_vec()]),
    ])
    .await;

    let app = app_for(&config_for(&url, ChatEndpoint::Single));
    app.submit("first").await.unwrap();
    app.submit("second").await.unwrap();

    let first = requests.recv().await.unwrap();
    assert_eq!(first.json()["session_id"], Value::Null);
    let second = requests.recv().await.unwrap();
    assert_eq!(second.json()["session_id"], json!("007"));
}

#[tokio::test]
async fn test_long_stream_outlives_request_timeout() {
    let chunks = (0..6)
        .map(|i| format!("data: t{i}\n\n").into_bytes())
        .collect();
    let (url, _requests) = serve(vec![Reply::paced(chunks, Duration::from_millis(300))]).await;

    let mut config = config_for(&url, ChatEndpoint::Simple);
    config.request_timeout = Some(Duration::from_secs(1));
    let app = app_for(&config);

    let outcome = app.submit("Hello").await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Replied(_)));
    let contents: Vec<String> = app.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[2], "t0t1t2t3t4t5");
}

#[tokio::test]
async fn test_simple_endpoint_streams_raw_text() {
    let (url, mut requests) = serve(vec![Reply::stream(vec![
        b"data: Hi\n\n".to_vec(),
        b"data:  there\n".to_vec(),
        b"\ndata: !\n\n".to_vec(),
    ])])
    .await;

    let app = app_for(&config_for(&url, ChatEndpoint::Simple));
    app.submit("  Hello  ").await.unwrap();

    assert_eq!(app.messages()[2].content, "Hi there!");
    let request = requests.recv().await.unwrap();
    assert_eq!(request.request_line, "POST /api/chat HTTP/1.1");
    assert_eq!(request.json(), json!({"message": "Hello"}));
}

#[tokio::test]
async fn test_server_error_status_adds_fallback() {
    let (url, _requests) = serve(vec![Reply::status(500, "boom")]).await;

    let app = app_for(&config_for(&url, ChatEndpoint::Single));
    let outcome = app.submit("Hello").await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Failed(_)));

    let messages = app.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].sender, Sender::Assistant);
    assert_eq!(messages[2].content, CHAT_FAILURE);
}

#[tokio::test]
async fn test_open_stream_rejects_error_status() {
    let (url, _requests) = serve(vec![Reply::status(503, "unavailable")]).await;
    let api = HttpApi::from_config(&config_for(&url, ChatEndpoint::Single)).unwrap();

    let result = api
        .open_chat_stream(&parley_core::ChatRequest::new("x"))
        .await;
    match result {
        Err(ClientError::Network(message)) => assert!(message.contains("503")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected a network failure"),
    }
}

// =============================================================================
// Other Endpoints
// =============================================================================

#[tokio::test]
async fn test_service_status() {
    let (url, mut requests) = serve(vec![Reply::json(
        json!({"services": {"ollama": true, "whisper": false}}),
    )])
    .await;
    let api = HttpApi::from_config(&config_for(&url, ChatEndpoint::Single)).unwrap();

    let status = api.service_status().await.unwrap();
    assert!(status.is_online("ollama"));
    assert_eq!(status.get("whisper"), Some(false));
    assert_eq!(status.len(), 2);

    let request = requests.recv().await.unwrap();
    assert_eq!(request.request_line, "GET /api/services/status HTTP/1.1");
}

#[tokio::test]
async fn test_transcribe_uploads_multipart_audio() {
    let (url, mut requests) =
        serve(vec![Reply::json(json!({"transcription": "hello world"}))]).await;
    let api = HttpApi::from_config(&config_for(&url, ChatEndpoint::Single)).unwrap();

    let text = api
        .transcribe(AudioPayload::wav(b"RIFFdata".to_vec()))
        .await
        .unwrap();
    assert_eq!(text, "hello world");

    let request = requests.recv().await.unwrap();
    assert_eq!(request.request_line, "POST /api/audio/transcribe HTTP/1.1");
    assert!(request.headers.contains("multipart/form-data"));
    let body = request.body_text();
    assert!(body.contains("name=\"audio\""));
    assert!(body.contains("filename=\"recording.wav\""));
    assert!(body.contains("audio/wav"));
    assert!(body.contains("RIFFdata"));
}

#[tokio::test]
async fn test_transcription_without_text_fails() {
    let (url, _requests) = serve(vec![Reply::json(json!({"error": "no speech"}))]).await;
    let api = HttpApi::from_config(&config_for(&url, ChatEndpoint::Single)).unwrap();

    let err = api
        .transcribe(AudioPayload::wav(vec![1, 2, 3]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Stream(ref m) if m == "no speech"));
}

#[tokio::test]
async fn test_generate_image() {
    let (url, mut requests) = serve(vec![Reply::json(
        json!({"success": true, "images": ["UE5H"], "cost": 0.04}),
    )])
    .await;
    let api = HttpApi::from_config(&config_for(&url, ChatEndpoint::Single)).unwrap();

    let image = api.generate_image("a red fox").await.unwrap();
    assert_eq!(image.png, b"PNG");
    assert_eq!(image.prompt, "a red fox");
    assert_eq!(image.caption(), "Generated image: a red fox\nCost: $0.040");

    let request = requests.recv().await.unwrap();
    assert_eq!(request.json(), json!({"prompt": "a red fox"}));
}

#[tokio::test]
async fn test_probe_transcriber() {
    let (url, _requests) = serve(vec![
        Reply::status(400, "no file"),
        Reply::status(502, "bad gateway"),
    ])
    .await;
    let api = HttpApi::from_config(&config_for(&url, ChatEndpoint::Single)).unwrap();

    assert_eq!(api.probe_transcriber().await.unwrap(), TranscriberProbe::Available);
    assert_eq!(
        api.probe_transcriber().await.unwrap(),
        TranscriberProbe::Responded(502)
    );
}

#[tokio::test]
async fn test_list_models_and_user_stats() {
    let (url, mut requests) = serve(vec![
        Reply::json(json!({"models": [{"name": "llama3.2"}, {"name": "phi3", "size": 12}]})),
        Reply::json(json!({
            "total_requests": 12,
            "current_month_usage": 9.0,
            "monthly_budget": 10.0,
            "daily_usage": {"2024-05-01": {"cost": 1.5, "requests": 3}}
        })),
    ])
    .await;
    let api = HttpApi::from_config(&config_for(&url, ChatEndpoint::Single)).unwrap();

    let models = api.list_models().await.unwrap();
    let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["llama3.2", "phi3"]);
    assert_eq!(
        requests.recv().await.unwrap().request_line,
        "GET /api/tags HTTP/1.1"
    );

    let stats = api.user_stats().await.unwrap();
    assert_eq!(stats.total_requests, 12);
    let dashboard = stats.dashboard();
    assert_eq!(dashboard.usage_series().labels, vec!["2024-05-01"]);
    assert_eq!(
        dashboard.budget_warning().as_deref(),
        Some("Budget warning: you have used 90.0% of your monthly budget.")
    );
}
