//! Scripted upstream chat completion service for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// One canned reply
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Buffered body with a status code
    Json { status: u16, body: String },
    /// `text/event-stream` body written piece by piece
    Sse { chunks: Vec<String> },
    /// Event stream that promises more bytes than it sends, then disconnects
    Truncated { chunks: Vec<String> },
    /// Event stream that sends `chunks`, then waits for the client to hang up
    Stall { chunks: Vec<String> },
    /// Accept the request and never answer
    Hang,
}

impl MockResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self::Json {
            status,
            body: body.into(),
        }
    }

    pub fn completion(content: &str) -> Self {
        Self::json(
            200,
            serde_json::json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": content },
                    "finish_reason": "stop"
                }]
            })
            .to_string(),
        )
    }

    pub fn status(status: u16) -> Self {
        Self::json(status, format!("{{\"error\":{{\"message\":\"status {}\"}}}}", status))
    }

    /// Event stream carrying `pieces` as deltas, terminated by the sentinel
    pub fn stream(pieces: &[&str]) -> Self {
        let mut chunks: Vec<String> = pieces.iter().map(|p| delta_line(p)).collect();
        chunks.push("data: [DONE]\n\n".to_string());
        Self::Sse { chunks }
    }

    pub fn raw_stream(chunks: &[&str]) -> Self {
        Self::Sse {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// A `data: ` line holding one delta
pub fn delta_line(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [{ "index": 0, "delta": { "content": content } }]
        })
    )
}

/// What the upstream received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub received_at: Instant,
    pub request_line: String,
    /// Header names lowercased, values as sent
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.clone())
    }
}

#[derive(Default)]
struct State {
    script: VecDeque<MockResponse>,
    last: Option<MockResponse>,
    requests: Vec<RecordedRequest>,
}

pub struct MockUpstream {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    disconnected: Arc<Notify>,
    task: JoinHandle<()>,
}

impl MockUpstream {
    /// Serve `script` in order; the last reply repeats once the script runs out
    pub async fn start(script: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State {
            script: script.into(),
            ..State::default()
        }));

        let disconnected = Arc::new(Notify::new());

        let task_state = Arc::clone(&state);
        let task_disconnected = Arc::clone(&disconnected);
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = Arc::clone(&task_state);
                let disconnected = Arc::clone(&task_disconnected);
                tokio::spawn(async move {
                    let _ = serve(stream, state, disconnected).await;
                });
            }
        });

        Self {
            addr,
            state,
            disconnected,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/v1/chat/completions", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Time between consecutive requests
    pub fn gaps(&self) -> Vec<Duration> {
        self.requests()
            .windows(2)
            .map(|w| w[1].received_at.duration_since(w[0].received_at))
            .collect()
    }

    /// Whether a stalled stream saw its client hang up within `limit`
    pub async fn wait_for_disconnect(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.disconnected.notified())
            .await
            .is_ok()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// An address nothing listens on
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/v1/chat/completions", addr)
}

async fn serve(
    mut stream: TcpStream,
    state: Arc<Mutex<State>>,
    disconnected: Arc<Notify>,
) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n").filter(|l| !l.is_empty());
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = serde_json::from_slice(&buf[header_end..]).unwrap_or(serde_json::Value::Null);

    let response = {
        let mut state = state.lock().unwrap();
        state.requests.push(RecordedRequest {
            received_at: Instant::now(),
            request_line,
            headers,
            body,
        });
        let next = state.script.pop_front().or_else(|| state.last.clone());
        if let Some(ref response) = next {
            state.last = Some(response.clone());
        }
        next.unwrap_or_else(|| MockResponse::status(500))
    };

    match response {
        MockResponse::Json { status, body } => {
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                reason(status),
                body.len()
            );
            stream.write_all(head.as_bytes()).await?;
            stream.write_all(body.as_bytes()).await?;
        }
        MockResponse::Sse { chunks } => {
            let length: usize = chunks.iter().map(|c| c.len()).sum();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                length
            );
            stream.write_all(head.as_bytes()).await?;
            for chunk in chunks {
                stream.write_all(chunk.as_bytes()).await?;
                stream.flush().await?;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        MockResponse::Truncated { chunks } => {
            let length: usize = chunks.iter().map(|c| c.len()).sum::<usize>() + 1024;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                length
            );
            stream.write_all(head.as_bytes()).await?;
            for chunk in chunks {
                stream.write_all(chunk.as_bytes()).await?;
                stream.flush().await?;
            }
        }
        MockResponse::Stall { chunks } => {
            let length: usize = chunks.iter().map(|c| c.len()).sum::<usize>() + 1024;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                length
            );
            stream.write_all(head.as_bytes()).await?;
            for piece in chunks {
                stream.write_all(piece.as_bytes()).await?;
            }
            stream.flush().await?;

            if matches!(stream.read(&mut chunk).await, Ok(0) | Err(_)) {
                disconnected.notify_one();
            }
            return Ok(());
        }
        MockResponse::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    stream.flush().await?;
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
