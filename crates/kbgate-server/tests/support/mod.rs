//! Scripted upstream the gateway forwards to

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
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
}

impl MockResponse {
    pub fn completion(content: &str) -> Self {
        Self::Json {
            status: 200,
            body: serde_json::json!({
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": content },
                    "finish_reason": "stop"
                }]
            })
            .to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Json {
            status,
            body: format!("{{\"error\":{{\"message\":\"status {}\"}}}}", status),
        }
    }

    /// Event stream carrying `pieces` as deltas, terminated by the sentinel
    pub fn stream(pieces: &[&str]) -> Self {
        let mut chunks: Vec<String> = pieces.iter().map(|p| delta_line(p)).collect();
        chunks.push("data: [DONE]\n\n".to_string());
        Self::Sse { chunks }
    }
}

/// A `data: ` line holding one delta
pub fn delta_line(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
    )
}

/// Parsed JSON body of one forwarded request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub body: serde_json::Value,
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

        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&task_state);
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        Self { addr, state, task }
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
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<State>>) -> std::io::Result<()> {
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

    let content_length = String::from_utf8_lossy(&buf[..header_end])
        .split("\r\n")
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
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
        state.requests.push(RecordedRequest { body });
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
            write_event_stream(&mut stream, &chunks, 0).await?;
        }
        MockResponse::Truncated { chunks } => {
            write_event_stream(&mut stream, &chunks, 1024).await?;
        }
    }

    stream.flush().await?;
    stream.shutdown().await
}

/// Announce `missing` more bytes than are written so the client sees a cut body
async fn write_event_stream(
    stream: &mut TcpStream,
    chunks: &[String],
    missing: usize,
) -> std::io::Result<()> {
    let length: usize = chunks.iter().map(|c| c.len()).sum::<usize>() + missing;
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        length
    );
    stream.write_all(head.as_bytes()).await?;
    for chunk in chunks {
        stream.write_all(chunk.as_bytes()).await?;
        stream.flush().await?;
    }
    Ok(())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        _ => "Error",
    }
}
