//! HTTP/1.1 wire types for the gateway
//!
//! Requests are parsed with [`httparse`]; responses are serialized by hand,
//! either with a fixed `Content-Length` or as a chunked body fed by a
//! fragment stream.

use bytes::{BufMut, Bytes, BytesMut};
use kbgate_core::FragmentStream;
use thiserror::Error;

/// Response status codes the gateway emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    NoContent = 204,
    BadRequest = 400,
    NotFound = 404,
    MethodNotAllowed = 405,
    PayloadTooLarge = 413,
    TooManyRequests = 429,
    InternalServerError = 500,
    BadGateway = 502,
    ServiceUnavailable = 503,
    GatewayTimeout = 504,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::TooManyRequests => "Too Many Requests",
            Self::InternalServerError => "Internal Server Error",
            Self::BadGateway => "Bad Gateway",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::GatewayTimeout => "Gateway Timeout",
        }
    }
}

/// Request method; anything the gateway does not route is kept verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Options,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Options => "OPTIONS",
            Self::Other(m) => m.as_str(),
        }
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "OPTIONS" => Self::Options,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Errors raised while reading a request off the wire
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    #[error("chunked request bodies are not supported")]
    ChunkedBody,
}

/// A parsed request
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// Minor version: 0 for HTTP/1.0, 1 for HTTP/1.1
    version: u8,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parse the request head from `buf`
    ///
    /// Returns the request (with an empty body) and the offset at which the
    /// body starts.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from(raw.method.ok_or(RequestError::MissingField { field: "method" })?);
        let raw_path = raw.path.ok_or(RequestError::MissingField { field: "path" })?;
        let path = raw_path
            .split_once('?')
            .map(|(p, _)| p)
            .unwrap_or(raw_path)
            .to_string();
        let version = raw
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let headers = raw
            .headers
            .iter()
            .filter_map(|h| {
                std::str::from_utf8(h.value)
                    .ok()
                    .map(|v| (h.name.to_string(), v.to_string()))
            })
            .collect();

        Ok((
            Self {
                method,
                path,
                version,
                headers,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path without the query string
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of `name`, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Declared body length; zero when absent
    pub fn content_length(&self) -> Result<usize, RequestError> {
        if self
            .header("transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
        {
            return Err(RequestError::ChunkedBody);
        }
        match self.header("content-length") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| RequestError::InvalidContentLength),
            None => Ok(0),
        }
    }

    /// Chunked transfer coding is an HTTP/1.1 feature
    pub fn accepts_chunked(&self) -> bool {
        self.version >= 1
    }

    /// HTTP/1.1 keeps the connection open unless told otherwise; HTTP/1.0 closes it
    pub fn is_keep_alive(&self) -> bool {
        match self.header("connection") {
            Some(conn) => !conn.eq_ignore_ascii_case("close"),
            None => self.version == 1,
        }
    }
}

/// Response head plus an optional buffered body
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// JSON body with the matching content type
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status)
            .header("Content-Type", "application/json")
            .body(value.to_string())
    }

    /// `{"detail": message}` error body
    pub fn detail(status: StatusCode, message: impl Into<String>) -> Self {
        Self::json(status, &serde_json::json!({ "detail": message.into() }))
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Allow any origin
    #[must_use]
    pub fn cors(self) -> Self {
        if self.has_header("access-control-allow-origin") {
            return self;
        }
        self.header("Access-Control-Allow-Origin", "*")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    fn write_head(&self, buf: &mut BytesMut) {
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in &self.headers {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        buf.put(format!("Connection: {connection}\r\n").as_bytes());
    }

    /// Serialize with a fixed `Content-Length`
    pub fn into_bytes(mut self) -> BytesMut {
        if !self.body.is_empty() && !self.has_header("content-type") {
            self.headers
                .push(("Content-Type".to_string(), "text/plain; charset=utf-8".to_string()));
        }

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + self.body.len());
        self.write_head(&mut buf);
        buf.put(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        buf.put(self.body.as_slice());
        buf
    }

    /// Serialize the head of a chunked response; the body is ignored
    pub fn into_chunked_head(self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64);
        self.write_head(&mut buf);
        buf.put(&b"Transfer-Encoding: chunked\r\n\r\n"[..]);
        buf
    }

    /// Serialize a head whose body runs until the connection closes
    pub fn into_close_delimited_head(self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64);
        self.keep_alive(false).write_head(&mut buf);
        buf.put(&b"\r\n"[..]);
        buf
    }
}

/// Terminates a chunked body
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Frame `data` as one chunk; empty input yields nothing so the body is not cut short
pub fn encode_chunk(data: &[u8]) -> Option<BytesMut> {
    if data.is_empty() {
        return None;
    }
    let mut buf = BytesMut::with_capacity(data.len() + 12);
    buf.put(format!("{:X}\r\n", data.len()).as_bytes());
    buf.put(data);
    buf.put(&b"\r\n"[..]);
    Some(buf)
}

/// What a handler hands back to the connection loop
pub enum Reply {
    Full(Response),
    /// Head sent immediately, then one chunk per fragment
    Stream { head: Response, body: FragmentStream },
}

impl Reply {
    #[must_use]
    pub fn cors(self) -> Self {
        match self {
            Self::Full(response) => Self::Full(response.cors()),
            Self::Stream { head, body } => Self::Stream {
                head: head.cors(),
                body,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Full(response) => response.status(),
            Self::Stream { head, .. } => head.status(),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream { .. })
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Full(response)
    }
}
