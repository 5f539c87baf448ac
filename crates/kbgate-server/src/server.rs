//! Gateway server: TCP accept loop and per-connection request handling

use crate::http::{
    encode_chunk, Reply, Request, RequestError, Response, StatusCode, LAST_CHUNK,
};
use crate::routes::Gateway;
use bytes::BytesMut;
use futures::StreamExt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Largest request body accepted
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Largest request head buffered before the request is rejected
const MAX_HEAD_SIZE: usize = 64 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct GatewayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl GatewayServer {
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve the gateway routes until the process exits
    pub async fn serve(self, gateway: Arc<Gateway>) -> Result<(), ServerError> {
        self.run(move |request| {
            let gateway = Arc::clone(&gateway);
            async move { gateway.handle(request).await }
        })
        .await
    }

    /// Accept connections and dispatch every request to `handler`
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Reply> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!("Gateway listening on http://{}", self.local_addr);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            debug!("Connection from {}", peer);
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, handler).await {
                    debug!("Connection {} closed with error: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
) -> std::io::Result<()>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Reply> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                if buf.len() > MAX_HEAD_SIZE {
                    warn!("Request head from {} too large", peer);
                    let response =
                        Response::detail(StatusCode::PayloadTooLarge, "Request head too large");
                    return reject(&mut stream, response).await;
                }
                if stream.read_buf(&mut buf).await? == 0 {
                    debug!("Connection {} closed by peer", peer);
                    return Ok(());
                }
                continue;
            }
            Err(e) => {
                warn!("Bad request from {}: {}", peer, e);
                let response =
                    Response::detail(StatusCode::BadRequest, format!("Bad Request: {}", e));
                return reject(&mut stream, response).await;
            }
        };

        let content_length = match request.content_length() {
            Ok(len) => len,
            Err(e) => {
                warn!("Bad request from {}: {}", peer, e);
                let response =
                    Response::detail(StatusCode::BadRequest, format!("Bad Request: {}", e));
                return reject(&mut stream, response).await;
            }
        };

        if content_length > MAX_BODY_SIZE {
            warn!("Request body from {} exceeds {} bytes", peer, MAX_BODY_SIZE);
            let response = Response::detail(
                StatusCode::PayloadTooLarge,
                format!("Request body exceeds {} bytes", MAX_BODY_SIZE),
            );
            return reject(&mut stream, response).await;
        }

        let total = body_offset + content_length;
        while buf.len() < total {
            if stream.read_buf(&mut buf).await? == 0 {
                debug!("Connection {} closed mid-body", peer);
                return Ok(());
            }
        }

        let mut consumed = buf.split_to(total);
        let body = consumed.split_off(body_offset).freeze();
        let request = request.with_body(body);
        let chunked = request.accepts_chunked();
        let keep_alive = request.is_keep_alive();

        debug!("{} {} from {}", request.method().as_str(), request.path(), peer);

        let reply = handler(request).await;
        let keep_alive = keep_alive && (chunked || !reply.is_stream());
        write_reply(&mut stream, reply, keep_alive, chunked).await?;

        if !keep_alive {
            stream.shutdown().await?;
            return Ok(());
        }
    }
}

async fn reject(stream: &mut TcpStream, response: Response) -> std::io::Result<()> {
    let response = response.cors().keep_alive(false);
    stream.write_all(&response.into_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Write `reply`; a streamed body is forwarded fragment by fragment
///
/// HTTP/1.1 peers get one chunk per fragment. Older peers get the raw bytes and
/// the body ends when the connection closes. A failure inside the fragment
/// stream ends the body with an `Error: ` fragment. A write failure drops the
/// stream, which releases the upstream connection.
async fn write_reply(
    stream: &mut TcpStream,
    reply: Reply,
    keep_alive: bool,
    chunked: bool,
) -> std::io::Result<()> {
    match reply {
        Reply::Full(response) => {
            stream
                .write_all(&response.keep_alive(keep_alive).into_bytes())
                .await?;
        }
        Reply::Stream { head, mut body } => {
            let head = if chunked {
                head.keep_alive(keep_alive).into_chunked_head()
            } else {
                head.into_close_delimited_head()
            };
            stream.write_all(&head).await?;
            stream.flush().await?;

            let mut fragments = 0usize;
            while let Some(item) = body.next().await {
                match item {
                    Ok(fragment) => {
                        if write_fragment(stream, fragment.as_bytes(), chunked).await? {
                            stream.flush().await?;
                            fragments += 1;
                        }
                    }
                    Err(e) => {
                        warn!("Stream failed after {} fragments: {}", fragments, e);
                        let message = format!("Error: {}", e);
                        write_fragment(stream, message.as_bytes(), chunked).await?;
                        break;
                    }
                }
            }

            if chunked {
                stream.write_all(LAST_CHUNK).await?;
            }
            debug!("Streamed {} fragments", fragments);
        }
    }
    stream.flush().await
}

/// Write one non-empty fragment; returns whether anything was written
async fn write_fragment(
    stream: &mut TcpStream,
    data: &[u8],
    chunked: bool,
) -> std::io::Result<bool> {
    if chunked {
        match encode_chunk(data) {
            Some(chunk) => stream.write_all(&chunk).await?,
            None => return Ok(false),
        }
    } else if data.is_empty() {
        return Ok(false);
    } else {
        stream.write_all(data).await?;
    }
    Ok(true)
}
