//! Route dispatch for the gateway

use crate::http::{Method, Reply, Request, Response, StatusCode};
use kbgate_core::{AppContext, KbgateError};
use serde::Deserialize;
use std::sync::Arc;

/// Body of `POST /chat`
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub stream: bool,
}

/// Request handlers bound to the shared application context
pub struct Gateway {
    ctx: Arc<AppContext>,
    host: String,
    port: u16,
}

impl Gateway {
    /// `host` and `port` are only reported, never bound
    pub fn new(ctx: Arc<AppContext>, host: impl Into<String>, port: u16) -> Self {
        Self {
            ctx,
            host: host.into(),
            port,
        }
    }

    pub async fn handle(&self, request: Request) -> Reply {
        let reply = self.dispatch(&request).await;
        tracing::debug!(
            "{} {} -> {}",
            request.method().as_str(),
            request.path(),
            reply.status().as_u16()
        );
        reply.cors()
    }

    async fn dispatch(&self, request: &Request) -> Reply {
        if *request.method() == Method::Options {
            return preflight().into();
        }

        match (request.path(), request.method()) {
            ("/", Method::Get) => self.handle_root().into(),
            ("/health", Method::Get) => self.handle_health().into(),
            ("/chat", Method::Post) => self.handle_chat(request).await,
            ("/" | "/health", _) => method_not_allowed("GET, OPTIONS").into(),
            ("/chat", _) => method_not_allowed("POST, OPTIONS").into(),
            _ => Response::detail(StatusCode::NotFound, "Not Found").into(),
        }
    }

    fn handle_root(&self) -> Response {
        Response::json(
            StatusCode::Ok,
            &serde_json::json!({
                "message": "kbgate knowledge base chat gateway",
                "version": env!("CARGO_PKG_VERSION"),
                "endpoints": {
                    "chat": "/chat",
                    "health": "/health"
                },
                "status": "running",
                "host": self.host,
                "port": self.port
            }),
        )
    }

    fn handle_health(&self) -> Response {
        let status = self.ctx.status();
        Response::json(
            StatusCode::Ok,
            &serde_json::json!({
                "status": "healthy",
                "knowledge_base_loaded": status.knowledge_base_loaded,
                "prompt_composer_ready": status.prompt_composer_ready,
                "completion_client_ready": status.completion_client_ready,
                "host": self.host,
                "port": self.port
            }),
        )
    }

    async fn handle_chat(&self, request: &Request) -> Reply {
        let chat: ChatRequest = match serde_json::from_slice(request.body()) {
            Ok(chat) => chat,
            Err(e) => {
                return Response::detail(
                    StatusCode::BadRequest,
                    format!("Invalid request body: {}", e),
                )
                .into()
            }
        };

        if chat.message.trim().is_empty() {
            return Response::detail(StatusCode::BadRequest, "message must not be empty").into();
        }

        tracing::info!(
            "Chat request ({} chars, stream={})",
            chat.message.chars().count(),
            chat.stream
        );

        if chat.stream {
            match self.ctx.chat_stream(&chat.message).await {
                Ok(body) => Reply::Stream {
                    head: Response::new(StatusCode::Ok)
                        .header("Content-Type", "text/plain; charset=utf-8")
                        .header("Cache-Control", "no-cache"),
                    body,
                },
                Err(e) => error_response(&e).into(),
            }
        } else {
            match self.ctx.chat(&chat.message).await {
                Ok(text) => Response::json(
                    StatusCode::Ok,
                    &serde_json::json!({ "response": text, "success": true }),
                )
                .into(),
                Err(e) => error_response(&e).into(),
            }
        }
    }
}

fn preflight() -> Response {
    Response::new(StatusCode::NoContent)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Max-Age", "600")
}

fn method_not_allowed(allow: &str) -> Response {
    Response::detail(StatusCode::MethodNotAllowed, "Method Not Allowed").header("Allow", allow)
}

/// Status for a failure that happened before any output was sent
pub fn status_for(error: &KbgateError) -> StatusCode {
    match error {
        KbgateError::InvalidInput(_) => StatusCode::BadRequest,
        KbgateError::NotReady(_) => StatusCode::ServiceUnavailable,
        KbgateError::RateLimited { .. } => StatusCode::TooManyRequests,
        KbgateError::Network(_) => StatusCode::GatewayTimeout,
        KbgateError::InvalidCredentials
        | KbgateError::UpstreamServer { .. }
        | KbgateError::RequestRejected { .. }
        | KbgateError::MalformedResponse(_) => StatusCode::BadGateway,
        _ => StatusCode::InternalServerError,
    }
}

fn error_response(error: &KbgateError) -> Response {
    let status = status_for(error);
    if status == StatusCode::InternalServerError {
        tracing::error!("Chat request failed: {}", error);
    } else {
        tracing::warn!("Chat request failed: {}", error);
    }
    Response::detail(status, error.to_string())
}
