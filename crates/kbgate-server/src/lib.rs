//! Kbgate HTTP Gateway
//!
//! Exposes the knowledge-grounded chat client over HTTP/1.1.

pub mod http;
mod routes;
mod server;

pub use routes::{status_for, ChatRequest, Gateway};
pub use server::{GatewayServer, ServerError, MAX_BODY_SIZE};

use anyhow::Result;
use kbgate_core::{AppContext, ServerConfig};
use std::sync::Arc;

pub async fn start_server(ctx: Arc<AppContext>, config: &ServerConfig) -> Result<()> {
    let server = GatewayServer::bind(config.bind_addr()).await?;
    let gateway = Gateway::new(ctx, config.host.clone(), server.local_addr().port());
    server.serve(Arc::new(gateway)).await?;
    Ok(())
}
