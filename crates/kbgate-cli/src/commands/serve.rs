//! Serve command

use crate::app::ServeArgs;
use anyhow::Result;
use kbgate_core::{AppContext, Config};

pub async fn run(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let ctx = AppContext::initialize(&config)?.shared();
    kbgate_server::start_server(ctx, &config.server).await
}
