//! Ask command

use crate::app::AskArgs;
use anyhow::Result;
use futures::StreamExt;
use kbgate_core::{AppContext, CompletionOptions, Config};
use std::io::Write;

pub async fn run(args: AskArgs, config: &Config) -> Result<()> {
    let message = args.message.join(" ");
    let ctx = AppContext::initialize(config)?;

    let mut options = ctx.options();
    if let Some(temperature) = args.temperature {
        options.temperature = temperature;
    }
    if let Some(max_tokens) = args.max_tokens {
        options.max_tokens = max_tokens;
    }

    if args.stream {
        stream_answer(&ctx, &message, options).await
    } else {
        let answer = ctx.chat_with(&message, options).await?;
        println!("{}", answer);
        Ok(())
    }
}

async fn stream_answer(
    ctx: &AppContext,
    message: &str,
    options: CompletionOptions,
) -> Result<()> {
    let mut fragments = ctx.chat_stream_with(message, options).await?;

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(fragment.as_bytes())?;
        stdout.flush()?;
    }
    println!();
    Ok(())
}
