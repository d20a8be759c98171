//! `chat` and `stream` command handlers.

use anyhow::Result;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;

use dst_ai_gateway::{AiConfig, AiGateway, ChatMessage, ResponseCache};

use super::{report, PromptArgs};

/// Send one question through a fresh gateway and print the answer.
pub(crate) async fn cmd_chat(config: AiConfig, args: PromptArgs, stream: bool) -> Result<()> {
    let cache = Arc::new(ResponseCache::from_config(&config));
    let gateway = AiGateway::from_config(config, cache).map_err(report)?;
    let options = args.options();
    let messages = vec![ChatMessage::user(&args.prompt)];

    let result = if stream {
        print_stream(&gateway, messages, &args.system, &options).await
    } else {
        match gateway.chat(&messages, &args.system, &options).await {
            Ok(answer) => {
                println!("{}", answer);
                Ok(())
            }
            Err(e) => Err(report(e)),
        }
    };

    gateway.close();
    result
}

async fn print_stream(
    gateway: &AiGateway,
    messages: Vec<ChatMessage>,
    system_prompt: &str,
    options: &dst_ai_gateway::ChatOptions,
) -> Result<()> {
    let mut fragments = gateway
        .stream_chat(messages, system_prompt, options)
        .map_err(report)?;
    let mut stdout = std::io::stdout();

    while let Some(item) = fragments.next().await {
        let fragment = match item {
            Ok(fragment) => fragment,
            Err(e) => {
                println!();
                return Err(report(e));
            }
        };
        write!(stdout, "{}", fragment)?;
        stdout.flush()?;
    }
    println!();
    Ok(())
}
