//! `recall chat` — Interactive chat with working memory.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use recall_core::{EventBus, Message, MemoryEvent, Provider, ProviderRequest};
use recall_providers::ScriptedProvider;
use recall_session::SessionMemory;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::{CmdResult, load_config, open_memory};

pub async fn run(config_path: Option<&Path>, session: Option<String>, offline: bool) -> CmdResult {
    let config = load_config(config_path)?;

    let provider: Arc<dyn Provider> = if offline {
        Arc::new(ScriptedProvider::echo())
    } else {
        if !config.has_api_key() && !is_local(&config.provider.api_url) {
            eprintln!();
            eprintln!("  ERROR: No API key configured!");
            eprintln!();
            eprintln!("  Set RECALL_API_KEY (or OPENAI_API_KEY), or add it to:");
            eprintln!("    {}", recall_config::RecallConfig::config_path().display());
            eprintln!();
            eprintln!("  Run with --offline to try recall without an endpoint.");
            eprintln!();
            return Err("No API key found. See above for setup instructions.".into());
        }
        recall_providers::from_config(&config.provider)?
    };

    let memory = open_memory(&config, provider.clone()).await?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let reaper = memory.start_reaper(&config.session);
    let watcher = tokio::spawn(log_events(memory.events()));

    println!();
    println!("  recall — interactive chat");
    println!();
    println!("  Session:   {session_id}");
    println!("  Provider:  {}", provider.name());
    println!("  Model:     {}", config.provider.model);
    println!("  Storage:   {}", config.storage.backend);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if matches!(input, "exit" | "quit") {
            break;
        }
        if input.is_empty() {
            prompt()?;
            continue;
        }

        eprint!("  ...");
        match turn(&memory, provider.as_ref(), &config.provider, &session_id, input).await {
            Ok(reply) => {
                eprint!("\r     \r");
                println!();
                for line in reply.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
        prompt()?;
    }

    reaper.stop().await;
    if memory.supervisor().active_workers().await > 0 {
        println!("  Waiting for background compression to settle...");
    }
    memory.shutdown().await;
    watcher.abort();

    println!();
    println!("  Session saved as {session_id}");
    println!();
    Ok(())
}

/// One user turn: build the prompt from memory, ask the provider, commit.
async fn turn(
    memory: &SessionMemory,
    provider: &dyn Provider,
    settings: &recall_config::ProviderConfig,
    session_id: &str,
    input: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let ctx = memory.get_session_context(session_id).await;
    let mut ctx = ctx.lock().await;

    let system = memory.build_system_prompt(session_id).await?;
    let user = memory.build_user_prompt(&mut ctx, input).await?;

    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(user));
    let request =
        ProviderRequest::new(settings.model.clone(), messages).with_temperature(settings.temperature);

    let response = provider.complete(request).await?;
    let reply = response.message.text_content();

    ctx.append_message(Message::user(input));
    ctx.append_message(response.message);
    memory.commit(&mut ctx).await?;
    Ok(reply)
}

async fn log_events(events: Arc<EventBus>) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => match &*event {
                MemoryEvent::PinCreated { pin_id, .. } => debug!(pin_id = %pin_id, "pin created"),
                MemoryEvent::Summarized { kind, compressed, .. } => {
                    debug!(kind = %kind, compressed, "summarized")
                }
                other => debug!(event = ?other, "memory event"),
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                debug!(skipped = n, "event watcher lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn is_local(url: &str) -> bool {
    url.contains("localhost") || url.contains("127.0.0.1")
}
