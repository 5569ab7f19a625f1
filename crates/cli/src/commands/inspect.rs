//! `recall history|show|recover|clear` — Session inspection and maintenance.

use std::path::Path;
use std::sync::Arc;

use recall_core::{Message, PinStatus, WorkingMemory};
use recall_providers::ScriptedProvider;
use recall_session::SessionMemory;

use super::{CmdResult, load_config, open_memory};

// These commands never commit, so compression never reaches the provider.
async fn open(config_path: Option<&Path>) -> Result<SessionMemory, Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    open_memory(&config, Arc::new(ScriptedProvider::echo())).await
}

pub async fn history(config_path: Option<&Path>, session: &str, all: bool, json: bool) -> CmdResult {
    let memory = open(config_path).await?;
    let messages = if all {
        memory.get_original_messages(session).await?
    } else {
        memory.get_interaction_messages(session).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else if messages.is_empty() {
        println!("No archived messages for session {session}.");
    } else {
        for message in &messages {
            println!("{}", render(message));
        }
    }
    Ok(())
}

pub async fn show(config_path: Option<&Path>, session: &str, json: bool) -> CmdResult {
    let memory = open(config_path).await?;
    let wm = memory.get_working_memory(session).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&wm)?);
    } else {
        print!("{}", describe(&wm));
    }
    Ok(())
}

pub async fn recover(config_path: Option<&Path>, session: &str) -> CmdResult {
    let memory = open(config_path).await?;
    let wm = memory.recover_working_memory(session).await?;
    if wm.total_rounds() == 0 {
        println!("Nothing archived for session {session}; working memory left empty.");
    } else {
        println!(
            "Recovered session {session}: head={} tail={}",
            wm.head().len(),
            wm.tail().len()
        );
    }
    Ok(())
}

pub async fn clear(config_path: Option<&Path>, session: &str, confirm: bool) -> CmdResult {
    if !confirm {
        println!("This deletes the archive and working memory of session {session}.");
        println!("Run with --confirm to proceed:");
        println!("  recall clear --session {session} --confirm");
        return Ok(());
    }

    let memory = open(config_path).await?;
    memory.clear(session).await?;
    println!("Session {session} cleared.");
    Ok(())
}

fn render(message: &Message) -> String {
    format!("[{}] {}", message.role.as_str().to_uppercase(), message.text_content())
}

/// Human-readable dump of every partition.
fn describe(wm: &WorkingMemory) -> String {
    let mut out = format!(
        "Session {} (updated {})\n",
        wm.conversation_id(),
        wm.updated_at().format("%Y-%m-%d %H:%M:%S UTC")
    );

    out.push_str(&format!("\nHead ({} exchanges)\n", wm.head().len()));
    for message in wm.head().iter().flat_map(|e| e.messages()) {
        out.push_str(&format!("  {}\n", render(message)));
    }

    out.push_str(&format!("\nRolling window ({} messages)\n", wm.rolling_window().len()));
    for message in wm.rolling_window() {
        out.push_str(&format!("  {}\n", render(message)));
    }

    out.push_str(&format!("\nTail ({} exchanges)\n", wm.tail().len()));
    for message in wm.tail().iter().flat_map(|e| e.messages()) {
        out.push_str(&format!("  {}\n", render(message)));
    }

    out.push_str(&format!("\nPins ({} active)\n", wm.active_pins().len()));
    for pin in wm.pins() {
        let marker = match pin.status {
            PinStatus::Active => "*",
            PinStatus::Invalidated => "x",
        };
        out.push_str(&format!(
            "  {marker} {} (confidence {:.2}, id {})\n",
            pin.content, pin.confidence, pin.id
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{Exchange, Pin};

    #[test]
    fn describe_lists_partitions_in_order() {
        let mut wm = WorkingMemory::new("s1");
        wm.admit(Exchange::of(Message::user("first"), Message::assistant("one")), 1, 2);
        wm.add_to_rolling_window(Message::assistant("[History summary] earlier"));
        wm.admit(Exchange::of(Message::user("latest"), Message::assistant("two")), 1, 2);
        let stale = Pin::new("s1", "likes coffee", 0.5);
        let stale_id = stale.id.clone();
        wm.add_pin(stale);
        wm.add_pin(Pin::new("s1", "likes tea", 1.0));
        wm.invalidate_pin(&stale_id);

        let text = describe(&wm);
        let head = text.find("[USER] first").unwrap();
        let window = text.find("[ASSISTANT] [History summary] earlier").unwrap();
        let tail = text.find("[USER] latest").unwrap();
        assert!(head < window && window < tail);
        assert!(text.contains("Pins (1 active)"));
        assert!(text.contains("x likes coffee"));
        assert!(text.contains("* likes tea"));
    }
}
