//! Example: Replaying a transcript through the context engine
//!
//! Feeds recorded exchanges into a `ContextManager`, then prints the window
//! and prompt a follow-up question would receive.
//!
//! Usage: cargo run --example replay_transcript -- [transcript.json] [config.toml]
//!
//! The transcript is a JSON array of `{"user": "...", "assistant": "..."}`
//! objects. A short built-in conversation is used when no file is given.

use conversation_context::{config::Config, telemetry, ContextManager};
use serde::Deserialize;
use std::env;
use std::fs;

#[derive(Debug, Deserialize)]
struct Exchange {
    user: String,
    assistant: String,
    #[serde(default)]
    attachments: Vec<String>,
}

fn builtin_transcript() -> Vec<Exchange> {
    let pairs = [
        ("How do I read a file in Rust?", "Use `std::fs::read_to_string` for small files. The key point is that it returns a Result you should handle."),
        ("What about large files?", "For large files the solution is a `BufReader` over the file handle, reading line by line."),
        ("Can you show code?", "```rust\nlet reader = BufReader::new(File::open(path)?);\nfor line in reader.lines() { println!(\"{}\", line?); }\n```"),
        ("Why does the borrow checker complain here?", "The important thing to remember is that `line` is moved into the loop body."),
        ("Thanks", "You are welcome."),
    ];

    pairs
        .iter()
        .cycle()
        .take(24)
        .map(|(user, assistant)| Exchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
            attachments: vec![],
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let transcript_path = args.next();
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    telemetry::init_tracing(&config.logging)?;

    let transcript = match transcript_path {
        Some(path) => serde_json::from_str::<Vec<Exchange>>(&fs::read_to_string(&path)?)?,
        None => builtin_transcript(),
    };

    let manager = ContextManager::new(config)?;
    for exchange in &transcript {
        manager.record_turn(&exchange.user, &exchange.assistant, exchange.attachments.clone());
    }
    manager.settle().await;

    let query = "How should I handle errors when reading files?";
    let window = manager.build_window_default(query, &[]);

    println!("Replayed {} exchanges", transcript.len());
    println!("Stats: {}", serde_json::to_string_pretty(&manager.get_stats())?);
    println!(
        "Window: {} messages, {} tokens, summary attached: {}",
        window.messages.len(),
        window.total_tokens,
        window.summary.is_some()
    );

    for message in manager.build_prompt(query, &[]) {
        println!("[{}] {}", message.role, message.content);
    }

    Ok(())
}
