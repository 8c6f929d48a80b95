//! Streaming example: ask the history tutor a question and print tokens as they arrive.
//!
//! Set DEEPSEEK_API_KEY in your environment and run:
//!   RUST_LOG=debug cargo run --example chat -p historia-chat -- "Why did the Tang dynasty fall?"

use futures::StreamExt;
use historia_chat::{
    ChatClient, ChatMessage, CompletionOptions, DEFAULT_HISTORY_WINDOW, recent_history,
};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Who designed the Zhaozhou Bridge?".to_string());

    let client = ChatClient::from_env();
    let mut history = vec![ChatMessage::user(question)];

    let mut stream = client
        .send(
            &recent_history(&history, DEFAULT_HISTORY_WINDOW),
            &CompletionOptions::default(),
        )
        .await?;

    let mut reply = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        print!("{fragment}");
        std::io::stdout().flush()?;
        reply.push_str(&fragment);
    }
    println!();

    history.push(ChatMessage::assistant(reply));
    println!("({} messages in history)", history.len());

    Ok(())
}
