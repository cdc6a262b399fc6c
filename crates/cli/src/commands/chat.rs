//! `ripple chat` — Talk to a running gateway.

use anyhow::Context;
use ripple::{ChatClient, HttpConversationStore};
use ripple_config::AppConfig;
use ripple_core::message::ThreadId;
use ripple_protocol::{ConsumerStatus, ConsumerUpdate, StreamConsumer};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    thread: Option<String>,
    message: Option<String>,
    url: Option<String>,
    token: Option<String>,
) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let url = url.unwrap_or_else(|| {
        format!("http://{}:{}", config.gateway.host, config.gateway.port)
    });
    let token = token.or_else(|| config.gateway.bearer_tokens.first().cloned());

    let mut client = ChatClient::new(&url);
    if let Some(token) = token {
        client = client.with_token(token);
    }

    let thread_id = thread.map(ThreadId::from).unwrap_or_default();
    let history = client
        .history(&thread_id)
        .await
        .with_context(|| format!("Could not reach gateway at {url}"))?;

    let store = Arc::new(HttpConversationStore::new(client.clone()));
    let mut consumer = StreamConsumer::new(store, thread_id.clone(), history);

    if let Some(message) = message {
        let status = turn(&client, &mut consumer, &thread_id, &message).await?;
        if status == ConsumerStatus::Failed {
            anyhow::bail!(consumer.error().unwrap_or("run failed").to_string());
        }
        return Ok(());
    }

    println!();
    println!("  Ripple chat — thread {thread_id}");
    println!("  {} earlier messages. Type 'exit' or Ctrl+D to quit.", consumer.messages().len());
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        // A failed turn is reported inline; the session carries on.
        if let Err(e) = turn(&client, &mut consumer, &thread_id, line).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

async fn turn(
    client: &ChatClient,
    consumer: &mut StreamConsumer,
    thread_id: &ThreadId,
    text: &str,
) -> anyhow::Result<ConsumerStatus> {
    let mut printed = 0;
    print!("  Assistant > ");
    std::io::stdout().flush()?;

    let status = client
        .send_turn(consumer, thread_id, text, |update| match update {
            ConsumerUpdate::Partial(text) => {
                print!("{}", &text[printed..]);
                let _ = std::io::stdout().flush();
                printed = text.len();
            }
            ConsumerUpdate::ToolStarted(record) => eprintln!("\n  [tool] {}", record.render()),
            ConsumerUpdate::ToolFinished(record) => eprintln!("  [tool] {}", record.render()),
            ConsumerUpdate::Failed(error) => eprintln!("\n  [Error] {error}"),
            ConsumerUpdate::Completed(_) => println!(),
            ConsumerUpdate::Nothing => {}
        })
        .await?;
    Ok(status)
}
