pub mod assistant;
pub mod calendar;
pub mod dialogue;
pub mod error;
pub mod executor;
pub mod gate;
pub mod google_api;
pub mod mail;
pub mod notification;
pub mod oracle;
pub mod scheduler;
pub mod slots;
pub mod state;
#[cfg(test)]
mod testing;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use assistant::Assistant;
use error::SlotdeskError;
use google_api::{GmailService, GoogleCalendarService, TokenSource};
use oracle::GeminiOracle;
use scheduler::Scheduler;
use state::{GateStore, SessionStore};

/// Conversation id used for the terminal session.
const CLI_CONVERSATION: &str = "cli";

/// Build the assistant from config and run an interactive terminal session.
pub async fn run() -> Result<(), SlotdeskError> {
    let config = state::load_config()?;
    let dir = state::state_dir(&config)?;

    let token_path = config
        .google
        .token_path
        .clone()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(google_api::default_token_path);
    let tokens = Arc::new(TokenSource::new(token_path));
    let calendar = Arc::new(GoogleCalendarService::new(tokens.clone(), &config.google));
    let mail = Arc::new(GmailService::new(tokens));
    let oracle = Arc::new(GeminiOracle::from_config(&config.oracle)?);

    let assistant = Arc::new(Assistant::new(
        &config,
        oracle,
        calendar,
        mail,
        SessionStore::open(&dir)?,
        GateStore::open(&dir)?,
    ));

    // Spawn gate poller
    let (notify_tx, mut notify_rx) = notification::channel();
    let poller = Scheduler::new(
        assistant.clone(),
        notify_tx,
        Duration::from_secs(config.gate.poll_interval_secs),
    );
    tokio::spawn(async move {
        poller.run().await;
    });

    // Print background outcomes as they arrive
    tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            println!("\n{}", notification.render());
        }
    });

    println!("Slotdesk ready. Type 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if matches!(text.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }
        let reply = assistant.handle_turn(CLI_CONVERSATION, text).await;
        println!("{}", reply.reply);
    }

    log::info!("Session ended");
    Ok(())
}
