//! Follow-up notifications for gates resolved in the background.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::types::TurnReply;

/// Channel depth; the scheduler waits when the consumer falls behind.
const CHANNEL_CAPACITY: usize = 64;

/// Outcome of a background gate, addressed to the conversation that opened it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub conversation_id: String,
    pub reply: TurnReply,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(conversation_id: impl Into<String>, reply: TurnReply) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            reply,
            created_at: Utc::now(),
        }
    }

    /// One-line rendering for terminal output.
    pub fn render(&self) -> String {
        format!("[{}] {}", self.conversation_id, self.reply.reply)
    }
}

pub fn channel() -> (mpsc::Sender<Notification>, mpsc::Receiver<Notification>) {
    mpsc::channel(CHANNEL_CAPACITY)
}
