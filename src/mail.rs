//! Mail boundary used by the confirmation gate and the executor.
//!
//! The gate only needs two things from a mailbox: send a message, and list
//! what a given sender has written since a point in time.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SlotdeskError;

/// A message received from a counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub timestamp: DateTime<Utc>,
    pub body_snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailService: Send + Sync {
    async fn send(&self, recipient: &str, message: &OutgoingMessage) -> Result<(), SlotdeskError>;

    /// Recent messages from `sender`. Adapters may over-fetch around `since`
    /// and return any order; callers filter eligibility and order themselves.
    async fn list_since(
        &self,
        sender: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, SlotdeskError>;
}

// ============================================================================
// Message composition
// ============================================================================

pub fn schedule_invitation(event_date: &str, event_time: &str) -> OutgoingMessage {
    OutgoingMessage {
        subject: "Meeting Invitation - Accept to Proceed".to_string(),
        body: format!(
            "Hi, please reply with 'Yes' if you accept the meeting invite on '{}' at '{}'.",
            event_date, event_time
        ),
    }
}

pub fn reschedule_request(
    event_name: &str,
    new_start: NaiveDateTime,
    new_end: NaiveDateTime,
) -> OutgoingMessage {
    OutgoingMessage {
        subject: format!("Reschedule Request: {}", event_name),
        body: format!(
            "Hi, would you be okay with rescheduling the meeting '{}' to:\n{} to {}?\n\nPlease reply 'Yes' to confirm.",
            event_name,
            new_start.format("%Y-%m-%d %H:%M"),
            new_end.format("%Y-%m-%d %H:%M")
        ),
    }
}

pub fn cancellation_notice(event_name: &str) -> OutgoingMessage {
    OutgoingMessage {
        subject: format!("Event Cancelled: {}", event_name),
        body: format!("The scheduled event '{}' has been cancelled.", event_name),
    }
}
