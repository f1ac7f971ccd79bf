//! Error types for turn handling and command execution
//!
//! Errors are classified by how a turn recovers from them:
//! - Local: validation failures become a re-prompt, never a failure
//! - Terminal: an event that vanished ends the command and resets the conversation
//! - Retryable: transport and oracle failures, the user may simply try again

use thiserror::Error;

use crate::types::SlotName;

/// Error types for the scheduling assistant
#[derive(Debug, Error)]
pub enum SlotdeskError {
    // Recovered locally as a re-prompt
    #[error("Invalid value for {slot}: {input:?}")]
    Validation { slot: SlotName, input: String },

    // Terminal outcome
    #[error("Event not found: {0}")]
    NotFound(String),

    // Retryable errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    // Non-retryable errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl SlotdeskError {
    /// Returns true if the same turn may succeed when sent again
    pub fn is_retryable(&self) -> bool {
        matches!(self, SlotdeskError::Transport(_) | SlotdeskError::Oracle(_))
    }

    /// Returns true if this error ends the command and clears conversation state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SlotdeskError::NotFound(_))
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SlotdeskError::Validation { .. } => "Check the value and try again.",
            SlotdeskError::NotFound(_) => "Check the event name against your upcoming events.",
            SlotdeskError::Transport(_) => "Check your connection to Google and try again.",
            SlotdeskError::Oracle(_) => "The language service is unavailable. Try again shortly.",
            SlotdeskError::Configuration(_) => "Check your configuration in ~/.slotdesk/config.json",
            SlotdeskError::Serialization(_) => "Check the state files under ~/.slotdesk/state.",
            SlotdeskError::Io(_) => "Check file permissions and disk space.",
        }
    }
}

impl From<std::io::Error> for SlotdeskError {
    fn from(err: std::io::Error) -> Self {
        SlotdeskError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SlotdeskError {
    fn from(err: serde_json::Error) -> Self {
        SlotdeskError::Serialization(err.to_string())
    }
}

/// Serializable error representation for turn replies
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnError {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Retryable,
    Terminal,
    NonRetryable,
}

impl From<&SlotdeskError> for TurnError {
    fn from(err: &SlotdeskError) -> Self {
        let error_type = if err.is_terminal() {
            ErrorType::Terminal
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        TurnError {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
