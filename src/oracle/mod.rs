//! Natural-language oracle boundary.
//!
//! The dialogue state machine only sees this trait: classify a turn, extract
//! candidate slot values for an intent, and produce a freeform reply for turns
//! that are not calendar commands. Adapters:
//! - gemini: Gemini `generateContent` over HTTPS

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SlotdeskError;
use crate::types::{Intent, SlotMap};

pub use gemini::GeminiOracle;

/// Oracle classification of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentClass {
    Schedule,
    Update,
    Delete,
    None,
}

impl IntentClass {
    /// Unknown or conflicting labels collapse to `None`.
    pub fn from_label(label: &str) -> IntentClass {
        match label.trim().to_lowercase().as_str() {
            "schedule" => IntentClass::Schedule,
            "update" | "reschedule" => IntentClass::Update,
            "delete" | "cancel" => IntentClass::Delete,
            _ => IntentClass::None,
        }
    }

    pub fn intent(self) -> Option<Intent> {
        match self {
            IntentClass::Schedule => Some(Intent::Schedule),
            IntentClass::Update => Some(Intent::Update),
            IntentClass::Delete => Some(Intent::Delete),
            IntentClass::None => None,
        }
    }
}

/// Classifier/extractor used by the dialogue state machine.
///
/// `context` holds the user's earlier turns in this conversation, oldest
/// first, not including `text`.
#[async_trait]
pub trait NluOracle: Send + Sync {
    async fn classify_intent(
        &self,
        text: &str,
        context: &[String],
    ) -> Result<IntentClass, SlotdeskError>;

    /// Best-effort partial extraction. Values are raw; the slot schema validates them.
    async fn extract_slots(
        &self,
        text: &str,
        intent: Intent,
        context: &[String],
    ) -> Result<SlotMap, SlotdeskError>;

    /// Freeform reply for turns that are not calendar commands.
    async fn respond(&self, text: &str, context: &[String]) -> Result<String, SlotdeskError>;

    /// Spelling and time-format cleanup applied before a turn is processed.
    async fn correct_text(&self, text: &str) -> Result<String, SlotdeskError> {
        Ok(text.to_string())
    }
}
