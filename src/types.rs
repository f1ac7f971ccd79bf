use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TurnError;

/// Maximum number of raw turns kept per conversation for oracle context
pub const MAX_HISTORY_TURNS: usize = 50;

/// Configuration stored in ~/.slotdesk/config.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Directory for session and pending-gate snapshots (default ~/.slotdesk/state)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
}

// =============================================================================
// Confirmation gate configuration
// =============================================================================

/// How a gated command waits for its counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Hold the turn open until the gate resolves.
    Inline,
    /// Persist the gate and resolve it on scheduler ticks.
    #[default]
    Background,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_acceptance_keywords")]
    pub acceptance_keywords: Vec<String>,
    #[serde(default)]
    pub mode: GateMode,
}

fn default_max_attempts() -> u32 {
    300
}
fn default_poll_interval_secs() -> u64 {
    6
}
fn default_acceptance_keywords() -> Vec<String> {
    vec!["yes".to_string(), "accepted".to_string(), "i accept".to_string()]
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            poll_interval_secs: default_poll_interval_secs(),
            acceptance_keywords: default_acceptance_keywords(),
            mode: GateMode::default(),
        }
    }
}

// =============================================================================
// Google configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_path: Option<String>,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_upcoming_lookup_limit")]
    pub upcoming_lookup_limit: u32,
    #[serde(default = "default_attach_meet_link")]
    pub attach_meet_link: bool,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}
fn default_time_zone() -> String {
    "Asia/Kolkata".to_string()
}
fn default_upcoming_lookup_limit() -> u32 {
    10
}
fn default_attach_meet_link() -> bool {
    true
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            token_path: None,
            calendar_id: default_calendar_id(),
            time_zone: default_time_zone(),
            upcoming_lookup_limit: default_upcoming_lookup_limit(),
            attach_meet_link: default_attach_meet_link(),
        }
    }
}

// =============================================================================
// Oracle configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleConfig {
    #[serde(default = "default_oracle_model")]
    pub model: String,
    /// Falls back to GEMINI_API_KEY when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_correct_spelling")]
    pub correct_spelling: bool,
}

fn default_oracle_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_correct_spelling() -> bool {
    true
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: default_oracle_model(),
            api_key: None,
            correct_spelling: default_correct_spelling(),
        }
    }
}

// =============================================================================
// Conversation types
// =============================================================================

/// The calendar action a conversation is negotiating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    None,
    Schedule,
    Update,
    Delete,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::None => "none",
            Intent::Schedule => "schedule",
            Intent::Update => "update",
            Intent::Delete => "delete",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A named piece of information required to complete a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotName {
    ParticipantAddress,
    EventName,
    EventDate,
    EventTime,
    NewDate,
    NewTime,
}

impl SlotName {
    pub const ALL: [SlotName; 6] = [
        SlotName::ParticipantAddress,
        SlotName::EventName,
        SlotName::EventDate,
        SlotName::EventTime,
        SlotName::NewDate,
        SlotName::NewTime,
    ];

    /// Wire key, as used in oracle extraction payloads.
    pub fn key(&self) -> &'static str {
        match self {
            SlotName::ParticipantAddress => "participantAddress",
            SlotName::EventName => "eventName",
            SlotName::EventDate => "eventDate",
            SlotName::EventTime => "eventTime",
            SlotName::NewDate => "newDate",
            SlotName::NewTime => "newTime",
        }
    }

    pub fn from_key(key: &str) -> Option<SlotName> {
        SlotName::ALL.into_iter().find(|s| s.key() == key)
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Slot values keyed by name. Values are always normalized.
pub type SlotMap = BTreeMap<SlotName, String>;

/// State of one active conversation.
///
/// Invariants: `slots` only holds keys from the active intent's schema, and
/// `waiting_for`, when set, names a required slot not yet in `slots`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub slots: SlotMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_for: Option<SlotName>,
    #[serde(default)]
    pub history: Vec<String>,
}

impl ConversationState {
    pub fn is_idle(&self) -> bool {
        self.intent == Intent::None
    }

    /// Back to Idle after a terminal outcome. History is kept for oracle context.
    pub fn reset(&mut self) {
        self.intent = Intent::None;
        self.slots.clear();
        self.waiting_for = None;
    }

    /// The last `limit` turns, oldest first.
    pub fn recent_history(&self, limit: usize) -> &[String] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn push_history(&mut self, text: &str) {
        self.history.push(text.to_string());
        if self.history.len() > MAX_HISTORY_TURNS {
            let excess = self.history.len() - MAX_HISTORY_TURNS;
            self.history.drain(..excess);
        }
    }
}

// =============================================================================
// Turn boundary
// =============================================================================

/// Machine-readable state of a turn reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Prompt,
    Chat,
    AwaitingConfirmation,
    Executed,
    Rejected,
    NotFound,
    Error,
}

/// Reply returned for every turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    pub reply: String,
    pub state: TurnState,
}

impl TurnReply {
    pub fn new(reply: impl Into<String>, state: TurnState) -> Self {
        Self {
            reply: reply.into(),
            state,
        }
    }

    pub fn prompt(reply: impl Into<String>) -> Self {
        Self::new(reply, TurnState::Prompt)
    }

    pub fn from_error(err: &crate::error::SlotdeskError) -> Self {
        let detail = TurnError::from(err);
        Self::new(
            format!("{} {}", detail.message, detail.recovery_suggestion),
            TurnState::Error,
        )
    }
}

// =============================================================================
// Confirmation gate types
// =============================================================================

/// Terminal result of a confirmation gate. Never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Accepted,
    Rejected,
    TimedOut,
}

/// A sent confirmation request awaiting a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub recipient: String,
    /// Start of the reply eligibility window (send completion time)
    pub sent_at: DateTime<Utc>,
    pub subject_context: String,
}
