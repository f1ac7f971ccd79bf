//! Gemini `generateContent` oracle.
//!
//! Classification and extraction prompts ask for strict JSON. Anything that
//! does not parse cleanly is treated as "no intent" / "no slots" rather than
//! an error, so the dialogue falls through to its generic path.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{IntentClass, NluOracle};
use crate::error::SlotdeskError;
use crate::google_api::{send_with_retry, RetryPolicy};
use crate::slots;
use crate::types::{Intent, OracleConfig, SlotMap, SlotName};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .map(|p| p.text.trim())
            .filter(|t| !t.is_empty())
    }
}

// ============================================================================
// Oracle
// ============================================================================

pub struct GeminiOracle {
    client: reqwest::Client,
    api_key: String,
    model: String,
    policy: RetryPolicy,
}

impl GeminiOracle {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            policy: RetryPolicy::default(),
        }
    }

    /// Build from config, falling back to `GEMINI_API_KEY` for the key.
    pub fn from_config(config: &OracleConfig) -> Result<Self, SlotdeskError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                SlotdeskError::Configuration(
                    "No Gemini API key (set oracle.apiKey or GEMINI_API_KEY)".to_string(),
                )
            })?;
        Ok(Self::new(api_key, config.model.clone()))
    }

    async fn generate(&self, prompt: &str, json_output: bool) -> Result<String, SlotdeskError> {
        let url = format!("{}/{}:generateContent", GEMINI_ENDPOINT, self.model);
        let temperature = if json_output { 0.0 } else { 1.0 };
        let mut generation_config = json!({
            "temperature": temperature,
            "topP": 0.95,
            "topK": 40,
            "maxOutputTokens": 8192,
        });
        if json_output {
            generation_config["responseMimeType"] = json!("application/json");
        }
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });

        let resp = send_with_retry(
            self.client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body),
            &self.policy,
        )
        .await
        .map_err(|e| SlotdeskError::Oracle(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SlotdeskError::Oracle(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| SlotdeskError::Oracle(e.to_string()))?;
        parsed
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| SlotdeskError::Oracle("Empty Gemini response".to_string()))
    }
}

#[async_trait]
impl NluOracle for GeminiOracle {
    async fn classify_intent(
        &self,
        text: &str,
        context: &[String],
    ) -> Result<IntentClass, SlotdeskError> {
        let prompt = with_context(classification_prompt(text), context);
        let raw = self.generate(&prompt, true).await?;
        let class = parse_classification(&raw);
        log::debug!("Gemini classified {:?} as {:?}", text, class);
        Ok(class)
    }

    async fn extract_slots(
        &self,
        text: &str,
        intent: Intent,
        context: &[String],
    ) -> Result<SlotMap, SlotdeskError> {
        if slots::schema(intent).is_empty() {
            return Ok(SlotMap::new());
        }
        let prompt = with_context(extraction_prompt(text, intent), context);
        let raw = self.generate(&prompt, true).await?;
        Ok(parse_extraction(&raw))
    }

    async fn respond(&self, text: &str, context: &[String]) -> Result<String, SlotdeskError> {
        let prompt = with_context(format!("Reply to the user's message: \"{}\"", text), context);
        self.generate(&prompt, false).await
    }

    async fn correct_text(&self, text: &str) -> Result<String, SlotdeskError> {
        self.generate(&correction_prompt(text), false).await
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// Prefix a prompt with the user's earlier turns, if any.
fn with_context(prompt: String, context: &[String]) -> String {
    if context.is_empty() {
        return prompt;
    }
    let earlier = context
        .iter()
        .map(|turn| format!("- \"{}\"", turn))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Earlier messages from the user in this conversation:\n{}\n\n{}",
        earlier, prompt
    )
}

fn classification_prompt(text: &str) -> String {
    format!(
        "Classify the user's calendar request. Reply only with JSON of the form \
         {{\"intent\": \"schedule\" | \"update\" | \"delete\" | \"none\"}}.\n\
         - schedule: arranging a new event or meeting\n\
         - update: rescheduling or moving an existing event\n\
         - delete: cancelling or removing an existing event\n\
         - none: anything else\n\
         Message: \"{}\"",
        text
    )
}

fn slot_description(slot: SlotName) -> &'static str {
    match slot {
        SlotName::ParticipantAddress => "email address of the person to invite",
        SlotName::EventName => "name or title of the event; omit if the message is generic",
        SlotName::EventDate => "date of the event, e.g. \"tomorrow\" or \"April 8\"",
        SlotName::EventTime => "start and end time, formatted like \"3pm to 4pm\"",
        SlotName::NewDate => "the new date for the event",
        SlotName::NewTime => "the new start and end time, formatted like \"3pm to 4pm\"",
    }
}

fn extraction_prompt(text: &str, intent: Intent) -> String {
    let fields = slots::required_slots(intent)
        .into_iter()
        .map(|slot| format!("- \"{}\": {}", slot.key(), slot_description(slot)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Extract the details of a {} calendar request. Correct obvious spelling \
         mistakes. Reply only with a JSON object using these keys, omitting any \
         key the message does not state:\n{}\nMessage: \"{}\"",
        intent, fields, text
    )
}

fn correction_prompt(text: &str) -> String {
    format!(
        "Correct spelling and grammar mistakes in the user's message without changing \
         its meaning. Always write time ranges in the form \"10am to 11am\". Return \
         only the corrected message, or the same message if it has no errors.\n\
         Message: \"{}\"",
        text
    )
}

// ============================================================================
// Response parsing
// ============================================================================

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_classification(raw: &str) -> IntentClass {
    let body = strip_code_fence(raw);
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("intent")
            .and_then(|v| v.as_str())
            .map(IntentClass::from_label)
            .unwrap_or(IntentClass::None),
        Err(_) => IntentClass::from_label(body.trim_matches('"')),
    }
}

fn parse_extraction(raw: &str) -> SlotMap {
    let mut slots = SlotMap::new();
    let Ok(serde_json::Value::Object(map)) =
        serde_json::from_str::<serde_json::Value>(strip_code_fence(raw))
    else {
        log::debug!("Gemini extraction was not a JSON object: {}", raw);
        return slots;
    };
    for (key, value) in map {
        let Some(slot) = SlotName::from_key(&key) else {
            continue;
        };
        let Some(text) = value.as_str().map(str::trim) else {
            continue;
        };
        if text.is_empty() || matches!(text.to_lowercase().as_str(), "null" | "none" | "no") {
            continue;
        }
        slots.insert(slot, text.to_string());
    }
    slots
}
