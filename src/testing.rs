//! In-memory test doubles for the oracle, mailbox and calendar.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::calendar::{first_upcoming_match, CalendarEvent, CalendarService, EventPatch, NewEvent};
use crate::error::SlotdeskError;
use crate::mail::{InboundMessage, MailService, OutgoingMessage};
use crate::oracle::{IntentClass, NluOracle};
use crate::types::{Intent, SlotMap, SlotName};

// =============================================================================
// Oracle
// =============================================================================

/// Oracle answering from a per-text script. Unscripted text is `none`.
#[derive(Default)]
pub struct ScriptedOracle {
    intents: Mutex<HashMap<String, IntentClass>>,
    extractions: Mutex<HashMap<String, SlotMap>>,
    corrections: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    corrections_made: AtomicUsize,
    last_context: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turn(self, text: &str, class: IntentClass, slots: &[(SlotName, &str)]) -> Self {
        self.intents.lock().insert(text.to_string(), class);
        let map: SlotMap = slots.iter().map(|(k, v)| (*k, v.to_string())).collect();
        self.extractions.lock().insert(text.to_string(), map);
        self
    }

    pub fn with_correction(self, from: &str, to: &str) -> Self {
        self.corrections.lock().insert(from.to_string(), to.to_string());
        self
    }

    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    /// Number of classify/extract/respond calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `correct_text` calls made.
    pub fn corrections_made(&self) -> usize {
        self.corrections_made.load(Ordering::SeqCst)
    }

    /// Context passed with the most recent classify/extract/respond call.
    pub fn last_context(&self) -> Vec<String> {
        self.last_context.lock().clone()
    }

    fn check(&self, context: &[String]) -> Result<(), SlotdeskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock() = context.to_vec();
        if self.failing.load(Ordering::SeqCst) {
            return Err(SlotdeskError::Oracle("scripted failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NluOracle for ScriptedOracle {
    async fn classify_intent(
        &self,
        text: &str,
        context: &[String],
    ) -> Result<IntentClass, SlotdeskError> {
        self.check(context)?;
        Ok(self.intents.lock().get(text).copied().unwrap_or(IntentClass::None))
    }

    async fn extract_slots(
        &self,
        text: &str,
        _intent: Intent,
        context: &[String],
    ) -> Result<SlotMap, SlotdeskError> {
        self.check(context)?;
        Ok(self.extractions.lock().get(text).cloned().unwrap_or_default())
    }

    async fn respond(&self, text: &str, context: &[String]) -> Result<String, SlotdeskError> {
        self.check(context)?;
        Ok(format!("chat: {}", text))
    }

    async fn correct_text(&self, text: &str) -> Result<String, SlotdeskError> {
        self.corrections_made.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SlotdeskError::Oracle("scripted failure".to_string()));
        }
        Ok(self
            .corrections
            .lock()
            .get(text)
            .cloned()
            .unwrap_or_else(|| text.to_string()))
    }
}

// =============================================================================
// Mail
// =============================================================================

/// Mailbox recording sends and serving scripted replies.
///
/// Each inbound message becomes visible from a given `list_since` call on
/// (1-based), so tests can model replies that arrive mid-poll. Listing
/// behaves like a coarse day-window search: every visible message from the
/// sender comes back, newest first, whatever `since` says.
#[derive(Default)]
pub struct FakeMail {
    sent: Mutex<Vec<(String, OutgoingMessage)>>,
    inbox: Mutex<Vec<(usize, Option<String>, InboundMessage)>>,
    failing_list_calls: Mutex<HashSet<usize>>,
    failing_recipients: Mutex<HashSet<String>>,
    list_calls: AtomicUsize,
    list_senders: Mutex<Vec<String>>,
}

impl FakeMail {
    /// A reply from any sender, visible from the first poll on.
    pub fn deliver(&self, timestamp: DateTime<Utc>, body: &str) {
        self.push(1, None, timestamp, body);
    }

    pub fn deliver_on_call(&self, call: usize, timestamp: DateTime<Utc>, body: &str) {
        self.push(call, None, timestamp, body);
    }

    /// A reply only listed when polling `sender`.
    pub fn deliver_from(&self, sender: &str, timestamp: DateTime<Utc>, body: &str) {
        self.push(1, Some(sender.to_string()), timestamp, body);
    }

    fn push(&self, call: usize, sender: Option<String>, timestamp: DateTime<Utc>, body: &str) {
        self.inbox.lock().push((
            call,
            sender,
            InboundMessage {
                timestamp,
                body_snippet: body.to_string(),
            },
        ));
    }

    /// A reply an hour after now, visible from the first poll on.
    pub fn deliver_reply(&self, body: &str) {
        self.deliver(Utc::now() + Duration::hours(1), body);
    }

    pub fn fail_list_calls(&self, calls: &[usize]) {
        self.failing_list_calls.lock().extend(calls.iter().copied());
    }

    pub fn fail_sends_to(&self, recipient: &str) {
        self.failing_recipients.lock().insert(recipient.to_string());
    }

    pub fn sent(&self) -> Vec<(String, OutgoingMessage)> {
        self.sent.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Distinct senders polled, in first-polled order.
    pub fn list_senders(&self) -> Vec<String> {
        self.list_senders.lock().clone()
    }
}

#[async_trait]
impl MailService for FakeMail {
    async fn send(&self, recipient: &str, message: &OutgoingMessage) -> Result<(), SlotdeskError> {
        if self.failing_recipients.lock().contains(recipient) {
            return Err(SlotdeskError::Transport(format!("send to {} refused", recipient)));
        }
        self.sent.lock().push((recipient.to_string(), message.clone()));
        Ok(())
    }

    async fn list_since(
        &self,
        sender: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, SlotdeskError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut senders = self.list_senders.lock();
            if !senders.iter().any(|s| s == sender) {
                senders.push(sender.to_string());
            }
        }
        if self.failing_list_calls.lock().contains(&call) {
            return Err(SlotdeskError::Transport("connection reset".to_string()));
        }
        let mut messages: Vec<InboundMessage> = self
            .inbox
            .lock()
            .iter()
            .filter(|(visible_from, from, _)| {
                *visible_from <= call && from.as_deref().map_or(true, |f| f == sender)
            })
            .map(|(_, _, m)| m.clone())
            .collect();
        messages.sort_by_key(|m| std::cmp::Reverse(m.timestamp));
        Ok(messages)
    }
}

// =============================================================================
// Calendar
// =============================================================================

#[derive(Default)]
pub struct FakeCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    patches: Mutex<HashMap<String, EventPatch>>,
    failing_writes: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeCalendar {
    fn new_id(&self) -> String {
        format!("evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// An event starting tomorrow at this time, lasting an hour.
    pub fn insert_upcoming(&self, summary: &str, attendees: &[&str]) -> String {
        let start = Utc::now() + Duration::days(1);
        self.insert(summary, start, start + Duration::hours(1), attendees)
    }

    pub fn insert(
        &self,
        summary: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        attendees: &[&str],
    ) -> String {
        let id = self.new_id();
        self.events.lock().push(CalendarEvent {
            id: id.clone(),
            summary: summary.to_string(),
            start,
            end,
            attendees: attendees.iter().map(|a| a.to_string()).collect(),
        });
        id
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.lock().clone()
    }

    pub fn patch_for(&self, event_id: &str) -> Option<EventPatch> {
        self.patches.lock().get(event_id).copied()
    }

    pub fn fail_writes(&self) {
        self.failing_writes.store(true, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), SlotdeskError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(SlotdeskError::Transport("calendar unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarService for FakeCalendar {
    async fn create(&self, event: &NewEvent) -> Result<String, SlotdeskError> {
        self.check_write()?;
        let attendees: Vec<&str> = event.attendees.iter().map(String::as_str).collect();
        Ok(self.insert(
            &event.summary,
            event.start.and_utc(),
            event.end.and_utc(),
            &attendees,
        ))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CalendarEvent>, SlotdeskError> {
        let events = self.events.lock();
        Ok(first_upcoming_match(&events, name, Utc::now()).cloned())
    }

    async fn update(&self, event_id: &str, patch: &EventPatch) -> Result<(), SlotdeskError> {
        self.check_write()?;
        let mut events = self.events.lock();
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| SlotdeskError::NotFound(event_id.to_string()))?;
        event.start = patch.start.and_utc();
        event.end = patch.end.and_utc();
        self.patches.lock().insert(event_id.to_string(), *patch);
        Ok(())
    }

    async fn delete(&self, event_id: &str) -> Result<Vec<String>, SlotdeskError> {
        self.check_write()?;
        let mut events = self.events.lock();
        let index = events
            .iter()
            .position(|e| e.id == event_id)
            .ok_or_else(|| SlotdeskError::NotFound(event_id.to_string()))?;
        Ok(events.remove(index).attendees)
    }
}
