//! Command execution
//!
//! A completed `(intent, slots)` pair becomes a typed `Command`, is resolved
//! against the calendar, and is committed once its gate (if any) accepts:
//! - Schedule: gated on the participant, then create the event
//! - Update: look up by name, gated on the first attendee, then patch the window
//! - Delete: look up by name, delete, then notify prior attendees

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarService, EventPatch, NewEvent};
use crate::error::SlotdeskError;
use crate::mail::{self, MailService, OutgoingMessage};
use crate::slots::{resolve_window, SlotContext};
use crate::types::{GateOutcome, Intent, SlotMap, SlotName, TurnReply, TurnState};

/// A completed command, built from a full slot map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Schedule {
        participant: String,
        name: String,
        date: String,
        time: String,
    },
    Update {
        name: String,
        new_date: String,
        new_time: String,
    },
    Delete {
        name: String,
    },
}

impl Command {
    /// `None` until every required slot of the intent is present.
    pub fn from_slots(intent: Intent, slots: &SlotMap) -> Option<Command> {
        let get = |name: SlotName| slots.get(&name).cloned();
        match intent {
            Intent::Schedule => Some(Command::Schedule {
                participant: get(SlotName::ParticipantAddress)?,
                name: get(SlotName::EventName)?,
                date: get(SlotName::EventDate)?,
                time: get(SlotName::EventTime)?,
            }),
            Intent::Update => Some(Command::Update {
                name: get(SlotName::EventName)?,
                new_date: get(SlotName::NewDate)?,
                new_time: get(SlotName::NewTime)?,
            }),
            Intent::Delete => Some(Command::Delete {
                name: get(SlotName::EventName)?,
            }),
            Intent::None => None,
        }
    }

    pub fn intent(&self) -> Intent {
        match self {
            Command::Schedule { .. } => Intent::Schedule,
            Command::Update { .. } => Intent::Update,
            Command::Delete { .. } => Intent::Delete,
        }
    }
}

/// A command bound to concrete calendar data, ready to gate and commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ResolvedCommand {
    Create {
        name: String,
        participant: String,
        date: String,
        time: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    Reschedule {
        event_id: String,
        name: String,
        new_date: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
        /// First attendee of the existing event; `None` means no one to ask
        recipient: Option<String>,
    },
    Delete {
        event_id: String,
        name: String,
    },
}

/// What the confirmation gate needs to open a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPlan {
    pub recipient: String,
    pub message: OutgoingMessage,
    pub subject_context: String,
}

impl ResolvedCommand {
    pub fn intent(&self) -> Intent {
        match self {
            ResolvedCommand::Create { .. } => Intent::Schedule,
            ResolvedCommand::Reschedule { .. } => Intent::Update,
            ResolvedCommand::Delete { .. } => Intent::Delete,
        }
    }

    /// Confirmation request for gated commands. Delete is never gated.
    pub fn confirmation(&self) -> Option<ConfirmationPlan> {
        match self {
            ResolvedCommand::Create {
                name,
                participant,
                date,
                time,
                ..
            } => Some(ConfirmationPlan {
                recipient: participant.clone(),
                message: mail::schedule_invitation(date, time),
                subject_context: format!("Invitation to '{}' on {} at {}", name, date, time),
            }),
            ResolvedCommand::Reschedule {
                name,
                start,
                end,
                recipient: Some(recipient),
                ..
            } => Some(ConfirmationPlan {
                recipient: recipient.clone(),
                message: mail::reschedule_request(name, *start, *end),
                subject_context: format!("Reschedule of '{}' to {}", name, start),
            }),
            ResolvedCommand::Reschedule { recipient: None, .. } | ResolvedCommand::Delete { .. } => {
                None
            }
        }
    }
}

/// Outcome of binding a command to the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ready(ResolvedCommand),
    NotFound,
}

pub fn not_found_reply(intent: Intent) -> TurnReply {
    let text = match intent {
        Intent::Update => "Event to update not found.",
        _ => "Event not found.",
    };
    TurnReply::new(text, TurnState::NotFound)
}

/// Reply for a failed resolve or commit. An event that disappeared between
/// lookup and commit reads as not found.
pub fn failure_reply(intent: Intent, err: &SlotdeskError) -> TurnReply {
    match err {
        SlotdeskError::NotFound(_) => not_found_reply(intent),
        other => TurnReply::from_error(other),
    }
}

fn declined_reply(resolved: &ResolvedCommand, outcome: GateOutcome) -> TurnReply {
    let text = match (resolved, outcome) {
        (ResolvedCommand::Create { .. }, GateOutcome::TimedOut) => {
            "No response received in time; the event was not scheduled."
        }
        (ResolvedCommand::Create { .. }, _) => "The attendee has rejected the event.",
        _ => "Reschedule rejected or no response.",
    };
    TurnReply::new(text, TurnState::Rejected)
}

/// Executes resolved commands against the injected calendar and mailbox.
pub struct CommandExecutor {
    calendar: Arc<dyn CalendarService>,
    mail: Arc<dyn MailService>,
}

impl CommandExecutor {
    pub fn new(calendar: Arc<dyn CalendarService>, mail: Arc<dyn MailService>) -> Self {
        Self { calendar, mail }
    }

    /// Bind a command to concrete times and, for update/delete, an existing event.
    pub async fn resolve(
        &self,
        command: &Command,
        ctx: &SlotContext,
    ) -> Result<Resolution, SlotdeskError> {
        match command {
            Command::Schedule {
                participant,
                name,
                date,
                time,
            } => {
                let (start, end) = window(SlotName::EventTime, date, time, ctx)?;
                Ok(Resolution::Ready(ResolvedCommand::Create {
                    name: name.clone(),
                    participant: participant.clone(),
                    date: date.clone(),
                    time: time.clone(),
                    start,
                    end,
                }))
            }
            Command::Update {
                name,
                new_date,
                new_time,
            } => {
                let (start, end) = window(SlotName::NewTime, new_date, new_time, ctx)?;
                let Some(event) = self.calendar.find_by_name(name).await? else {
                    log::info!("Executor: no upcoming event named '{}' to update", name);
                    return Ok(Resolution::NotFound);
                };
                Ok(Resolution::Ready(ResolvedCommand::Reschedule {
                    event_id: event.id,
                    name: name.clone(),
                    new_date: new_date.clone(),
                    start,
                    end,
                    recipient: event.attendees.into_iter().next(),
                }))
            }
            Command::Delete { name } => {
                let Some(event) = self.calendar.find_by_name(name).await? else {
                    log::info!("Executor: no upcoming event named '{}' to delete", name);
                    return Ok(Resolution::NotFound);
                };
                Ok(Resolution::Ready(ResolvedCommand::Delete {
                    event_id: event.id,
                    name: name.clone(),
                }))
            }
        }
    }

    /// Commit a resolved command. Only called once its gate accepted, or
    /// directly for ungated commands.
    pub async fn execute(&self, resolved: &ResolvedCommand) -> Result<TurnReply, SlotdeskError> {
        match resolved {
            ResolvedCommand::Create {
                name,
                participant,
                start,
                end,
                ..
            } => {
                let event = NewEvent {
                    summary: name.clone(),
                    start: *start,
                    end: *end,
                    attendees: vec![participant.clone()],
                };
                let id = self.calendar.create(&event).await?;
                log::info!("Executor: scheduled '{}' as {}", name, id);
                Ok(TurnReply::new(
                    format!("Event '{}' scheduled successfully.", name),
                    TurnState::Executed,
                ))
            }
            ResolvedCommand::Reschedule {
                event_id,
                name,
                new_date,
                start,
                end,
                ..
            } => {
                let patch = EventPatch {
                    start: *start,
                    end: *end,
                };
                self.calendar.update(event_id, &patch).await?;
                log::info!("Executor: rescheduled '{}' ({})", name, event_id);
                Ok(TurnReply::new(
                    format!("Event '{}' rescheduled successfully to '{}'.", name, new_date),
                    TurnState::Executed,
                ))
            }
            ResolvedCommand::Delete { event_id, name } => {
                let attendees = self.calendar.delete(event_id).await?;
                log::info!(
                    "Executor: deleted '{}' ({}), notifying {} attendee(s)",
                    name,
                    event_id,
                    attendees.len()
                );
                let notice = mail::cancellation_notice(name);
                for attendee in &attendees {
                    if let Err(e) = self.mail.send(attendee, &notice).await {
                        log::warn!("Executor: cancellation notice to {} failed: {}", attendee, e);
                    }
                }
                Ok(TurnReply::new(
                    format!("Event '{}' deleted.", name),
                    TurnState::Executed,
                ))
            }
        }
    }

    /// Final reply for a gated command once its gate resolved.
    pub async fn finish(&self, resolved: &ResolvedCommand, outcome: GateOutcome) -> TurnReply {
        log::info!(
            "Executor: {} gate resolved {:?}",
            resolved.intent(),
            outcome
        );
        match outcome {
            GateOutcome::Accepted => match self.execute(resolved).await {
                Ok(reply) => reply,
                Err(e) => {
                    log::error!("Executor: commit after acceptance failed: {}", e);
                    failure_reply(resolved.intent(), &e)
                }
            },
            GateOutcome::Rejected | GateOutcome::TimedOut => declined_reply(resolved, outcome),
        }
    }
}

fn window(
    slot: SlotName,
    date: &str,
    time: &str,
    ctx: &SlotContext,
) -> Result<(NaiveDateTime, NaiveDateTime), SlotdeskError> {
    resolve_window(date, time, ctx).ok_or_else(|| SlotdeskError::Validation {
        slot,
        input: format!("{} {}", date, time),
    })
}
