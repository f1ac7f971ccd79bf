//! Turn handling across conversations.
//!
//! `Assistant` wires the dialogue state machine to the executor and the
//! confirmation gate. Each conversation is locked for the duration of its
//! turn; other conversations proceed independently.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::calendar::CalendarService;
use crate::dialogue::{self, Step};
use crate::executor::{
    failure_reply, not_found_reply, Command, CommandExecutor, Resolution, ResolvedCommand,
};
use crate::gate::{ConfirmationGate, GatePolicy, PendingGate};
use crate::mail::MailService;
use crate::notification::Notification;
use crate::oracle::NluOracle;
use crate::slots::SlotContext;
use crate::state::{GateStore, SessionStore};
use crate::types::{Config, ConversationState, GateMode, TurnReply, TurnState};

pub struct Assistant {
    oracle: Arc<dyn NluOracle>,
    executor: CommandExecutor,
    gate: ConfirmationGate,
    sessions: SessionStore,
    gates: GateStore,
    mode: GateMode,
    correct_spelling: bool,
    today: Option<NaiveDate>,
}

impl Assistant {
    pub fn new(
        config: &Config,
        oracle: Arc<dyn NluOracle>,
        calendar: Arc<dyn CalendarService>,
        mail: Arc<dyn MailService>,
        sessions: SessionStore,
        gates: GateStore,
    ) -> Self {
        Self {
            oracle,
            executor: CommandExecutor::new(calendar, mail.clone()),
            gate: ConfirmationGate::new(mail, GatePolicy::from(&config.gate)),
            sessions,
            gates,
            mode: config.gate.mode,
            correct_spelling: config.oracle.correct_spelling,
            today: None,
        }
    }

    /// Pin the date relative slot values resolve against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn context(&self) -> SlotContext {
        self.today.map(SlotContext::new).unwrap_or_else(SlotContext::current)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn pending_gates(&self) -> &GateStore {
        &self.gates
    }

    /// Process one turn of one conversation.
    pub async fn handle_turn(&self, conversation_id: &str, text: &str) -> TurnReply {
        let handle = self.sessions.handle(conversation_id);
        let mut current = handle.lock().await;

        // An answer to a pending prompt is validated verbatim.
        let text = if current.waiting_for.is_some() {
            text.trim().to_string()
        } else {
            self.preprocess(text).await
        };
        let ctx = self.context();
        let state: ConversationState = current.clone();
        let (mut next, step) = dialogue::advance(state, &text, self.oracle.as_ref(), &ctx).await;

        let reply = match step {
            Step::Reply(reply) => reply,
            Step::Ready(command) => {
                let reply = self.run_command(conversation_id, &command, &ctx).await;
                next.reset();
                reply
            }
        };

        *current = next;
        self.sessions.commit(conversation_id, &current);
        reply
    }

    async fn preprocess(&self, text: &str) -> String {
        let trimmed = text.trim();
        if !self.correct_spelling || trimmed.is_empty() {
            return trimmed.to_string();
        }
        match self.oracle.correct_text(trimmed).await {
            Ok(corrected) if !corrected.trim().is_empty() => {
                let corrected = corrected.trim().trim_matches('"').to_string();
                if corrected != trimmed {
                    log::debug!("Assistant: corrected {:?} to {:?}", trimmed, corrected);
                }
                corrected
            }
            Ok(_) => trimmed.to_string(),
            Err(e) => {
                log::warn!("Assistant: text correction failed, using raw text: {}", e);
                trimmed.to_string()
            }
        }
    }

    async fn run_command(
        &self,
        conversation_id: &str,
        command: &Command,
        ctx: &SlotContext,
    ) -> TurnReply {
        let resolved = match self.executor.resolve(command, ctx).await {
            Ok(Resolution::Ready(resolved)) => resolved,
            Ok(Resolution::NotFound) => return not_found_reply(command.intent()),
            Err(e) => return failure_reply(command.intent(), &e),
        };

        let Some(plan) = resolved.confirmation() else {
            return match self.executor.execute(&resolved).await {
                Ok(reply) => reply,
                Err(e) => failure_reply(resolved.intent(), &e),
            };
        };

        match self.mode {
            GateMode::Inline => match self.gate.run(&plan).await {
                Ok(outcome) => self.executor.finish(&resolved, outcome).await,
                Err(e) => {
                    log::warn!("Assistant: confirmation request to {} failed: {}", plan.recipient, e);
                    TurnReply::from_error(&e)
                }
            },
            GateMode::Background => {
                let request = match self.gate.open(&plan).await {
                    Ok(request) => request,
                    Err(e) => {
                        log::warn!(
                            "Assistant: confirmation request to {} failed: {}",
                            plan.recipient,
                            e
                        );
                        return TurnReply::from_error(&e);
                    }
                };
                let reply = awaiting_reply(&resolved, &plan.recipient);
                self.gates
                    .push(PendingGate::new(conversation_id, resolved, request));
                reply
            }
        }
    }

    /// Advance every pending gate by one poll attempt, committing or
    /// declining the ones that resolved.
    pub async fn drive_pending_gates(&self) -> Vec<Notification> {
        let mut notifications = Vec::new();
        for mut pending in self.gates.list() {
            match self.gate.poll_pending(&mut pending).await {
                None => self.gates.update(&pending),
                Some(outcome) => {
                    if self.gates.remove(&pending.id).is_none() {
                        continue;
                    }
                    let reply = self.executor.finish(&pending.command, outcome).await;
                    notifications.push(Notification::new(pending.conversation_id, reply));
                }
            }
        }
        notifications
    }
}

fn awaiting_reply(resolved: &ResolvedCommand, recipient: &str) -> TurnReply {
    let what = match resolved {
        ResolvedCommand::Reschedule { .. } => "Reschedule request",
        _ => "Invitation email",
    };
    TurnReply::new(
        format!(
            "{} sent to {}. I'll let you know once they reply.",
            what, recipient
        ),
        TurnState::AwaitingConfirmation,
    )
}
