//! Dialogue state machine
//!
//! One call advances one conversation by one turn. State is passed in and
//! handed back; nothing here holds conversation state between calls.
//!
//! Idle -> Collecting (intent set, slots incomplete) -> Ready. The caller
//! executes a Ready command and resets the state on any terminal outcome.

use crate::executor::Command;
use crate::oracle::NluOracle;
use crate::slots::{self, SlotContext};
use crate::types::{ConversationState, TurnReply, TurnState};

/// Earlier turns passed to the oracle alongside the current one.
const ORACLE_CONTEXT_TURNS: usize = 10;

const IDLE_HINT: &str =
    "I can schedule, reschedule or cancel meetings. What would you like to do?";

/// Result of one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Reply to send back; the conversation continues.
    Reply(TurnReply),
    /// Every required slot is filled.
    Ready(Command),
}

pub async fn advance(
    mut state: ConversationState,
    text: &str,
    oracle: &dyn NluOracle,
    ctx: &SlotContext,
) -> (ConversationState, Step) {
    let text = text.trim();
    let context = state.recent_history(ORACLE_CONTEXT_TURNS).to_vec();
    state.push_history(text);

    if let Some(waiting) = state.waiting_for {
        match slots::slot_spec(state.intent, waiting) {
            Some(spec) => match spec.validate(text, ctx) {
                Some(value) => {
                    log::debug!("Dialogue: accepted {} = {:?}", waiting, value);
                    state.slots.insert(waiting, value);
                    state.waiting_for = None;
                }
                None => {
                    log::info!("Dialogue: re-prompting for {}", waiting);
                    return (state, Step::Reply(TurnReply::prompt(spec.reprompt())));
                }
            },
            None => {
                log::warn!(
                    "Dialogue: waiting on {} which is not in the {} schema, clearing",
                    waiting,
                    state.intent
                );
                state.waiting_for = None;
            }
        }
    } else if state.is_idle() {
        if text.is_empty() {
            return (state, Step::Reply(TurnReply::prompt(IDLE_HINT)));
        }

        let class = match oracle.classify_intent(text, &context).await {
            Ok(class) => class,
            Err(e) => {
                log::warn!("Dialogue: intent classification failed: {}", e);
                return (state, Step::Reply(TurnReply::from_error(&e)));
            }
        };

        let Some(intent) = class.intent() else {
            let step = match oracle.respond(text, &context).await {
                Ok(reply) => Step::Reply(TurnReply::new(reply, TurnState::Chat)),
                Err(e) => {
                    log::warn!("Dialogue: generic response failed: {}", e);
                    Step::Reply(TurnReply::from_error(&e))
                }
            };
            return (state, step);
        };

        log::info!("Dialogue: detected {} intent", intent);
        state.intent = intent;
        match oracle.extract_slots(text, intent, &context).await {
            Ok(extracted) => {
                state.slots = slots::accept_extracted(intent, &extracted, ctx);
                log::debug!("Dialogue: seeded slots {:?}", state.slots);
            }
            Err(e) => log::warn!("Dialogue: slot extraction failed, starting empty: {}", e),
        }
    }

    if let Some(spec) = slots::first_missing(state.intent, &state.slots) {
        log::info!("Dialogue: prompting for {}", spec.name);
        state.waiting_for = Some(spec.name);
        return (state, Step::Reply(TurnReply::prompt(spec.prompt)));
    }

    match Command::from_slots(state.intent, &state.slots) {
        Some(command) => {
            log::info!("Dialogue: {} command ready", state.intent);
            (state, Step::Ready(command))
        }
        None => {
            // Only reachable with no intent and no schema.
            state.reset();
            (state, Step::Reply(TurnReply::prompt(IDLE_HINT)))
        }
    }
}
