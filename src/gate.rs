//! Confirmation gate
//!
//! Sends a confirmation request to a counterparty, then polls their replies.
//! Only messages from the counterparty timestamped strictly after the send
//! completed are eligible, and the first eligible message decides: an
//! acceptance keyword anywhere in its de-quoted text accepts, anything else
//! rejects. No eligible message within
//! the attempt budget times out.
//!
//! A gate can run to completion inside one turn (`await_outcome`) or be
//! persisted as a `PendingGate` and advanced one attempt per scheduler tick
//! (`poll_pending`).

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SlotdeskError;
use crate::executor::{ConfirmationPlan, ResolvedCommand};
use crate::mail::{InboundMessage, MailService};
use crate::types::{ConfirmationRequest, GateConfig, GateOutcome};

// =============================================================================
// Policy
// =============================================================================

#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub max_attempts: u32,
    pub poll_interval: Duration,
    keywords: Vec<String>,
}

impl GatePolicy {
    pub fn new(max_attempts: u32, poll_interval: Duration, keywords: &[String]) -> Self {
        Self {
            max_attempts,
            poll_interval,
            keywords: acceptance_keywords(keywords),
        }
    }

    /// Whether de-quoted reply text contains an acceptance keyword anywhere,
    /// ignoring case and runs of whitespace.
    pub fn is_acceptance(&self, reply: &str) -> bool {
        let text = fold_whitespace(&strip_quoted_reply(reply).to_lowercase());
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    pub fn decide(&self, message: &InboundMessage) -> GateOutcome {
        if self.is_acceptance(&message.body_snippet) {
            GateOutcome::Accepted
        } else {
            GateOutcome::Rejected
        }
    }
}

impl From<&GateConfig> for GatePolicy {
    fn from(config: &GateConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.poll_interval_secs),
            &config.acceptance_keywords,
        )
    }
}

fn fold_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn acceptance_keywords(keywords: &[String]) -> Vec<String> {
    let folded: Vec<String> = keywords
        .iter()
        .map(|k| fold_whitespace(&k.to_lowercase()))
        .filter(|k| !k.is_empty())
        .collect();
    if folded.is_empty() {
        log::warn!("Gate: no acceptance keywords configured, every reply will reject");
    }
    folded
}

fn reply_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\s*(?:\bon\s.+?wrote:|-{2,}\s*original message\s*-{2,}).*$").unwrap()
    })
}

/// Drop the quoted trailer of a reply ("On Tue, Alice wrote: ..." and `>` lines).
pub fn strip_quoted_reply(text: &str) -> String {
    let head = reply_marker_regex().replace(text, "");
    head.lines()
        .filter(|line| !line.trim_start().starts_with('>'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// =============================================================================
// Pending gates
// =============================================================================

/// A gate handed off to the scheduler, persisted across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingGate {
    pub id: String,
    pub conversation_id: String,
    pub command: ResolvedCommand,
    pub request: ConfirmationRequest,
    pub attempts_made: u32,
    pub created_at: DateTime<Utc>,
}

impl PendingGate {
    pub fn new(conversation_id: &str, command: ResolvedCommand, request: ConfirmationRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            command,
            request,
            attempts_made: 0,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Gate
// =============================================================================

pub struct ConfirmationGate {
    mail: Arc<dyn MailService>,
    policy: GatePolicy,
}

impl ConfirmationGate {
    pub fn new(mail: Arc<dyn MailService>, policy: GatePolicy) -> Self {
        Self { mail, policy }
    }

    /// Send the request. The eligibility window starts when the send completes;
    /// a send failure aborts the command before any polling.
    pub async fn open(&self, plan: &ConfirmationPlan) -> Result<ConfirmationRequest, SlotdeskError> {
        self.mail.send(&plan.recipient, &plan.message).await?;
        let sent_at = Utc::now();
        log::info!(
            "Gate: confirmation request sent to {} ({})",
            plan.recipient,
            plan.subject_context
        );
        Ok(ConfirmationRequest {
            recipient: plan.recipient.clone(),
            sent_at,
            subject_context: plan.subject_context.clone(),
        })
    }

    /// One poll attempt. A transport failure counts as "nothing yet".
    pub async fn poll_once(&self, request: &ConfirmationRequest) -> Option<GateOutcome> {
        let messages = match self.mail.list_since(&request.recipient, request.sent_at).await {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("Gate poller: listing replies from {} failed: {}", request.recipient, e);
                return None;
            }
        };
        let first = messages
            .iter()
            .filter(|m| m.timestamp > request.sent_at)
            .min_by_key(|m| m.timestamp)?;
        log::debug!("Gate poller: deciding on reply {:?}", first.body_snippet);
        Some(self.policy.decide(first))
    }

    /// Poll until the first eligible reply or the attempt budget runs out.
    pub async fn await_outcome(&self, request: &ConfirmationRequest) -> GateOutcome {
        for attempt in 1..=self.policy.max_attempts {
            log::debug!(
                "Gate poller: attempt {}/{} for {}",
                attempt,
                self.policy.max_attempts,
                request.recipient
            );
            if let Some(outcome) = self.poll_once(request).await {
                log::info!("Gate: {} resolved {:?} on attempt {}", request.recipient, outcome, attempt);
                return outcome;
            }
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.poll_interval).await;
            }
        }
        log::info!(
            "Gate: no reply from {} after {} attempts",
            request.recipient,
            self.policy.max_attempts
        );
        GateOutcome::TimedOut
    }

    /// Open and wait, holding the caller for the whole gate.
    pub async fn run(&self, plan: &ConfirmationPlan) -> Result<GateOutcome, SlotdeskError> {
        let request = self.open(plan).await?;
        Ok(self.await_outcome(&request).await)
    }

    /// Advance a persisted gate by one attempt. `None` means still pending.
    pub async fn poll_pending(&self, gate: &mut PendingGate) -> Option<GateOutcome> {
        if gate.attempts_made >= self.policy.max_attempts {
            return Some(GateOutcome::TimedOut);
        }
        gate.attempts_made += 1;
        log::debug!(
            "Gate poller: pending {} attempt {}/{}",
            gate.id,
            gate.attempts_made,
            self.policy.max_attempts
        );
        if let Some(outcome) = self.poll_once(&gate.request).await {
            return Some(outcome);
        }
        (gate.attempts_made >= self.policy.max_attempts).then_some(GateOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::OutgoingMessage;
    use crate::testing::FakeMail;
    use chrono::Duration as ChronoDuration;

    fn policy(max_attempts: u32) -> GatePolicy {
        GatePolicy::from(&GateConfig {
            max_attempts,
            ..Default::default()
        })
    }

    fn request(sent_at: DateTime<Utc>) -> ConfirmationRequest {
        ConfirmationRequest {
            recipient: "bob@example.com".to_string(),
            sent_at,
            subject_context: "Invitation to 'Demo'".to_string(),
        }
    }

    fn plan() -> ConfirmationPlan {
        ConfirmationPlan {
            recipient: "bob@example.com".to_string(),
            message: OutgoingMessage {
                subject: "Meeting Invitation - Accept to Proceed".to_string(),
                body: "Reply 'Yes'".to_string(),
            },
            subject_context: "Invitation to 'Demo'".to_string(),
        }
    }

    #[test]
    fn test_strip_quoted_reply() {
        assert_eq!(
            strip_quoted_reply("No thanks. On Tue, Apr 14, 2026 Alice <a@b.com> wrote: please reply yes"),
            "No thanks."
        );
        assert_eq!(strip_quoted_reply("Sounds good\n> reply yes to accept"), "Sounds good");
        assert_eq!(strip_quoted_reply("  Yes  "), "Yes");
    }

    #[test]
    fn test_acceptance_is_keyword_containment() {
        let p = policy(1);
        assert!(p.is_acceptance("Yes, works for me"));
        assert!(p.is_acceptance("ACCEPTED"));
        assert!(p.is_acceptance("ok, I  accept"));
        assert!(p.is_acceptance("yess, works"));
        assert!(p.is_acceptance("yesterday works"));
        assert!(!p.is_acceptance("no thanks"));
        assert!(!p.is_acceptance("Cannot make it. On Mon, Al wrote: reply yes"));
        assert!(!p.is_acceptance("Busy\n> Reply yes to accept"));
    }

    #[test]
    fn test_empty_keywords_never_accept() {
        let p = GatePolicy::new(1, Duration::from_secs(1), &[]);
        assert!(!p.is_acceptance("yes"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_is_ignored() {
        let mail = Arc::new(FakeMail::default());
        let sent_at = Utc::now();
        mail.deliver(sent_at - ChronoDuration::minutes(5), "yes");
        mail.deliver(sent_at + ChronoDuration::seconds(30), "Sorry, I can't make it");

        let gate = ConfirmationGate::new(mail.clone(), policy(5));
        assert_eq!(gate.await_outcome(&request(sent_at)).await, GateOutcome::Rejected);
        assert!(mail.list_senders().iter().all(|s| s == "bob@example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_yes_does_not_hide_later_acceptance() {
        let mail = Arc::new(FakeMail::default());
        let sent_at = Utc::now();
        mail.deliver(sent_at - ChronoDuration::hours(2), "yes");
        mail.deliver(sent_at + ChronoDuration::seconds(40), "yess, works");

        let gate = ConfirmationGate::new(mail.clone(), policy(5));
        assert_eq!(gate.await_outcome(&request(sent_at)).await, GateOutcome::Accepted);
        assert_eq!(mail.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replies_from_other_senders_are_ignored() {
        let mail = Arc::new(FakeMail::default());
        let sent_at = Utc::now();
        mail.deliver_from("eve@example.com", sent_at + ChronoDuration::seconds(5), "yes");
        mail.deliver_from("bob@example.com", sent_at + ChronoDuration::seconds(60), "no");

        let gate = ConfirmationGate::new(mail.clone(), policy(5));
        assert_eq!(gate.await_outcome(&request(sent_at)).await, GateOutcome::Rejected);
        assert_eq!(mail.list_senders(), vec!["bob@example.com".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_eligible_reply_wins_even_out_of_order() {
        let mail = Arc::new(FakeMail::default());
        let sent_at = Utc::now();
        mail.deliver(sent_at + ChronoDuration::seconds(90), "no");
        mail.deliver(sent_at + ChronoDuration::seconds(10), "Yes!");

        let gate = ConfirmationGate::new(mail.clone(), policy(5));
        assert_eq!(gate.await_outcome(&request(sent_at)).await, GateOutcome::Accepted);
        assert_eq!(mail.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_arriving_later_is_picked_up() {
        let mail = Arc::new(FakeMail::default());
        let sent_at = Utc::now();
        mail.deliver_on_call(3, sent_at + ChronoDuration::seconds(20), "I accept");

        let gate = ConfirmationGate::new(mail.clone(), policy(10));
        assert_eq!(gate.await_outcome(&request(sent_at)).await, GateOutcome::Accepted);
        assert_eq!(mail.list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_budget() {
        let mail = Arc::new(FakeMail::default());
        let gate = ConfirmationGate::new(mail.clone(), policy(300));
        let start = tokio::time::Instant::now();
        assert_eq!(gate.await_outcome(&request(Utc::now())).await, GateOutcome::TimedOut);
        assert_eq!(mail.list_calls(), 300);
        assert!(start.elapsed() >= Duration::from_secs(299 * 6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_list_failure_keeps_polling() {
        let mail = Arc::new(FakeMail::default());
        let sent_at = Utc::now();
        mail.fail_list_calls(&[1, 2]);
        mail.deliver(sent_at + ChronoDuration::seconds(5), "yes");

        let gate = ConfirmationGate::new(mail.clone(), policy(5));
        assert_eq!(gate.await_outcome(&request(sent_at)).await, GateOutcome::Accepted);
        assert_eq!(mail.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_send_failure_aborts_before_polling() {
        let mail = Arc::new(FakeMail::default());
        mail.fail_sends_to("bob@example.com");
        let gate = ConfirmationGate::new(mail.clone(), policy(5));

        let err = gate.run(&plan()).await.unwrap_err();
        assert!(matches!(err, SlotdeskError::Transport(_)));
        assert_eq!(mail.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_open_records_send_completion_time() {
        let mail = Arc::new(FakeMail::default());
        let gate = ConfirmationGate::new(mail.clone(), policy(5));
        let before = Utc::now();
        let req = gate.open(&plan()).await.unwrap();
        assert!(req.sent_at >= before);
        assert_eq!(req.recipient, "bob@example.com");
        assert_eq!(mail.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_pending_counts_attempts_and_times_out() {
        let mail = Arc::new(FakeMail::default());
        let gate = ConfirmationGate::new(mail.clone(), policy(2));
        let mut pending = PendingGate::new(
            "conv-1",
            ResolvedCommand::Delete {
                event_id: "e".to_string(),
                name: "x".to_string(),
            },
            request(Utc::now()),
        );

        assert_eq!(gate.poll_pending(&mut pending).await, None);
        assert_eq!(pending.attempts_made, 1);
        assert_eq!(gate.poll_pending(&mut pending).await, Some(GateOutcome::TimedOut));
        assert_eq!(pending.attempts_made, 2);
    }

    #[test]
    fn test_pending_gate_serialization() {
        let pending = PendingGate::new(
            "conv-1",
            ResolvedCommand::Delete {
                event_id: "e".to_string(),
                name: "x".to_string(),
            },
            request(Utc::now()),
        );
        let json = serde_json::to_string(&pending).unwrap();
        assert!(json.contains("\"conversationId\":\"conv-1\""));
        let parsed: PendingGate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pending);
    }
}
