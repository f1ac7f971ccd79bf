//! Background gate poller
//!
//! Ticks every poll interval, advancing each pending confirmation gate by
//! one attempt and publishing a notification for every gate that resolved.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::assistant::Assistant;
use crate::notification::Notification;

pub struct Scheduler {
    assistant: Arc<Assistant>,
    sender: mpsc::Sender<Notification>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        assistant: Arc<Assistant>,
        sender: mpsc::Sender<Notification>,
        interval: Duration,
    ) -> Self {
        Self {
            assistant,
            sender,
            interval,
        }
    }

    /// Run until the notification receiver is dropped.
    pub async fn run(&self) {
        log::info!("Gate poller: started, interval {:?}", self.interval);
        loop {
            tokio::time::sleep(self.interval).await;
            if !self.tick().await {
                log::info!("Gate poller: notification channel closed, stopping");
                break;
            }
        }
    }

    /// One pass over pending gates. Returns false once nobody is listening.
    pub async fn tick(&self) -> bool {
        if self.sender.is_closed() {
            return false;
        }
        if self.assistant.pending_gates().is_empty() {
            return true;
        }
        for notification in self.assistant.drive_pending_gates().await {
            log::info!(
                "Gate poller: notifying {} ({:?})",
                notification.conversation_id,
                notification.reply.state
            );
            if self.sender.send(notification).await.is_err() {
                return false;
            }
        }
        true
    }
}
