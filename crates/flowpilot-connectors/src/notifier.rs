use std::sync::Arc;

use async_trait::async_trait;
use flowpilot_core::{Notifier, Result};
use parking_lot::Mutex;

/// A send captured by [`FakeNotifier`] instead of being delivered.
#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub channel: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// `Notifier` that logs and records sends in memory rather than delivering
/// them. Email/Slack delivery is out of scope for the engine; this is the
/// production implementation the `email` handler talks to.
#[derive(Clone, Default)]
pub struct FakeNotifier {
    sent: Arc<Mutex<Vec<RecordedNotification>>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<RecordedNotification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, channel: &str, to: &[String], subject: &str, body: &str) -> Result<()> {
        tracing::info!(channel, recipients = to.len(), subject, "notification recorded, not delivered");
        self.sent.lock().push(RecordedNotification {
            channel: channel.to_string(),
            to: to.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_every_send() {
        let notifier = FakeNotifier::new();
        notifier
            .send("email", &["a@example.com".into()], "hi", "body")
            .await
            .unwrap();
        notifier
            .send("slack", &["#general".into()], "hi", "body")
            .await
            .unwrap();
        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.sent()[0].channel, "email");
    }
}
