use async_trait::async_trait;

use super::NotificationDispatcher;

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct ConsoleDispatcher;

#[async_trait]
impl NotificationDispatcher for ConsoleDispatcher {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to, subject, body, "notification (console delivery)");
        Ok(())
    }
}
