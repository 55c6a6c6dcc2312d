use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::modules::auth::interface::{SecurityEventRepository, TokenRepository};

/// Periodic retention job: deletes token rows past expiry and security
/// events past the retention window. Failures are logged and retried on
/// the next tick, never fatal to the process.
pub struct RetentionSweeper {
    tokens: Arc<dyn TokenRepository>,
    events: Arc<dyn SecurityEventRepository>,
    event_retention: chrono::Duration,
    tick: Duration,
}

impl RetentionSweeper {
    pub fn new(
        tokens: Arc<dyn TokenRepository>,
        events: Arc<dyn SecurityEventRepository>,
        event_retention: chrono::Duration,
    ) -> Self {
        Self {
            tokens,
            events,
            event_retention,
            tick: Duration::from_secs(3600),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub async fn run(self) {
        tracing::info!("retention sweeper started");
        let mut tick = interval(self.tick);

        loop {
            tick.tick().await;

            if let Err(e) = self.sweep_once().await {
                tracing::error!("retention sweep failed: {e}");
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<(), crate::modules::auth::interface::AuthError> {
        let now = Utc::now();

        let tokens_removed = self.tokens.delete_expired(now).await?;
        let events_removed = self
            .events
            .delete_older_than(now - self.event_retention)
            .await?;

        if tokens_removed > 0 || events_removed > 0 {
            tracing::info!(tokens_removed, events_removed, "retention sweep complete");
        }
        Ok(())
    }
}
