use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::modules::auth::interface::{Result, SecurityEventRepository};
use crate::modules::auth::model::{EventOutcome, SecurityEvent, SecurityEventType, User};

/// Appends one SecurityEvent per state transition. The actor columns are
/// denormalized (user id and email both recorded when known) so the audit
/// trail survives user deletion.
#[derive(Clone)]
pub struct SecurityEventRecorder {
    events: Arc<dyn SecurityEventRepository>,
}

impl SecurityEventRecorder {
    pub fn new(events: Arc<dyn SecurityEventRepository>) -> Self {
        Self { events }
    }

    pub async fn record(
        &self,
        event_type: SecurityEventType,
        outcome: EventOutcome,
        user: Option<&User>,
        email: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let event = SecurityEvent {
            id: Uuid::new_v4().to_string(),
            user_id: user.map(|u| u.id.clone()),
            email: user.map(|u| u.email.clone()).or_else(|| email.map(String::from)),
            event_type,
            outcome,
            metadata,
            created_at: Utc::now(),
        };
        self.events.append(&event).await
    }

    /// For transitions after tokens are already issued: the flow must not
    /// roll back, so an append failure is logged and swallowed here.
    pub async fn record_best_effort(
        &self,
        event_type: SecurityEventType,
        outcome: EventOutcome,
        user: Option<&User>,
        email: Option<&str>,
        metadata: serde_json::Value,
    ) {
        if let Err(e) = self
            .record(event_type, outcome, user, email, metadata)
            .await
        {
            tracing::error!(?event_type, error = %e, "failed to append security event");
        }
    }
}
