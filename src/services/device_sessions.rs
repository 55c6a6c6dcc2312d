use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::policy::{DeviceLimitPolicy, DevicePolicy};
use crate::modules::auth::interface::{
    AuthError, DeviceSessionRepository, Result, TokenRepository,
};
use crate::modules::auth::model::{DeviceInfo, DeviceSession};

#[derive(Debug)]
pub struct AdmittedDevice {
    pub session: DeviceSession,
    pub newly_created: bool,
    pub evicted: Vec<DeviceSession>,
}

/// Enforces the per-user cap on concurrent device sessions. A returning
/// device refreshes its existing session; a new device either evicts the
/// oldest session or is rejected, per policy.
#[derive(Clone)]
pub struct DeviceSessionGuard {
    sessions: Arc<dyn DeviceSessionRepository>,
    tokens: Arc<dyn TokenRepository>,
    policy: DevicePolicy,
}

impl DeviceSessionGuard {
    pub fn new(
        sessions: Arc<dyn DeviceSessionRepository>,
        tokens: Arc<dyn TokenRepository>,
        policy: DevicePolicy,
    ) -> Self {
        Self {
            sessions,
            tokens,
            policy,
        }
    }

    pub async fn admit(&self, user_id: &str, info: &DeviceInfo) -> Result<AdmittedDevice> {
        let now = Utc::now();

        if let Some(device_id) = &info.device_id {
            if let Some(existing) = self.sessions.find_by_device(user_id, device_id).await? {
                self.sessions
                    .touch(
                        &existing.id,
                        info.ip_address.as_deref(),
                        info.user_agent.as_deref(),
                        now,
                    )
                    .await?;
                let session = DeviceSession {
                    ip_address: info.ip_address.clone().or(existing.ip_address),
                    user_agent: info.user_agent.clone().or(existing.user_agent),
                    last_used: now,
                    ..existing
                };
                return Ok(AdmittedDevice {
                    session,
                    newly_created: false,
                    evicted: Vec::new(),
                });
            }
        }

        let mut evicted = Vec::new();
        while self.has_reached_limit(user_id).await? {
            match self.policy.on_limit {
                DeviceLimitPolicy::Reject => return Err(AuthError::DeviceLimitExceeded),
                DeviceLimitPolicy::EvictOldest => match self.evict_oldest(user_id).await? {
                    Some(session) => evicted.push(session),
                    // A concurrent admission claimed the row; the count query
                    // on the next pass decides whether more room is needed.
                    None => break,
                },
            }
        }

        let session = DeviceSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            device_id: info
                .device_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            device_name: info.device_name.clone(),
            ip_address: info.ip_address.clone(),
            user_agent: info.user_agent.clone(),
            is_trusted: false,
            created_at: now,
            last_used: now,
        };
        self.sessions.create(&session).await?;

        Ok(AdmittedDevice {
            session,
            newly_created: true,
            evicted,
        })
    }

    /// Claims the oldest session (FIFO by creation) and blacklists its
    /// refresh tokens. The claim is atomic, so concurrent admissions evict
    /// at most one session each.
    pub async fn evict_oldest(&self, user_id: &str) -> Result<Option<DeviceSession>> {
        let Some(session) = self.sessions.remove_oldest(user_id).await? else {
            return Ok(None);
        };
        self.tokens
            .blacklist_for_device(user_id, &session.device_id)
            .await?;
        tracing::info!(user_id, device_id = %session.device_id, "evicted oldest device session");
        Ok(Some(session))
    }

    /// Explicit user-initiated revocation of one device.
    pub async fn remove(&self, user_id: &str, device_id: &str) -> Result<Option<DeviceSession>> {
        let removed = self.sessions.remove(user_id, device_id).await?;
        if removed.is_some() {
            self.tokens.blacklist_for_device(user_id, device_id).await?;
        }
        Ok(removed)
    }

    /// "Log out all other devices."
    pub async fn remove_all_except(
        &self,
        user_id: &str,
        keep_device_id: &str,
    ) -> Result<Vec<DeviceSession>> {
        let removed = self
            .sessions
            .remove_all_except(user_id, keep_device_id)
            .await?;
        for session in &removed {
            self.tokens
                .blacklist_for_device(user_id, &session.device_id)
                .await?;
        }
        Ok(removed)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<DeviceSession>> {
        self.sessions.list_for_user(user_id).await
    }

    pub async fn has_reached_limit(&self, user_id: &str) -> Result<bool> {
        Ok(self.sessions.count_for_user(user_id).await? >= self.policy.cap)
    }
}
