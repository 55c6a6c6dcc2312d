use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::policy::LockoutPolicy;
use crate::modules::auth::interface::{AuthError, Result, UserRepository};
use crate::modules::auth::model::User;

#[derive(Debug, Clone, Copy)]
pub struct LockoutStatus {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    pub fn locked_now(&self) -> bool {
        self.locked_until.is_some()
    }
}

/// Tracks consecutive failed logins per account and enforces temporary
/// lockout. Counter changes go through storage-side atomic updates; a
/// persistence failure here aborts the whole login attempt.
#[derive(Clone)]
pub struct LockoutGuard {
    users: Arc<dyn UserRepository>,
    policy: LockoutPolicy,
}

impl LockoutGuard {
    pub fn new(users: Arc<dyn UserRepository>, policy: LockoutPolicy) -> Self {
        Self { users, policy }
    }

    /// Locked iff the admin flag is set or `lockout_until` is in the future.
    pub fn check(&self, user: &User) -> Result<()> {
        if user.is_locked {
            return Err(AuthError::AccountLocked { until: None });
        }
        if let Some(until) = user.lockout_until {
            if until > Utc::now() {
                return Err(AuthError::AccountLocked { until: Some(until) });
            }
        }
        Ok(())
    }

    /// Atomic increment; trips the lockout when the new count reaches the
    /// threshold. Returns the post-increment state.
    pub async fn record_failure(&self, user: &User) -> Result<LockoutStatus> {
        let attempts = self.users.record_login_failure(&user.id).await?;

        if attempts >= self.policy.threshold {
            let until = Utc::now() + self.policy.duration;
            self.users.set_lockout(&user.id, Some(until)).await?;
            tracing::warn!(user_id = %user.id, attempts, "account locked out");
            return Ok(LockoutStatus {
                attempts,
                locked_until: Some(until),
            });
        }

        Ok(LockoutStatus {
            attempts,
            locked_until: None,
        })
    }

    /// Resets the counter and clears the lockout. Only called from inside a
    /// successful login flow, never in isolation.
    pub async fn record_success(&self, user: &User) -> Result<()> {
        self.users.clear_login_failures(&user.id).await
    }
}
