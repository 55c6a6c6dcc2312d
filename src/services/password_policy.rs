use chrono::Utc;
use std::sync::Arc;

use crate::config::policy::PasswordPolicy;
use crate::modules::auth::interface::{
    AuthError, PasswordHistoryRepository, PasswordViolation, Result, UserRepository,
};
use crate::modules::auth::model::User;
use crate::services::hashing;

#[derive(Debug, Clone, Copy)]
pub struct ExpiryStatus {
    pub expired: bool,
    pub days_remaining: i64,
    pub must_change: bool,
}

/// Password strength, reuse-against-history, and age policy.
#[derive(Clone)]
pub struct PasswordPolicyEngine {
    users: Arc<dyn UserRepository>,
    history: Arc<dyn PasswordHistoryRepository>,
    policy: PasswordPolicy,
}

impl PasswordPolicyEngine {
    pub fn new(
        users: Arc<dyn UserRepository>,
        history: Arc<dyn PasswordHistoryRepository>,
        policy: PasswordPolicy,
    ) -> Self {
        Self {
            users,
            history,
            policy,
        }
    }

    /// Runs every check and collects every violation; callers report them
    /// together rather than one at a time.
    pub fn check_strength(&self, candidate: &str) -> Vec<PasswordViolation> {
        let mut violations = Vec::new();

        if candidate.chars().count() < self.policy.min_length {
            violations.push(PasswordViolation::TooShort {
                min: self.policy.min_length,
            });
        }
        if !candidate.chars().any(|c| c.is_uppercase()) {
            violations.push(PasswordViolation::MissingUppercase);
        }
        if !candidate.chars().any(|c| c.is_lowercase()) {
            violations.push(PasswordViolation::MissingLowercase);
        }
        if !candidate.chars().any(|c| c.is_ascii_digit()) {
            violations.push(PasswordViolation::MissingDigit);
        }
        if !candidate.chars().any(|c| !c.is_alphanumeric()) {
            violations.push(PasswordViolation::MissingSpecial);
        }

        violations
    }

    /// True when the candidate matches the current password or any of the
    /// last `history_depth - 1` retired hashes.
    pub async fn is_reused(&self, user: &User, candidate: &str) -> Result<bool> {
        if hashing::verify_password(candidate, &user.password_hash)
            .map_err(|e| AuthError::Internal(format!("hash verify failed: {e}")))?
        {
            return Ok(true);
        }

        let retired = self
            .history
            .recent(&user.id, self.policy.history_depth - 1)
            .await?;
        for hash in &retired {
            if hashing::verify_password(candidate, hash)
                .map_err(|e| AuthError::Internal(format!("hash verify failed: {e}")))?
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    pub async fn validate_for_change(&self, user: &User, candidate: &str) -> Result<()> {
        let violations = self.check_strength(candidate);
        if !violations.is_empty() {
            return Err(AuthError::WeakPassword(violations));
        }
        if self.is_reused(user, candidate).await? {
            return Err(AuthError::PasswordReuse);
        }
        Ok(())
    }

    /// Hashes the candidate, retires the previous hash into history
    /// (truncated to depth), stamps `password_changed_at`, and clears any
    /// forced-change flag.
    pub async fn commit(&self, user: &User, candidate: &str) -> Result<String> {
        let new_hash = hashing::hash_password(candidate)
            .map_err(|e| AuthError::Internal(format!("hashing failed: {e}")))?;

        self.history
            .push(
                &user.id,
                &user.password_hash,
                self.policy.history_depth,
            )
            .await?;
        self.users
            .update_password(&user.id, &new_hash, Utc::now())
            .await?;

        Ok(new_hash)
    }

    /// A password that was never changed counts as freshly set.
    pub fn expiry_status(&self, user: &User) -> ExpiryStatus {
        let max_age = self.policy.max_age;
        let (expired, days_remaining) = match user.password_changed_at {
            Some(changed_at) => {
                let deadline = changed_at + max_age;
                let remaining = deadline - Utc::now();
                (remaining < chrono::Duration::zero(), remaining.num_days().max(0))
            }
            None => (false, max_age.num_days()),
        };

        ExpiryStatus {
            expired,
            days_remaining,
            must_change: expired || user.force_password_change,
        }
    }
}
