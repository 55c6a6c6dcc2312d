use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::policy::TotpPolicy;
use crate::modules::auth::interface::{
    AuthError, BackupCodeRepository, Result, TwoFactorSetup, UserRepository,
};
use crate::modules::auth::model::{BackupCode, TwoFactorState, User};
use crate::services::totp;

/// TOTP enrollment and verification. Enrollment walks
/// NotSetup -> Pending -> Enabled; disabling wipes the secret and the
/// backup-code set and lands back at NotSetup.
#[derive(Clone)]
pub struct TwoFactorEngine {
    users: Arc<dyn UserRepository>,
    backup_codes: Arc<dyn BackupCodeRepository>,
    policy: TotpPolicy,
}

impl TwoFactorEngine {
    pub fn new(
        users: Arc<dyn UserRepository>,
        backup_codes: Arc<dyn BackupCodeRepository>,
        policy: TotpPolicy,
    ) -> Self {
        Self {
            users,
            backup_codes,
            policy,
        }
    }

    /// Stores a fresh pending secret and hands back the provisioning data.
    pub async fn begin_enrollment(&self, user: &User) -> Result<TwoFactorSetup> {
        match user.two_factor_state() {
            TwoFactorState::Enabled { .. } => return Err(AuthError::TwoFactorAlreadyEnabled),
            // Re-running setup before confirmation replaces the pending secret.
            TwoFactorState::NotSetup | TwoFactorState::Pending { .. } => {}
        }

        let secret = totp::generate_secret();
        self.users
            .set_two_factor(&user.id, false, Some(&secret))
            .await?;

        let otpauth_url = totp::provisioning_uri(&secret, &user.email, &self.policy.issuer);
        Ok(TwoFactorSetup {
            secret,
            otpauth_url,
        })
    }

    /// One correct TOTP against the pending secret flips the state to
    /// Enabled and mints the backup-code set. Returns the plaintext codes;
    /// only their digests are stored.
    pub async fn confirm_enrollment(&self, user: &User, code: &str) -> Result<Vec<String>> {
        let secret = match user.two_factor_state() {
            TwoFactorState::Pending { secret } => secret,
            TwoFactorState::Enabled { .. } => return Err(AuthError::TwoFactorAlreadyEnabled),
            TwoFactorState::NotSetup => return Err(AuthError::TwoFactorNotEnabled),
        };

        if !totp::check(&secret, code)? {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        self.users
            .set_two_factor(&user.id, true, Some(&secret))
            .await?;

        self.mint_backup_codes(&user.id).await
    }

    /// Requires a valid TOTP or backup code; the account password alone can
    /// never turn 2FA off.
    pub async fn disable(&self, user: &User, code: &str) -> Result<()> {
        if !matches!(user.two_factor_state(), TwoFactorState::Enabled { .. }) {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        if !self.verify(user, code).await? {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        self.users.set_two_factor(&user.id, false, None).await?;
        self.backup_codes.delete_for_user(&user.id).await?;
        Ok(())
    }

    /// TOTP first, backup-code fallback. Backup consumption is
    /// consume-once at the storage layer, so of two concurrent redemptions
    /// of the same code at most one returns true.
    pub async fn verify(&self, user: &User, code: &str) -> Result<bool> {
        let secret = match user.two_factor_state() {
            TwoFactorState::Enabled { secret } => secret,
            _ => return Err(AuthError::TwoFactorNotEnabled),
        };

        if totp::check(&secret, code)? {
            return Ok(true);
        }

        self.backup_codes
            .consume(&user.id, &totp::hash_code(code))
            .await
    }

    pub async fn regenerate_backup_codes(&self, user: &User) -> Result<Vec<String>> {
        if !matches!(user.two_factor_state(), TwoFactorState::Enabled { .. }) {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        self.mint_backup_codes(&user.id).await
    }

    pub async fn remaining_backup_codes(&self, user: &User) -> Result<i64> {
        if !matches!(user.two_factor_state(), TwoFactorState::Enabled { .. }) {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        self.backup_codes.count_unused(&user.id).await
    }

    async fn mint_backup_codes(&self, user_id: &str) -> Result<Vec<String>> {
        let plaintext = totp::generate_backup_codes(
            self.policy.backup_code_count,
            self.policy.backup_code_length,
        );

        let now = Utc::now();
        let rows: Vec<BackupCode> = plaintext
            .iter()
            .map(|code| BackupCode {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                code_hash: totp::hash_code(code),
                used: false,
                created_at: now,
            })
            .collect();

        self.backup_codes.replace_for_user(user_id, &rows).await?;
        Ok(plaintext)
    }
}
