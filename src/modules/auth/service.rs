use serde_json::json;
use uuid::Uuid;

use chrono::Utc;

use crate::config::SecurityPolicy;
use crate::modules::auth::interface::{
    AuthError, AuthPair, LoginOutcome, Repositories, Result, TwoFactorSetup,
};
use crate::modules::auth::model::{
    DeviceInfo, DeviceSession, EventOutcome, SecurityEvent, SecurityEventType, Token, TokenType,
    TwoFactorState, User, UserRole,
};
use crate::services::device_sessions::DeviceSessionGuard;
use crate::services::events::SecurityEventRecorder;
use crate::services::hashing;
use crate::services::jwt::JwtService;
use crate::services::lockout::LockoutGuard;
use crate::services::password_policy::{ExpiryStatus, PasswordPolicyEngine};
use crate::services::tokens::TokenManager;
use crate::services::two_factor::TwoFactorEngine;

/// Composes the guards and engines into the login, logout, refresh,
/// password, 2FA-enrollment, and device flows. The only place with
/// business-flow control logic; every state transition emits one
/// SecurityEvent.
#[derive(Clone)]
pub struct AuthService {
    repos: Repositories,
    lockout: LockoutGuard,
    two_factor: TwoFactorEngine,
    devices: DeviceSessionGuard,
    tokens: TokenManager,
    passwords: PasswordPolicyEngine,
    events: SecurityEventRecorder,
}

impl AuthService {
    pub fn new(repos: Repositories, policy: SecurityPolicy, jwt: JwtService) -> Self {
        let lockout = LockoutGuard::new(repos.users.clone(), policy.lockout.clone());
        let two_factor = TwoFactorEngine::new(
            repos.users.clone(),
            repos.backup_codes.clone(),
            policy.totp.clone(),
        );
        let devices = DeviceSessionGuard::new(
            repos.devices.clone(),
            repos.tokens.clone(),
            policy.devices.clone(),
        );
        let tokens = TokenManager::new(
            repos.tokens.clone(),
            repos.users.clone(),
            devices.clone(),
            jwt,
            policy.tokens.clone(),
        );
        let passwords = PasswordPolicyEngine::new(
            repos.users.clone(),
            repos.password_history.clone(),
            policy.passwords.clone(),
        );
        let events = SecurityEventRecorder::new(repos.events.clone());

        Self {
            repos,
            lockout,
            two_factor,
            devices,
            tokens,
            passwords,
            events,
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn passwords(&self) -> &PasswordPolicyEngine {
        &self.passwords
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        let violations = self.passwords.check_strength(password);
        if !violations.is_empty() {
            return Err(AuthError::WeakPassword(violations));
        }

        if self.repos.users.email_exists(email).await? {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = hashing::hash_password(password)
            .map_err(|e| AuthError::Internal(format!("hashing failed: {e}")))?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash,
            role: UserRole::User,
            email_verified: false,
            failed_login_attempts: 0,
            lockout_until: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            password_changed_at: Some(now),
            force_password_change: false,
            is_active: true,
            is_locked: false,
            created_at: now,
            updated_at: now,
        };
        self.repos.users.create(&user).await?;

        Ok(user)
    }

    // =========================================================================
    // LOGIN
    // =========================================================================

    /// START -> lockout check -> credential check -> (2FA challenge | tokens).
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: &DeviceInfo,
    ) -> Result<LoginOutcome> {
        let Some(user) = self.repos.users.find_by_email(email).await? else {
            self.events
                .record(
                    SecurityEventType::LoginFailure,
                    EventOutcome::Failure,
                    None,
                    Some(email),
                    json!({ "reason": "unknown_email" }),
                )
                .await?;
            // Same answer as a wrong password: no field is ever disclosed.
            return Err(AuthError::InvalidCredentials);
        };

        if let Err(e) = self.lockout.check(&user) {
            self.events
                .record(
                    SecurityEventType::LoginFailure,
                    EventOutcome::Failure,
                    Some(&user),
                    None,
                    json!({ "reason": "locked" }),
                )
                .await?;
            return Err(e);
        }

        if !user.is_active {
            self.events
                .record(
                    SecurityEventType::LoginFailure,
                    EventOutcome::Failure,
                    Some(&user),
                    None,
                    json!({ "reason": "inactive" }),
                )
                .await?;
            return Err(AuthError::AccountDisabled);
        }

        let valid = hashing::verify_password(password, &user.password_hash)
            .map_err(|e| AuthError::Internal(format!("hash verify failed: {e}")))?;
        if !valid {
            return Err(self.credential_failure(&user).await?);
        }

        if let TwoFactorState::Enabled { .. } = user.two_factor_state() {
            let challenge = self
                .tokens
                .issue(&user, TokenType::TwoFactor, None)
                .await?;
            return Ok(LoginOutcome::TwoFactorRequired {
                expires_in: self.tokens.ttl_for(TokenType::TwoFactor).num_seconds(),
                challenge_token: challenge.value,
            });
        }

        self.finish_login(&user, device, false).await
    }

    /// Second request of a 2FA login: the challenge token plus a TOTP or
    /// backup code. The challenge is consumed exactly once, after the code
    /// checks out.
    pub async fn complete_two_factor_login(
        &self,
        challenge_token: &str,
        code: &str,
        device: &DeviceInfo,
    ) -> Result<LoginOutcome> {
        let challenge = self
            .tokens
            .verify(challenge_token, TokenType::TwoFactor)
            .await?;

        let user = self
            .repos
            .users
            .find_by_id(&challenge.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.lockout.check(&user)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        if !self.two_factor.verify(&user, code).await? {
            self.events
                .record(
                    SecurityEventType::LoginFailure,
                    EventOutcome::Failure,
                    Some(&user),
                    None,
                    json!({ "reason": "invalid_two_factor_code" }),
                )
                .await?;
            return Err(AuthError::InvalidTwoFactorCode);
        }

        // A replayed challenge fails even when the code is right.
        if !self.tokens.revoke(&challenge.id).await? {
            return Err(AuthError::RevokedToken);
        }

        self.events
            .record(
                SecurityEventType::TwoFactorVerified,
                EventOutcome::Success,
                Some(&user),
                None,
                json!({}),
            )
            .await?;

        self.finish_login(&user, device, true).await
    }

    async fn credential_failure(&self, user: &User) -> Result<AuthError> {
        let status = self.lockout.record_failure(user).await?;

        self.events
            .record(
                SecurityEventType::LoginFailure,
                EventOutcome::Failure,
                Some(user),
                None,
                json!({ "reason": "bad_password", "attempts": status.attempts }),
            )
            .await?;

        if let Some(until) = status.locked_until {
            self.events
                .record(
                    SecurityEventType::Lockout,
                    EventOutcome::Success,
                    Some(user),
                    None,
                    json!({ "until": until.to_rfc3339(), "attempts": status.attempts }),
                )
                .await?;
        }

        Ok(AuthError::InvalidCredentials)
    }

    async fn finish_login(
        &self,
        user: &User,
        device: &DeviceInfo,
        via_two_factor: bool,
    ) -> Result<LoginOutcome> {
        // Counter reset rides inside the successful flow only.
        self.lockout.record_success(user).await?;

        let (pair, admitted) = self.tokens.issue_auth_pair(user, device).await?;

        // Tokens are authoritative from here on: event append failures are
        // logged, never rolled back.
        for evicted in &admitted.evicted {
            self.events
                .record_best_effort(
                    SecurityEventType::DeviceRemoved,
                    EventOutcome::Success,
                    Some(user),
                    None,
                    json!({ "device_id": evicted.device_id, "reason": "evicted" }),
                )
                .await;
        }
        if admitted.newly_created {
            self.events
                .record_best_effort(
                    SecurityEventType::DeviceAdded,
                    EventOutcome::Success,
                    Some(user),
                    None,
                    json!({ "device_id": admitted.session.device_id }),
                )
                .await;
        }
        self.events
            .record_best_effort(
                SecurityEventType::LoginSuccess,
                EventOutcome::Success,
                Some(user),
                None,
                json!({
                    "device_id": admitted.session.device_id,
                    "two_factor": via_two_factor,
                }),
            )
            .await;

        let must_change_password = self.passwords.expiry_status(user).must_change;
        Ok(LoginOutcome::Complete {
            pair,
            must_change_password,
        })
    }

    // =========================================================================
    // SESSION MAINTENANCE
    // =========================================================================

    pub async fn refresh(&self, refresh_token: &str, device: &DeviceInfo) -> Result<AuthPair> {
        let (pair, _) = self.tokens.rotate_refresh(refresh_token, device).await?;
        Ok(pair)
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let record = self.tokens.verify(refresh_token, TokenType::Refresh).await?;
        self.tokens.revoke(&record.id).await?;

        let user = self.repos.users.find_by_id(&record.user_id).await?;
        if let Some(device_id) = &record.device_id {
            self.devices.remove(&record.user_id, device_id).await?;
        }

        self.events
            .record_best_effort(
                SecurityEventType::Logout,
                EventOutcome::Success,
                user.as_ref(),
                None,
                json!({ "device_id": record.device_id }),
            )
            .await;

        Ok(())
    }

    /// Access-token gate for authenticated endpoints. Re-reads the token
    /// row, so revoked-but-unexpired tokens are rejected.
    pub async fn authenticate_access(&self, access_token: &str) -> Result<(User, Token)> {
        let record = self.tokens.verify(access_token, TokenType::Access).await?;
        let user = self
            .repos
            .users
            .find_by_id(&record.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        Ok((user, record))
    }

    // =========================================================================
    // PASSWORDS
    // =========================================================================

    /// Silent for unknown emails so the endpoint cannot be used to probe
    /// which addresses exist.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>> {
        let Some(user) = self.repos.users.find_by_email(email).await? else {
            return Ok(None);
        };

        let token = self
            .tokens
            .issue(&user, TokenType::ResetPassword, None)
            .await?;
        Ok(Some(token.value))
    }

    pub async fn reset_password(&self, token_value: &str, candidate: &str) -> Result<()> {
        let record = self
            .tokens
            .verify(token_value, TokenType::ResetPassword)
            .await?;

        let user = self
            .repos
            .users
            .find_by_id(&record.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.passwords.validate_for_change(&user, candidate).await?;

        // Single use, decided before anything changes.
        if !self.tokens.revoke(&record.id).await? {
            return Err(AuthError::RevokedToken);
        }

        self.passwords.commit(&user, candidate).await?;
        // A reset invalidates every outstanding session.
        self.tokens.revoke_all_for_user(&user.id).await?;

        self.events
            .record(
                SecurityEventType::PasswordChange,
                EventOutcome::Success,
                Some(&user),
                None,
                json!({ "via": "reset" }),
            )
            .await?;

        Ok(())
    }

    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        candidate: &str,
    ) -> Result<()> {
        let valid = hashing::verify_password(current_password, &user.password_hash)
            .map_err(|e| AuthError::Internal(format!("hash verify failed: {e}")))?;
        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        self.passwords.validate_for_change(user, candidate).await?;
        self.passwords.commit(user, candidate).await?;

        self.events
            .record(
                SecurityEventType::PasswordChange,
                EventOutcome::Success,
                Some(user),
                None,
                json!({ "via": "change" }),
            )
            .await?;

        Ok(())
    }

    pub fn password_status(&self, user: &User) -> ExpiryStatus {
        self.passwords.expiry_status(user)
    }

    // =========================================================================
    // EMAIL VERIFICATION
    // =========================================================================

    pub async fn request_email_verification(&self, user: &User) -> Result<String> {
        let token = self
            .tokens
            .issue(user, TokenType::VerifyEmail, None)
            .await?;
        Ok(token.value)
    }

    pub async fn verify_email(&self, token_value: &str) -> Result<()> {
        let record = self
            .tokens
            .verify(token_value, TokenType::VerifyEmail)
            .await?;

        if !self.tokens.revoke(&record.id).await? {
            return Err(AuthError::RevokedToken);
        }

        self.repos
            .users
            .set_email_verified(&record.user_id, true)
            .await?;
        Ok(())
    }

    // =========================================================================
    // TWO-FACTOR ENROLLMENT
    // =========================================================================

    pub async fn enable_two_factor(&self, user: &User) -> Result<TwoFactorSetup> {
        self.two_factor.begin_enrollment(user).await
    }

    pub async fn confirm_two_factor(&self, user: &User, code: &str) -> Result<Vec<String>> {
        let backup_codes = self.two_factor.confirm_enrollment(user, code).await?;

        self.events
            .record(
                SecurityEventType::TwoFactorEnabled,
                EventOutcome::Success,
                Some(user),
                None,
                json!({}),
            )
            .await?;

        Ok(backup_codes)
    }

    pub async fn disable_two_factor(&self, user: &User, code: &str) -> Result<()> {
        self.two_factor.disable(user, code).await?;

        self.events
            .record(
                SecurityEventType::TwoFactorDisabled,
                EventOutcome::Success,
                Some(user),
                None,
                json!({}),
            )
            .await?;

        Ok(())
    }

    pub async fn regenerate_backup_codes(&self, user: &User) -> Result<Vec<String>> {
        self.two_factor.regenerate_backup_codes(user).await
    }

    pub async fn remaining_backup_codes(&self, user: &User) -> Result<i64> {
        self.two_factor.remaining_backup_codes(user).await
    }

    // =========================================================================
    // DEVICES
    // =========================================================================

    pub async fn list_devices(&self, user: &User) -> Result<Vec<DeviceSession>> {
        self.devices.list(&user.id).await
    }

    pub async fn remove_device(&self, user: &User, device_id: &str) -> Result<()> {
        let removed = self.devices.remove(&user.id, device_id).await?;
        if removed.is_none() {
            return Err(AuthError::DeviceNotFound);
        }

        self.events
            .record(
                SecurityEventType::DeviceRemoved,
                EventOutcome::Success,
                Some(user),
                None,
                json!({ "device_id": device_id, "reason": "user_revoked" }),
            )
            .await?;

        Ok(())
    }

    pub async fn revoke_other_devices(
        &self,
        user: &User,
        keep_device_id: &str,
    ) -> Result<Vec<DeviceSession>> {
        let removed = self
            .devices
            .remove_all_except(&user.id, keep_device_id)
            .await?;

        for session in &removed {
            self.events
                .record(
                    SecurityEventType::DeviceRemoved,
                    EventOutcome::Success,
                    Some(user),
                    None,
                    json!({ "device_id": session.device_id, "reason": "user_revoked_others" }),
                )
                .await?;
        }

        Ok(removed)
    }

    // =========================================================================
    // AUDIT
    // =========================================================================

    pub async fn recent_events(&self, user: &User, limit: i64) -> Result<Vec<SecurityEvent>> {
        self.repos.events.recent_for_user(&user.id, limit).await
    }
}
