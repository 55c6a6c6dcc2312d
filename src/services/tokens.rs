use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::policy::TokenTtls;
use crate::modules::auth::interface::{
    AuthError, AuthPair, Result, TokenRepository, UserRepository,
};
use crate::modules::auth::model::{DeviceInfo, Token, TokenType, User};
use crate::services::device_sessions::{AdmittedDevice, DeviceSessionGuard};
use crate::services::jwt::JwtService;

pub struct IssuedToken {
    pub value: String,
    pub record: Token,
}

/// Issues, verifies, revokes, and rotates the signed, typed, time-bounded
/// tokens. Every issued token has a persisted row keyed by its jti; verify
/// always re-fetches that row so revocation is observed before expiry.
#[derive(Clone)]
pub struct TokenManager {
    tokens: Arc<dyn TokenRepository>,
    users: Arc<dyn UserRepository>,
    devices: DeviceSessionGuard,
    jwt: JwtService,
    ttls: TokenTtls,
}

impl TokenManager {
    pub fn new(
        tokens: Arc<dyn TokenRepository>,
        users: Arc<dyn UserRepository>,
        devices: DeviceSessionGuard,
        jwt: JwtService,
        ttls: TokenTtls,
    ) -> Self {
        Self {
            tokens,
            users,
            devices,
            jwt,
            ttls,
        }
    }

    pub fn ttl_for(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.ttls.access,
            TokenType::Refresh => self.ttls.refresh,
            TokenType::ResetPassword => self.ttls.reset_password,
            TokenType::VerifyEmail => self.ttls.verify_email,
            TokenType::TwoFactor => self.ttls.two_factor_challenge,
        }
    }

    pub async fn issue(
        &self,
        user: &User,
        token_type: TokenType,
        device: Option<&DeviceInfo>,
    ) -> Result<IssuedToken> {
        self.issue_with_ttl(user, token_type, self.ttl_for(token_type), device)
            .await
    }

    pub async fn issue_with_ttl(
        &self,
        user: &User,
        token_type: TokenType,
        ttl: Duration,
        device: Option<&DeviceInfo>,
    ) -> Result<IssuedToken> {
        let jti = Uuid::new_v4().to_string();
        let now = Utc::now();
        let (value, expires_at) = self.jwt.sign(&user.id, &jti, token_type, now, ttl)?;

        let record = Token {
            id: jti,
            user_id: user.id.clone(),
            token_hash: hash_value(&value),
            token_type,
            expires_at,
            blacklisted: false,
            device_id: device.and_then(|d| d.device_id.clone()),
            device_name: device.and_then(|d| d.device_name.clone()),
            ip_address: device.and_then(|d| d.ip_address.clone()),
            user_agent: device.and_then(|d| d.user_agent.clone()),
            created_at: now,
        };
        self.tokens.create(&record).await?;

        Ok(IssuedToken { value, record })
    }

    /// Admits the device, then issues an access + refresh pair bound to it.
    pub async fn issue_auth_pair(
        &self,
        user: &User,
        info: &DeviceInfo,
    ) -> Result<(AuthPair, AdmittedDevice)> {
        let admitted = self.devices.admit(&user.id, info).await?;

        let bound = DeviceInfo {
            device_id: Some(admitted.session.device_id.clone()),
            device_name: admitted.session.device_name.clone(),
            ip_address: info.ip_address.clone(),
            user_agent: info.user_agent.clone(),
        };

        let access = self.issue(user, TokenType::Access, Some(&bound)).await?;
        let refresh = self.issue(user, TokenType::Refresh, Some(&bound)).await?;

        let pair = AuthPair {
            access_token: access.value,
            refresh_token: refresh.value,
            expires_in: self.ttls.access.num_seconds(),
            device_session: admitted.session.clone(),
        };
        Ok((pair, admitted))
    }

    /// Signature, then expiry, then the persisted row: unknown jti or hash
    /// mismatch or wrong type -> InvalidToken; blacklisted -> RevokedToken.
    pub async fn verify(&self, value: &str, expected_type: TokenType) -> Result<Token> {
        let claims = self.jwt.verify(value)?;

        if TokenType::parse(&claims.typ) != Some(expected_type) {
            return Err(AuthError::InvalidToken);
        }

        let record = self
            .tokens
            .find_by_id(&claims.jti)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if record.token_hash != hash_value(value) || record.token_type != expected_type {
            return Err(AuthError::InvalidToken);
        }
        if record.blacklisted {
            return Err(AuthError::RevokedToken);
        }

        Ok(record)
    }

    /// Blacklists, never deletes. Returns whether this call flipped it.
    pub async fn revoke(&self, token_id: &str) -> Result<bool> {
        self.tokens.blacklist(token_id).await
    }

    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64> {
        self.tokens.blacklist_all_for_user(user_id).await
    }

    /// Refresh tokens are single-use: verify, revoke, re-issue. Losing the
    /// revoke race to a concurrent rotation fails with RevokedToken, so a
    /// stolen-and-replayed token can never yield a second pair.
    pub async fn rotate_refresh(
        &self,
        refresh_value: &str,
        info: &DeviceInfo,
    ) -> Result<(AuthPair, AdmittedDevice)> {
        let old = self.verify(refresh_value, TokenType::Refresh).await?;

        if !self.tokens.blacklist(&old.id).await? {
            return Err(AuthError::RevokedToken);
        }

        let user = self
            .users
            .find_by_id(&old.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        // Keep the binding of the old token when the client sent nothing new.
        let merged = DeviceInfo {
            device_id: info.device_id.clone().or(old.device_id),
            device_name: info.device_name.clone().or(old.device_name),
            ip_address: info.ip_address.clone().or(old.ip_address),
            user_agent: info.user_agent.clone().or(old.user_agent),
        };

        self.issue_auth_pair(&user, &merged).await
    }

    /// Retention path, not the hot path: drops rows past expiry regardless
    /// of blacklist state.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.tokens.delete_expired(now).await
    }
}

fn hash_value(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}
