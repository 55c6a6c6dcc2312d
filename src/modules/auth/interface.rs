use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::model::{
    BackupCode, DeviceSession, SecurityEvent, Token, User,
};

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

pub type Result<T> = std::result::Result<T, AuthError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Storage-side atomic increment of the failure counter.
    /// Returns the post-increment count.
    async fn record_login_failure(&self, user_id: &str) -> Result<i32>;
    async fn set_lockout(&self, user_id: &str, until: Option<DateTime<Utc>>) -> Result<()>;
    /// Resets the failure counter and clears any lockout in one statement.
    async fn clear_login_failures(&self, user_id: &str) -> Result<()>;

    async fn set_two_factor(
        &self,
        user_id: &str,
        enabled: bool,
        secret: Option<&str>,
    ) -> Result<()>;
    async fn set_email_verified(&self, user_id: &str, verified: bool) -> Result<()>;
    async fn update_password(
        &self,
        user_id: &str,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn create(&self, token: &Token) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Token>>;

    /// Compare-and-set: returns true iff this call flipped `blacklisted`.
    async fn blacklist(&self, id: &str) -> Result<bool>;
    async fn blacklist_for_device(&self, user_id: &str, device_id: &str) -> Result<u64>;
    async fn blacklist_all_for_user(&self, user_id: &str) -> Result<u64>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait DeviceSessionRepository: Send + Sync {
    async fn create(&self, session: &DeviceSession) -> Result<()>;
    async fn find_by_device(&self, user_id: &str, device_id: &str)
        -> Result<Option<DeviceSession>>;
    async fn touch(
        &self,
        id: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        last_used: DateTime<Utc>,
    ) -> Result<()>;
    async fn count_for_user(&self, user_id: &str) -> Result<i64>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<DeviceSession>>;

    /// Atomically claims and deletes the oldest session (FIFO by creation).
    /// Concurrent callers each claim a distinct row; `None` when nothing is
    /// left to claim.
    async fn remove_oldest(&self, user_id: &str) -> Result<Option<DeviceSession>>;
    async fn remove(&self, user_id: &str, device_id: &str) -> Result<Option<DeviceSession>>;
    async fn remove_all_except(
        &self,
        user_id: &str,
        keep_device_id: &str,
    ) -> Result<Vec<DeviceSession>>;
}

#[async_trait]
pub trait BackupCodeRepository: Send + Sync {
    /// Replaces the user's whole set.
    async fn replace_for_user(&self, user_id: &str, codes: &[BackupCode]) -> Result<()>;
    /// Consume-once: returns true iff this call marked the code used.
    async fn consume(&self, user_id: &str, code_hash: &str) -> Result<bool>;
    async fn count_unused(&self, user_id: &str) -> Result<i64>;
    async fn delete_for_user(&self, user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait PasswordHistoryRepository: Send + Sync {
    /// Pushes a hash as most-recent and truncates to `keep` entries.
    async fn push(&self, user_id: &str, password_hash: &str, keep: usize) -> Result<()>;
    /// Most-recent-first hashes, at most `limit`.
    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<String>>;
}

#[async_trait]
pub trait SecurityEventRepository: Send + Sync {
    async fn append(&self, event: &SecurityEvent) -> Result<()>;
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn recent_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<SecurityEvent>>;
}

/// The injected persistence seam. Everything downstream of the orchestrator
/// talks to these, never to a pool directly, so tests can substitute
/// in-memory doubles.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub devices: Arc<dyn DeviceSessionRepository>,
    pub backup_codes: Arc<dyn BackupCodeRepository>,
    pub password_history: Arc<dyn PasswordHistoryRepository>,
    pub events: Arc<dyn SecurityEventRepository>,
}

// =============================================================================
// FLOW RESULT TYPES
// =============================================================================

#[derive(Debug)]
pub struct AuthPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub device_session: DeviceSession,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Complete {
        pair: AuthPair,
        must_change_password: bool,
    },
    /// Terminal for this request: the caller must come back with a code.
    TwoFactorRequired {
        challenge_token: String,
        expires_in: i64,
    },
}

#[derive(Debug)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_url: String,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordViolation {
    TooShort { min: usize },
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSpecial,
}

impl std::fmt::Display for PasswordViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordViolation::TooShort { min } => {
                write!(f, "must be at least {min} characters")
            }
            PasswordViolation::MissingUppercase => write!(f, "must contain an uppercase letter"),
            PasswordViolation::MissingLowercase => write!(f, "must contain a lowercase letter"),
            PasswordViolation::MissingDigit => write!(f, "must contain a digit"),
            PasswordViolation::MissingSpecial => write!(f, "must contain a special character"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked { until: Option<DateTime<Utc>> },

    #[error("Account disabled")]
    AccountDisabled,

    #[error("User not found")]
    UserNotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Invalid 2FA code")]
    InvalidTwoFactorCode,

    #[error("2FA not enabled")]
    TwoFactorNotEnabled,

    #[error("2FA already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    RevokedToken,

    #[error("Device limit exceeded")]
    DeviceLimitExceeded,

    #[error("Device not found")]
    DeviceNotFound,

    #[error("Password too weak")]
    WeakPassword(Vec<PasswordViolation>),

    #[error("Password was used recently")]
    PasswordReuse,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AccountLocked { .. } => StatusCode::FORBIDDEN,
            Self::AccountDisabled => StatusCode::FORBIDDEN,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::EmailAlreadyExists => StatusCode::CONFLICT,
            Self::InvalidTwoFactorCode => StatusCode::UNAUTHORIZED,
            Self::TwoFactorNotEnabled => StatusCode::BAD_REQUEST,
            Self::TwoFactorAlreadyEnabled => StatusCode::BAD_REQUEST,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::RevokedToken => StatusCode::UNAUTHORIZED,
            Self::DeviceLimitExceeded => StatusCode::CONFLICT,
            Self::DeviceNotFound => StatusCode::NOT_FOUND,
            Self::WeakPassword(_) => StatusCode::BAD_REQUEST,
            Self::PasswordReuse => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
