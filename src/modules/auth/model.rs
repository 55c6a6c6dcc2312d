use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub email_verified: bool,
    pub failed_login_attempts: i32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub force_password_change: bool,
    pub is_active: bool,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Explicit 2FA enrollment state, derived from the stored columns so flow
/// code never reasons about "is the secret null" directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwoFactorState {
    NotSetup,
    Pending { secret: String },
    Enabled { secret: String },
}

impl User {
    pub fn two_factor_state(&self) -> TwoFactorState {
        match (&self.two_factor_secret, self.two_factor_enabled) {
            (Some(secret), true) => TwoFactorState::Enabled {
                secret: secret.clone(),
            },
            (Some(secret), false) => TwoFactorState::Pending {
                secret: secret.clone(),
            },
            (None, _) => TwoFactorState::NotSetup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    ResetPassword,
    VerifyEmail,
    TwoFactor,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::ResetPassword => "reset_password",
            TokenType::VerifyEmail => "verify_email",
            TokenType::TwoFactor => "two_factor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access" => Some(TokenType::Access),
            "refresh" => Some(TokenType::Refresh),
            "reset_password" => Some(TokenType::ResetPassword),
            "verify_email" => Some(TokenType::VerifyEmail),
            "two_factor" => Some(TokenType::TwoFactor),
            _ => None,
        }
    }
}

/// Persisted record of an issued token. The row id is the JWT `jti`;
/// `token_hash` is the SHA-256 of the signed value. Rows are only ever
/// mutated to set `blacklisted`, or deleted by the expiry sweep.
#[derive(Debug, Clone, FromRow)]
pub struct Token {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub token_type: TokenType,
    pub expires_at: DateTime<Utc>,
    pub blacklisted: bool,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DeviceSession {
    pub id: String,
    pub user_id: String,
    pub device_id: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_trusted: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// Client-supplied device metadata accompanying a login or refresh.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BackupCode {
    pub id: String,
    pub user_id: String,
    pub code_hash: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailure,
    Logout,
    Lockout,
    TwoFactorEnabled,
    TwoFactorDisabled,
    TwoFactorVerified,
    PasswordChange,
    DeviceAdded,
    DeviceRemoved,
    SuspiciousActivity,
    RateLimitExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Success,
    Failure,
}

/// Append-only audit record. References the user weakly: the actor columns
/// are denormalized so deleting a user never breaks the trail.
#[derive(Debug, Clone, FromRow)]
pub struct SecurityEvent {
    pub id: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub event_type: SecurityEventType,
    pub outcome: EventOutcome,
    #[sqlx(json)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
