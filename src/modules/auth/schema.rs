use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::model::{DeviceInfo, DeviceSession, SecurityEvent, User};

// =============================================================================
// SHARED DEVICE METADATA
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DeviceMetadata {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl DeviceMetadata {
    pub fn into_device_info(self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.device_id,
            device_name: self.device_name,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        }
    }
}

// =============================================================================
// REGISTER
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
}

// =============================================================================
// LOGIN
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub device: DeviceMetadata,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub device_id: String,
    pub must_change_password: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginRequires2faResponse {
    pub requires_2fa: bool,
    pub two_factor_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorLoginRequest {
    pub two_factor_token: String,
    pub code: String,
    #[serde(flatten)]
    pub device: DeviceMetadata,
}

// =============================================================================
// LOGOUT / REFRESH
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
    #[serde(flatten)]
    pub device: DeviceMetadata,
}

// =============================================================================
// ME
// =============================================================================

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            two_factor_enabled: user.two_factor_enabled,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// =============================================================================
// PASSWORDS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PasswordStatusResponse {
    pub expired: bool,
    pub days_remaining: i64,
    pub must_change: bool,
}

// =============================================================================
// EMAIL VERIFICATION
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

// =============================================================================
// TWO-FACTOR
// =============================================================================

#[derive(Debug, Serialize)]
pub struct Enable2faResponse {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Verify2faRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct Verify2faResponse {
    pub message: &'static str,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Disable2faRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct BackupCodesResponse {
    pub codes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BackupCodesRemainingResponse {
    pub remaining: i64,
}

// =============================================================================
// DEVICES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub device_id: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_trusted: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl From<&DeviceSession> for DeviceResponse {
    fn from(session: &DeviceSession) -> Self {
        Self {
            device_id: session.device_id.clone(),
            device_name: session.device_name.clone(),
            ip_address: session.ip_address.clone(),
            user_agent: session.user_agent.clone(),
            is_trusted: session.is_trusted,
            created_at: session.created_at,
            last_used: session.last_used,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceResponse>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeOtherDevicesRequest {
    pub keep_device_id: String,
}

#[derive(Debug, Serialize)]
pub struct RevokedDevicesResponse {
    pub revoked: Vec<DeviceResponse>,
}

// =============================================================================
// SECURITY EVENTS
// =============================================================================

#[derive(Debug, Serialize)]
pub struct SecurityEventResponse {
    pub event_type: super::model::SecurityEventType,
    pub outcome: super::model::EventOutcome,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<&SecurityEvent> for SecurityEventResponse {
    fn from(event: &SecurityEvent) -> Self {
        Self {
            event_type: event.event_type,
            outcome: event.outcome,
            metadata: event.metadata.clone(),
            created_at: event.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SecurityEventListResponse {
    pub events: Vec<SecurityEventResponse>,
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            retry_after: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
            retry_after: None,
        }
    }
}
