use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::modules::auth::extractor::AuthUser;
use crate::modules::auth::interface::{AuthError, LoginOutcome};
use crate::modules::auth::schema::{
    BackupCodesRemainingResponse, BackupCodesResponse, ChangePasswordRequest, DeviceListResponse,
    DeviceResponse, Disable2faRequest, Enable2faResponse, ErrorResponse, ForgotPasswordRequest,
    ForgotPasswordResponse, LoginRequest, LoginRequires2faResponse, LoginResponse, LogoutRequest,
    LogoutResponse, MessageResponse, PasswordStatusResponse, RefreshTokenRequest, RegisterRequest,
    RegisterResponse, ResetPasswordRequest, RevokeOtherDevicesRequest, RevokedDevicesResponse,
    SecurityEventListResponse, SecurityEventResponse, TwoFactorLoginRequest, UserResponse,
    Verify2faRequest, Verify2faResponse, VerifyEmailRequest,
};
use crate::AppState;

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: AuthError) -> HandlerError {
    let status = e.status_code();
    let body = match &e {
        AuthError::WeakPassword(violations) => {
            let details = violations
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            ErrorResponse::with_message(e.to_string(), details)
        }
        AuthError::AccountLocked { until: Some(until) } => {
            let mut body = ErrorResponse::new(e.to_string());
            body.retry_after = Some(*until);
            body
        }
        AuthError::Database(inner) => {
            tracing::error!(error = %inner, "database error");
            ErrorResponse::new("Internal server error")
        }
        AuthError::Internal(inner) => {
            tracing::error!(error = %inner, "internal error");
            ErrorResponse::new("Internal server error")
        }
        _ => ErrorResponse::new(e.to_string()),
    };
    (status, Json(body))
}

fn bad_request(message: impl Into<String>) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message)),
    )
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), HandlerError> {
    if let Err(e) = req.validate() {
        return Err(bad_request(e.to_string()));
    }
    if req.password != req.password_confirm {
        return Err(bad_request("Passwords do not match"));
    }

    let user = state
        .auth
        .register(&req.email, &req.password)
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserResponse::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, HandlerError> {
    let device = req.device.into_device_info();
    let outcome = state
        .auth
        .login(&req.email, &req.password, &device)
        .await
        .map_err(error_response)?;

    Ok(login_outcome_response(outcome))
}

pub async fn login_two_factor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TwoFactorLoginRequest>,
) -> Result<Response, HandlerError> {
    let device = req.device.into_device_info();
    let outcome = state
        .auth
        .complete_two_factor_login(&req.two_factor_token, &req.code, &device)
        .await
        .map_err(error_response)?;

    Ok(login_outcome_response(outcome))
}

fn login_outcome_response(outcome: LoginOutcome) -> Response {
    match outcome {
        LoginOutcome::Complete {
            pair,
            must_change_password,
        } => Json(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in: pair.expires_in,
            device_id: pair.device_session.device_id,
            must_change_password,
        })
        .into_response(),
        LoginOutcome::TwoFactorRequired {
            challenge_token,
            expires_in,
        } => Json(LoginRequires2faResponse {
            requires_2fa: true,
            two_factor_token: challenge_token,
            expires_in,
        })
        .into_response(),
    }
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<LogoutResponse>, HandlerError> {
    state
        .auth
        .logout(&req.refresh_token)
        .await
        .map_err(error_response)?;

    Ok(Json(LogoutResponse {
        message: "Logged out",
    }))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<LoginResponse>, HandlerError> {
    let device = req.device.into_device_info();
    let pair = state
        .auth
        .refresh(&req.refresh_token, &device)
        .await
        .map_err(error_response)?;

    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer",
        expires_in: pair.expires_in,
        device_id: pair.device_session.device_id,
        must_change_password: false,
    }))
}

pub async fn me(auth: AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(&auth.user))
}

// =============================================================================
// PASSWORDS
// =============================================================================

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, HandlerError> {
    // The reset token goes out through the mailer collaborator; the
    // response is identical whether or not the account exists.
    state
        .auth
        .request_password_reset(&req.email)
        .await
        .map_err(error_response)?;

    Ok(Json(ForgotPasswordResponse {
        message: "If the account exists, a reset email has been sent",
    }))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    if req.password != req.password_confirm {
        return Err(bad_request("Passwords do not match"));
    }

    state
        .auth
        .reset_password(&req.token, &req.password)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse {
        message: "Password has been reset",
    }))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    if req.password != req.password_confirm {
        return Err(bad_request("Passwords do not match"));
    }

    state
        .auth
        .change_password(&auth.user, &req.current_password, &req.password)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse {
        message: "Password changed",
    }))
}

pub async fn password_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Json<PasswordStatusResponse> {
    let status = state.auth.password_status(&auth.user);
    Json(PasswordStatusResponse {
        expired: status.expired,
        days_remaining: status.days_remaining,
        must_change: status.must_change,
    })
}

// =============================================================================
// EMAIL VERIFICATION
// =============================================================================

pub async fn request_verification(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, HandlerError> {
    state
        .auth
        .request_email_verification(&auth.user)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse {
        message: "Verification email sent",
    }))
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    state
        .auth
        .verify_email(&req.token)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse {
        message: "Email verified",
    }))
}

// =============================================================================
// TWO-FACTOR
// =============================================================================

pub async fn enable_2fa(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Enable2faResponse>, HandlerError> {
    let setup = state
        .auth
        .enable_two_factor(&auth.user)
        .await
        .map_err(error_response)?;

    Ok(Json(Enable2faResponse {
        secret: setup.secret,
        otpauth_url: setup.otpauth_url,
    }))
}

pub async fn verify_2fa(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<Verify2faRequest>,
) -> Result<Json<Verify2faResponse>, HandlerError> {
    let backup_codes = state
        .auth
        .confirm_two_factor(&auth.user, &req.code)
        .await
        .map_err(error_response)?;

    Ok(Json(Verify2faResponse {
        message: "Two-factor authentication enabled",
        backup_codes,
    }))
}

pub async fn disable_2fa(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<Disable2faRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    state
        .auth
        .disable_two_factor(&auth.user, &req.code)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse {
        message: "Two-factor authentication disabled",
    }))
}

pub async fn backup_codes_remaining(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BackupCodesRemainingResponse>, HandlerError> {
    let remaining = state
        .auth
        .remaining_backup_codes(&auth.user)
        .await
        .map_err(error_response)?;

    Ok(Json(BackupCodesRemainingResponse { remaining }))
}

pub async fn regenerate_backup_codes(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BackupCodesResponse>, HandlerError> {
    let codes = state
        .auth
        .regenerate_backup_codes(&auth.user)
        .await
        .map_err(error_response)?;

    Ok(Json(BackupCodesResponse { codes }))
}

// =============================================================================
// DEVICES
// =============================================================================

pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<DeviceListResponse>, HandlerError> {
    let sessions = state
        .auth
        .list_devices(&auth.user)
        .await
        .map_err(error_response)?;

    Ok(Json(DeviceListResponse {
        devices: sessions.iter().map(DeviceResponse::from).collect(),
    }))
}

pub async fn remove_device(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(device_id): Path<String>,
) -> Result<Json<MessageResponse>, HandlerError> {
    state
        .auth
        .remove_device(&auth.user, &device_id)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse {
        message: "Device revoked",
    }))
}

pub async fn revoke_other_devices(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<RevokeOtherDevicesRequest>,
) -> Result<Json<RevokedDevicesResponse>, HandlerError> {
    let removed = state
        .auth
        .revoke_other_devices(&auth.user, &req.keep_device_id)
        .await
        .map_err(error_response)?;

    Ok(Json(RevokedDevicesResponse {
        revoked: removed.iter().map(DeviceResponse::from).collect(),
    }))
}

// =============================================================================
// AUDIT
// =============================================================================

pub async fn security_events(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<SecurityEventListResponse>, HandlerError> {
    let events = state
        .auth
        .recent_events(&auth.user, 50)
        .await
        .map_err(error_response)?;

    Ok(Json(SecurityEventListResponse {
        events: events.iter().map(SecurityEventResponse::from).collect(),
    }))
}
