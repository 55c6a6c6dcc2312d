use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use super::controller;
use crate::AppState;

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(controller::register))
        .route("/login", post(controller::login))
        .route("/login/2fa", post(controller::login_two_factor))
        .route("/logout", post(controller::logout))
        .route("/refresh", post(controller::refresh))
        .route("/me", get(controller::me))
        .route("/forgot-password", post(controller::forgot_password))
        .route("/reset-password", post(controller::reset_password))
        .route("/change-password", post(controller::change_password))
        .route("/password-status", get(controller::password_status))
        .route("/request-verification", post(controller::request_verification))
        .route("/verify-email", post(controller::verify_email))
        .route("/enable-2fa", post(controller::enable_2fa))
        .route("/verify-2fa", post(controller::verify_2fa))
        .route("/disable-2fa", post(controller::disable_2fa))
        .route("/backup-codes", get(controller::backup_codes_remaining))
        .route(
            "/backup-codes/regenerate",
            post(controller::regenerate_backup_codes),
        )
        .route("/devices", get(controller::list_devices))
        .route("/devices/{device_id}", delete(controller::remove_device))
        .route(
            "/devices/revoke-others",
            post(controller::revoke_other_devices),
        )
        .route("/security-events", get(controller::security_events))
}
