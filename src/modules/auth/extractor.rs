use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::modules::auth::model::{Token, User};
use crate::modules::auth::schema::ErrorResponse;
use crate::AppState;

/// Bearer-token extractor for authenticated routes. Verification goes
/// through TokenManager, which re-reads the persisted row, so a revoked
/// access token stops working before it expires.
pub struct AuthUser {
    pub user: User,
    pub token: Token,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Unauthorized")),
            )
        };

        let header = parts
            .headers
            .get("authorization")
            .ok_or_else(unauthorized)?;
        let header = header.to_str().map_err(|_| unauthorized())?;
        let value = header.strip_prefix("Bearer ").ok_or_else(unauthorized)?;

        let (user, token) = state
            .auth
            .authenticate_access(value)
            .await
            .map_err(|_| unauthorized())?;

        Ok(AuthUser { user, token })
    }
}
