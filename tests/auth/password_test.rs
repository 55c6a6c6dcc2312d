use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use crate::auth::login_test::{register, register_and_login};
use crate::common::{test_email, test_password, TestContext};

async fn change_password(
    ctx: &TestContext,
    access_token: &str,
    current: &str,
    new: &str,
) -> StatusCode {
    ctx.server
        .post("/auth/change-password")
        .authorization_bearer(access_token)
        .json(&json!({
            "current_password": current,
            "password": new,
            "password_confirm": new
        }))
        .await
        .status_code()
}

#[tokio::test]
async fn change_password_requires_the_current_password() {
    let ctx = TestContext::new().await;
    let (_, access_token) = register_and_login(&ctx).await;

    let status = change_password(&ctx, &access_token, "WrongCurrent1!", "NewPassword123!").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let status = change_password(&ctx, &access_token, test_password(), "NewPassword123!").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn changed_password_takes_effect_immediately() {
    let ctx = TestContext::new().await;
    let (email, access_token) = register_and_login(&ctx).await;

    change_password(&ctx, &access_token, test_password(), "NewPassword123!").await;

    ctx.server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    ctx.server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": "NewPassword123!" }))
        .await
        .assert_status(StatusCode::OK);
}

#[tokio::test]
async fn reusing_a_recent_password_is_rejected() {
    let ctx = TestContext::new().await;
    let (_, access_token) = register_and_login(&ctx).await;

    // Immediate reuse of the current password.
    let status = change_password(&ctx, &access_token, test_password(), test_password()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(
        change_password(&ctx, &access_token, test_password(), "Generation2pw!").await,
        StatusCode::OK
    );
    assert_eq!(
        change_password(&ctx, &access_token, "Generation2pw!", "Generation3pw!").await,
        StatusCode::OK
    );

    // The original password is still inside the 5-deep window.
    let response = ctx
        .server
        .post("/auth/change-password")
        .authorization_bearer(&access_token)
        .json(&json!({
            "current_password": "Generation3pw!",
            "password": test_password(),
            "password_confirm": test_password()
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Password was used recently");
}

#[tokio::test]
async fn password_outside_the_history_window_is_accepted_again() {
    let ctx = TestContext::new().await;
    let (_, access_token) = register_and_login(&ctx).await;

    // Five generations after the original: history holds gen2..gen5 plus
    // the original falls off the end of the window.
    let generations = [
        "Generation2pw!",
        "Generation3pw!",
        "Generation4pw!",
        "Generation5pw!",
        "Generation6pw!",
    ];
    let mut current = test_password().to_string();
    for next in generations {
        assert_eq!(
            change_password(&ctx, &access_token, &current, next).await,
            StatusCode::OK
        );
        current = next.to_string();
    }

    // The original is now 6 generations old.
    assert_eq!(
        change_password(&ctx, &access_token, &current, test_password()).await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn weak_replacement_passwords_are_rejected_with_details() {
    let ctx = TestContext::new().await;
    let (_, access_token) = register_and_login(&ctx).await;

    let response = ctx
        .server
        .post("/auth/change-password")
        .authorization_bearer(&access_token)
        .json(&json!({
            "current_password": test_password(),
            "password": "alllowercase",
            "password_confirm": "alllowercase"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Password too weak");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("uppercase"));
    assert!(message.contains("digit"));
    assert!(message.contains("special"));
}

#[tokio::test]
async fn forgot_password_never_discloses_whether_the_account_exists() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    let known = ctx
        .server
        .post("/auth/forgot-password")
        .json(&json!({ "email": &email }))
        .await;
    let unknown = ctx
        .server
        .post("/auth/forgot-password")
        .json(&json!({ "email": "nobody@example.com" }))
        .await;

    known.assert_status(StatusCode::OK);
    unknown.assert_status(StatusCode::OK);
    let known: serde_json::Value = known.json();
    let unknown: serde_json::Value = unknown.json();
    assert_eq!(known["message"], unknown["message"]);
}

#[tokio::test]
async fn reset_flow_changes_the_password_and_revokes_sessions() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;
    let login = crate::auth::login_test::login(&ctx, &email).await;
    let old_refresh = login["refresh_token"].as_str().unwrap();

    // The token normally travels by email; take it from the service seam.
    let reset_token = ctx
        .auth
        .request_password_reset(&email)
        .await
        .unwrap()
        .expect("known account yields a token");

    ctx.server
        .post("/auth/reset-password")
        .json(&json!({
            "token": reset_token,
            "password": "AfterReset123!",
            "password_confirm": "AfterReset123!"
        }))
        .await
        .assert_status(StatusCode::OK);

    ctx.server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": "AfterReset123!" }))
        .await
        .assert_status(StatusCode::OK);

    // Every pre-reset session is dead.
    ctx.server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": old_refresh }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reset_token_is_single_use() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    let reset_token = ctx
        .auth
        .request_password_reset(&email)
        .await
        .unwrap()
        .unwrap();

    ctx.server
        .post("/auth/reset-password")
        .json(&json!({
            "token": &reset_token,
            "password": "AfterReset123!",
            "password_confirm": "AfterReset123!"
        }))
        .await
        .assert_status(StatusCode::OK);

    let replay = ctx
        .server
        .post("/auth/reset-password")
        .json(&json!({
            "token": &reset_token,
            "password": "AfterReplay123!",
            "password_confirm": "AfterReplay123!"
        }))
        .await;
    replay.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reset_still_enforces_strength_and_history() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    let reset_token = ctx
        .auth
        .request_password_reset(&email)
        .await
        .unwrap()
        .unwrap();

    let weak = ctx
        .server
        .post("/auth/reset-password")
        .json(&json!({
            "token": &reset_token,
            "password": "weak",
            "password_confirm": "weak"
        }))
        .await;
    weak.assert_status(StatusCode::BAD_REQUEST);

    let reused = ctx
        .server
        .post("/auth/reset-password")
        .json(&json!({
            "token": &reset_token,
            "password": test_password(),
            "password_confirm": test_password()
        }))
        .await;
    reused.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn password_status_reports_expiry() {
    let ctx = TestContext::new().await;
    let (email, access_token) = register_and_login(&ctx).await;

    let fresh: serde_json::Value = ctx
        .server
        .get("/auth/password-status")
        .authorization_bearer(&access_token)
        .await
        .json();
    assert_eq!(fresh["expired"], false);
    assert_eq!(fresh["must_change"], false);
    assert!(fresh["days_remaining"].as_i64().unwrap() >= 89);

    ctx.repo.update_user_by_email(&email, |u| {
        u.password_changed_at = Some(Utc::now() - Duration::days(91));
    });

    let stale: serde_json::Value = ctx
        .server
        .get("/auth/password-status")
        .authorization_bearer(&access_token)
        .await
        .json();
    assert_eq!(stale["expired"], true);
    assert_eq!(stale["must_change"], true);
    assert_eq!(stale["days_remaining"], 0);
}

#[tokio::test]
async fn expired_password_flags_the_login_response() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    ctx.repo.update_user_by_email(&email, |u| {
        u.password_changed_at = Some(Utc::now() - Duration::days(91));
    });

    let body = crate::auth::login_test::login(&ctx, &email).await;
    assert_eq!(body["must_change_password"], true);
}

#[tokio::test]
async fn email_verification_round_trip() {
    let ctx = TestContext::new().await;
    let (email, access_token) = register_and_login(&ctx).await;

    ctx.server
        .post("/auth/request-verification")
        .authorization_bearer(&access_token)
        .await
        .assert_status(StatusCode::OK);

    let user = ctx.repo.get_user_by_email(&email).unwrap();
    let verify_token = ctx.auth.request_email_verification(&user).await.unwrap();

    ctx.server
        .post("/auth/verify-email")
        .json(&json!({ "token": verify_token }))
        .await
        .assert_status(StatusCode::OK);

    let user = ctx.repo.get_user_by_email(&email).unwrap();
    assert!(user.email_verified);
}
