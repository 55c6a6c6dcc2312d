use axum::http::StatusCode;
use serde_json::json;

use crate::common::{test_email, test_password, TestContext};

pub async fn register(ctx: &TestContext, email: &str) {
    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "email": email,
            "password": test_password(),
            "password_confirm": test_password()
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
}

pub async fn login(ctx: &TestContext, email: &str) -> serde_json::Value {
    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": email,
            "password": test_password()
        }))
        .await;
    response.assert_status(StatusCode::OK);
    response.json()
}

pub async fn register_and_login(ctx: &TestContext) -> (String, String) {
    let email = test_email();
    register(ctx, &email).await;
    let body = login(ctx, &email).await;
    let access_token = body["access_token"].as_str().unwrap().to_string();
    (email, access_token)
}

#[tokio::test]
async fn register_then_login_returns_token_pair() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    let body = login(&ctx, &email).await;
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["expires_in"].as_i64().unwrap() > 0);
    assert!(body["device_id"].as_str().is_some());
    assert_eq!(body["must_change_password"], false);
}

#[tokio::test]
async fn login_with_wrong_password_returns_unauthorized() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": &email,
            "password": "WrongPassword123!"
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn login_with_unknown_email_is_indistinguishable_from_wrong_password() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": "nobody@example.com",
            "password": test_password()
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn register_with_duplicate_email_conflicts() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "email": &email,
            "password": test_password(),
            "password_confirm": test_password()
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn register_with_weak_password_reports_every_violation() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "email": test_email(),
            "password": "short",
            "password_confirm": "short"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("at least 8 characters"));
    assert!(message.contains("uppercase"));
    assert!(message.contains("digit"));
    assert!(message.contains("special"));
}

#[tokio::test]
async fn register_with_mismatched_confirmation_fails() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "email": test_email(),
            "password": test_password(),
            "password_confirm": "Different123!"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inactive_account_cannot_login() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    ctx.repo.update_user_by_email(&email, |u| u.is_active = false);

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": &email,
            "password": test_password()
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn me_returns_current_user() {
    let ctx = TestContext::new().await;
    let (email, access_token) = register_and_login(&ctx).await;

    let response = ctx
        .server
        .get("/auth/me")
        .authorization_bearer(&access_token)
        .await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["email"], email.as_str());
    assert_eq!(body["two_factor_enabled"], false);
}

#[tokio::test]
async fn me_without_token_is_unauthorized() {
    let ctx = TestContext::new().await;

    let response = ctx.server.get("/auth/me").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_records_security_events() {
    let ctx = TestContext::new().await;
    let (_, access_token) = register_and_login(&ctx).await;

    let response = ctx
        .server
        .get("/auth/security-events")
        .authorization_bearer(&access_token)
        .await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    let events = body["events"].as_array().unwrap();
    assert!(events
        .iter()
        .any(|e| e["event_type"] == "login_success" && e["outcome"] == "success"));
    assert!(events.iter().any(|e| e["event_type"] == "device_added"));
}
