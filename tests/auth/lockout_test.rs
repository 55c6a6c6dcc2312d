use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use identity_shared::modules::auth::model::SecurityEventType;

use crate::auth::login_test::register;
use crate::common::{test_email, test_password, TestContext};

async fn fail_login(ctx: &TestContext, email: &str) -> StatusCode {
    ctx.server
        .post("/auth/login")
        .json(&json!({
            "email": email,
            "password": "WrongPassword123!"
        }))
        .await
        .status_code()
}

#[tokio::test]
async fn account_locks_exactly_on_fifth_consecutive_failure() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    for attempt in 1..=4 {
        assert_eq!(fail_login(&ctx, &email).await, StatusCode::UNAUTHORIZED);
        let user = ctx.repo.get_user_by_email(&email).unwrap();
        assert_eq!(user.failed_login_attempts, attempt);
        assert!(user.lockout_until.is_none());
    }

    assert_eq!(fail_login(&ctx, &email).await, StatusCode::UNAUTHORIZED);
    let user = ctx.repo.get_user_by_email(&email).unwrap();
    assert_eq!(user.failed_login_attempts, 5);
    let until = user.lockout_until.expect("lockout set at threshold");
    assert!(until > Utc::now());
    assert!(until <= Utc::now() + Duration::minutes(15));
}

#[tokio::test]
async fn locked_account_rejects_correct_password() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    for _ in 0..5 {
        fail_login(&ctx, &email).await;
    }

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": &email,
            "password": test_password()
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Account locked");
    assert!(body["retry_after"].as_str().is_some());
}

#[tokio::test]
async fn fourth_failure_then_wrong_password_triggers_concrete_scenario() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    ctx.repo
        .update_user_by_email(&email, |u| u.failed_login_attempts = 4);

    assert_eq!(fail_login(&ctx, &email).await, StatusCode::UNAUTHORIZED);

    let user = ctx.repo.get_user_by_email(&email).unwrap();
    assert_eq!(user.failed_login_attempts, 5);
    let until = user.lockout_until.expect("locked");
    assert!(until > Utc::now() && until <= Utc::now() + Duration::minutes(15));

    // Even the correct password is refused inside the window.
    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn lockout_expires_automatically() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    for _ in 0..5 {
        fail_login(&ctx, &email).await;
    }

    ctx.repo.update_user_by_email(&email, |u| {
        u.lockout_until = Some(Utc::now() - Duration::seconds(1));
    });

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;

    response.assert_status(StatusCode::OK);

    // Success resets the counter and clears the stale lockout.
    let user = ctx.repo.get_user_by_email(&email).unwrap();
    assert_eq!(user.failed_login_attempts, 0);
    assert!(user.lockout_until.is_none());
}

#[tokio::test]
async fn successful_login_resets_failure_count() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    for _ in 0..3 {
        fail_login(&ctx, &email).await;
    }
    assert_eq!(
        ctx.repo
            .get_user_by_email(&email)
            .unwrap()
            .failed_login_attempts,
        3
    );

    ctx.server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(
        ctx.repo
            .get_user_by_email(&email)
            .unwrap()
            .failed_login_attempts,
        0
    );

    // Failures only count consecutively: the next one starts from 1.
    fail_login(&ctx, &email).await;
    assert_eq!(
        ctx.repo
            .get_user_by_email(&email)
            .unwrap()
            .failed_login_attempts,
        1
    );
}

#[tokio::test]
async fn lockout_emits_audit_event() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    for _ in 0..5 {
        fail_login(&ctx, &email).await;
    }

    let events = ctx.repo.events_of_type(SecurityEventType::Lockout);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].metadata["attempts"], 5);
}

#[tokio::test]
async fn admin_locked_flag_blocks_login_without_window() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    ctx.repo.update_user_by_email(&email, |u| u.is_locked = true);

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Account locked");
    assert!(body["retry_after"].is_null() || body.get("retry_after").is_none());
}
