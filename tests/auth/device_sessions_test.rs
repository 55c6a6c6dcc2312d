use axum::http::StatusCode;
use serde_json::json;

use identity_shared::config::policy::DeviceLimitPolicy;
use identity_shared::config::SecurityPolicy;

use crate::auth::login_test::register;
use crate::common::{test_email, test_password, TestContext};

async fn login_from_device(
    ctx: &TestContext,
    email: &str,
    device_id: &str,
) -> serde_json::Value {
    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": email,
            "password": test_password(),
            "device_id": device_id,
            "device_name": format!("device {device_id}")
        }))
        .await;
    response.assert_status(StatusCode::OK);
    response.json()
}

fn device_ids(body: &serde_json::Value) -> Vec<String> {
    body["devices"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["device_id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn admitting_past_the_cap_evicts_fifo() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    login_from_device(&ctx, &email, "A").await;
    login_from_device(&ctx, &email, "B").await;
    login_from_device(&ctx, &email, "C").await;
    let d = login_from_device(&ctx, &email, "D").await;

    let devices: serde_json::Value = ctx
        .server
        .get("/auth/devices")
        .authorization_bearer(d["access_token"].as_str().unwrap())
        .await
        .json();

    assert_eq!(device_ids(&devices), vec!["B", "C", "D"]);
}

#[tokio::test]
async fn eviction_revokes_the_evicted_devices_refresh_token() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    let a = login_from_device(&ctx, &email, "A").await;
    login_from_device(&ctx, &email, "B").await;
    login_from_device(&ctx, &email, "C").await;
    login_from_device(&ctx, &email, "D").await;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": a["refresh_token"].as_str().unwrap() }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Token revoked");
}

#[tokio::test]
async fn returning_device_reuses_its_session() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    login_from_device(&ctx, &email, "A").await;
    login_from_device(&ctx, &email, "B").await;
    login_from_device(&ctx, &email, "C").await;
    // Same device again: metadata refresh, no eviction.
    let a = login_from_device(&ctx, &email, "A").await;

    let devices: serde_json::Value = ctx
        .server
        .get("/auth/devices")
        .authorization_bearer(a["access_token"].as_str().unwrap())
        .await
        .json();

    assert_eq!(device_ids(&devices), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn reject_policy_refuses_login_at_the_cap() {
    let mut policy = SecurityPolicy::default();
    policy.devices.on_limit = DeviceLimitPolicy::Reject;
    let ctx = TestContext::with_policy(policy).await;

    let email = test_email();
    register(&ctx, &email).await;

    login_from_device(&ctx, &email, "A").await;
    login_from_device(&ctx, &email, "B").await;
    login_from_device(&ctx, &email, "C").await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": &email,
            "password": test_password(),
            "device_id": "D"
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Device limit exceeded");

    // A known device still gets in.
    login_from_device(&ctx, &email, "A").await;
}

#[tokio::test]
async fn user_can_revoke_a_single_device() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    let a = login_from_device(&ctx, &email, "A").await;
    let b = login_from_device(&ctx, &email, "B").await;
    let access_a = a["access_token"].as_str().unwrap();

    let response = ctx
        .server
        .delete("/auth/devices/B")
        .authorization_bearer(access_a)
        .await;
    response.assert_status(StatusCode::OK);

    let devices: serde_json::Value = ctx
        .server
        .get("/auth/devices")
        .authorization_bearer(access_a)
        .await
        .json();
    assert_eq!(device_ids(&devices), vec!["A"]);

    // B's refresh token died with the session.
    let refresh = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": b["refresh_token"].as_str().unwrap() }))
        .await;
    refresh.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoking_an_unknown_device_is_not_found() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;
    let a = login_from_device(&ctx, &email, "A").await;

    let response = ctx
        .server
        .delete("/auth/devices/nope")
        .authorization_bearer(a["access_token"].as_str().unwrap())
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn revoke_others_keeps_only_the_current_device() {
    let ctx = TestContext::new().await;
    let email = test_email();
    register(&ctx, &email).await;

    let a = login_from_device(&ctx, &email, "A").await;
    let b = login_from_device(&ctx, &email, "B").await;
    let c = login_from_device(&ctx, &email, "C").await;

    let response = ctx
        .server
        .post("/auth/devices/revoke-others")
        .authorization_bearer(c["access_token"].as_str().unwrap())
        .json(&json!({ "keep_device_id": "C" }))
        .await;
    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["revoked"].as_array().unwrap().len(), 2);

    let devices: serde_json::Value = ctx
        .server
        .get("/auth/devices")
        .authorization_bearer(c["access_token"].as_str().unwrap())
        .await
        .json();
    assert_eq!(device_ids(&devices), vec!["C"]);

    for evicted in [&a, &b] {
        let refresh = ctx
            .server
            .post("/auth/refresh")
            .json(&json!({ "refresh_token": evicted["refresh_token"].as_str().unwrap() }))
            .await;
        refresh.assert_status(StatusCode::UNAUTHORIZED);
    }
}
