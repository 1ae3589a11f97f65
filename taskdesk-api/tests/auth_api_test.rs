/// Authentication, dashboard and health endpoint tests

mod common;

use axum::http::{Method, StatusCode};
use common::TestContext;
use serde_json::json;

fn registration(email: &str) -> serde_json::Value {
    json!({
        "name": "Dana",
        "email": email,
        "password": "correct horse",
        "passwordConfirmation": "correct horse",
        "role": "admin"
    })
}

#[tokio::test]
async fn test_register_creates_regular_user() {
    let ctx = TestContext::new().await;

    let (status, json) = ctx
        .json(Method::POST, "/v1/auth/register", None, Some(registration("dana@example.com")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["user"]["role"], "user");
    assert_eq!(json["tokenType"], "Bearer");
    assert!(json["accessToken"].is_string());
    assert!(json["user"].get("passwordHash").is_none());

    let token = json["accessToken"].as_str().unwrap();
    let (status, me) = ctx.json(Method::GET, "/v1/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "dana@example.com");

    let (status, json) = ctx
        .json(Method::POST, "/v1/auth/register", None, Some(registration("DANA@example.com")))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["details"][0]["field"], "email");
}

#[tokio::test]
async fn test_login_and_refresh() {
    let ctx = TestContext::new().await;
    ctx.json(Method::POST, "/v1/auth/register", None, Some(registration("dana@example.com")))
        .await;

    let (status, json) = ctx
        .json(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "dana@example.com", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid email or password");

    let (status, json) = ctx
        .json(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "Dana@Example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let access = json["accessToken"].as_str().unwrap().to_string();
    let refresh = json["refreshToken"].as_str().unwrap().to_string();

    let (status, _) = ctx
        .json(Method::POST, "/v1/auth/refresh", None, Some(json!({ "refreshToken": access })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, pair) = ctx
        .json(Method::POST, "/v1/auth/refresh", None, Some(json!({ "refreshToken": refresh })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(pair["accessToken"].is_string());

    // Refresh tokens are not accepted as bearer credentials
    let (status, _) = ctx.json(Method::GET, "/v1/me", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_credentials() {
    let ctx = TestContext::new().await;

    let (status, _) = ctx.json(Method::GET, "/v1/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = ctx.send(Method::GET, "/v1/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_dashboard_is_scoped() {
    let ctx = TestContext::new().await;
    ctx.seed_task(&ctx.alice, "A done", true).await;
    ctx.seed_task(&ctx.alice, "A open", false).await;
    ctx.seed_task(&ctx.bob, "B open", false).await;

    let (status, json) = ctx
        .json(Method::GET, "/v1/dashboard", Some(&ctx.alice_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["stats"],
        json!({ "totalTasks": 2, "completedTasks": 1, "pendingTasks": 1, "totalUsers": null })
    );
    assert_eq!(json["user"]["name"], "Alice");

    let (_, json) = ctx
        .json(Method::GET, "/v1/dashboard", Some(&ctx.admin_token), None)
        .await;
    assert_eq!(json["stats"]["totalTasks"], 3);
    assert_eq!(json["stats"]["pendingTasks"], 2);
    assert_eq!(json["stats"]["totalUsers"], 3);
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let ctx = TestContext::new().await;

    let response = ctx.send(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["cache-control"], "no-store");

    let (_, json) = ctx.json(Method::GET, "/health", None, None).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["storage"], "connected");
}
