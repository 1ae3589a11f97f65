#![allow(dead_code)]

//! Common test utilities for API integration tests
//!
//! Builds the full router over a fresh in-memory repository seeded with
//! one admin and two regular users (Alice and Bob), each with a valid
//! access token.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use taskdesk_api::app::{build_router, AppState};
use taskdesk_api::config::Config;
use taskdesk_shared::auth::jwt::issue_token_pair;
use taskdesk_shared::models::task::{NewTask, Task};
use taskdesk_shared::models::user::{CreateUser, Role, User};
use taskdesk_shared::repository::memory::MemoryRepository;
use taskdesk_shared::repository::{TaskRepository, UserRepository};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";

/// Test context containing all necessary resources
pub struct TestContext {
    pub repo: Arc<MemoryRepository>,
    pub app: Router,
    pub admin: User,
    pub alice: User,
    pub bob: User,
    pub admin_token: String,
    pub alice_token: String,
    pub bob_token: String,
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "STORAGE_BACKEND" => Some("memory".to_string()),
        "JWT_SECRET" => Some(JWT_SECRET.to_string()),
        _ => None,
    })
    .expect("test config")
}

pub fn token_for(user: &User) -> String {
    issue_token_pair(user.id, JWT_SECRET)
        .expect("token")
        .access_token
}

impl TestContext {
    pub async fn new() -> Self {
        let repo = Arc::new(MemoryRepository::new());

        let admin = seed_user(&repo, "Admin", "admin@example.com", Role::Admin).await;
        let alice = seed_user(&repo, "Alice", "alice@example.com", Role::User).await;
        let bob = seed_user(&repo, "Bob", "bob@example.com", Role::User).await;

        let state = AppState::new(repo.clone(), repo.clone(), test_config());
        let app = build_router(state);

        TestContext {
            admin_token: token_for(&admin),
            alice_token: token_for(&alice),
            bob_token: token_for(&bob),
            repo,
            app,
            admin,
            alice,
            bob,
        }
    }

    /// Inserts a task directly through the repository
    pub async fn seed_task(&self, owner: &User, title: &str, completed: bool) -> Task {
        self.repo
            .insert_task(NewTask {
                title: title.to_string(),
                description: None,
                due_date: None,
                owner_user_id: owner.id,
                completed,
            })
            .await
            .expect("seed task")
    }

    /// Sends a request and returns the raw response
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.app.clone().oneshot(request).await.expect("response")
    }

    /// Sends a request and parses the JSON body
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(method, uri, token, body).await;
        let status = response.status();
        let bytes = body_bytes(response).await;

        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                panic!("Expected JSON from {}, got {}", uri, String::from_utf8_lossy(&bytes))
            })
        };

        (status, value)
    }
}

pub async fn seed_user(repo: &MemoryRepository, name: &str, email: &str, role: Role) -> User {
    repo.create_user(CreateUser {
        name: name.to_string(),
        email: email.to_string(),
        password_hash: "test_hash".to_string(),
        role,
        email_verified_at: None,
    })
    .await
    .expect("seed user")
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

pub fn ids(page: &Value) -> Vec<Uuid> {
    page["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|t| t["id"].as_str().expect("id").parse().expect("uuid"))
        .collect()
}
