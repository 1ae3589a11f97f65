/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register a new `user`-role account
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for a new pair
/// - `GET /v1/me` - Current account (bearer token required)
///
/// Registration never grants the admin role; admins are created by other
/// admins or with the `taskdesk-admin` CLI.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ApiJson,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use taskdesk_shared::{
    auth::{
        jwt::{self, TokenPair},
        password,
    },
    models::user::{CreateUser, Role, User},
};
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Display name
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "The name field is required and may not exceed 255 characters"))]
    pub name: String,

    /// Email address
    #[serde(default)]
    #[validate(
        email(message = "The email must be a valid email address"),
        length(max = 255, message = "The email may not exceed 255 characters")
    )]
    pub email: String,

    /// Password (strength checked separately)
    #[serde(default)]
    pub password: String,

    /// Must repeat `password`
    #[serde(default, alias = "password_confirmation")]
    #[validate(must_match(other = "password", message = "The password confirmation does not match"))]
    pub password_confirmation: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "The email must be a valid email address"))]
    pub email: String,

    /// Password
    pub password: String,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Refresh token
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
}

/// Tokens plus the account they were issued for
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// Content-Type: application/json
///
/// {
///   "name": "Jane Doe",
///   "email": "jane@example.com",
///   "password": "correct horse",
///   "passwordConfirmation": "correct horse"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed or email already taken
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;
    password::validate_password(&req.password).map_err(|e| ApiError::invalid("password", e))?;

    let password_hash = password::hash_password(&req.password)?;

    let user = state
        .users
        .create_user(CreateUser {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            password_hash,
            role: Role::User,
            email_verified_at: None,
        })
        .await?;

    tracing::info!(user_id = %user.id, "User registered");

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;

    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

/// Login endpoint
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
/// - `422 Unprocessable Entity`: Malformed email
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = state
        .users
        .find_user_by_email(req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected");
        return Err(invalid());
    }

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;

    Ok(Json(AuthResponse { user, tokens }))
}

/// Token refresh endpoint
///
/// The account must still exist; a deleted user's refresh token is useless.
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let (user_id, tokens) = jwt::refresh_token_pair(&req.refresh_token, state.jwt_secret())?;

    if state.users.find_user(user_id).await?.is_none() {
        return Err(ApiError::Unauthorized("Account no longer exists".to_string()));
    }

    Ok(Json(tokens))
}

/// Current account
pub async fn me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}
