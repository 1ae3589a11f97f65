/// Authentication middleware for Axum
///
/// Resolves the acting [`Principal`] once per request: the bearer token is
/// validated, then the account is re-read from the user store so that role
/// changes apply immediately and deleted accounts are rejected. The
/// principal is added to the request extensions for handlers to extract.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use axum::{middleware, routing::get, Extension, Router};
/// use taskdesk_shared::auth::middleware::{require_principal, AuthState, Principal};
/// use taskdesk_shared::repository::memory::MemoryRepository;
///
/// async fn whoami(Extension(principal): Extension<Principal>) -> String {
///     format!("{} ({})", principal.user_id, principal.role)
/// }
///
/// let state = AuthState::new("a-secret-of-at-least-thirty-two-bytes!!", Arc::new(MemoryRepository::new()));
/// let app: Router = Router::new()
///     .route("/whoami", get(whoami))
///     .layer(middleware::from_fn_with_state(state, require_principal));
/// ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};
use crate::models::user::{Role, User};
use crate::repository::UserRepository;

/// The authenticated identity making a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.role)
    }
}

/// Error type for authentication middleware
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing authorization header
    #[error("Missing credentials")]
    MissingCredentials,

    /// Authorization header is not `Bearer <token>`
    #[error("{0}")]
    InvalidFormat(String),

    /// Token validation failed
    #[error("{0}")]
    InvalidToken(String),

    /// Token is valid but the account no longer exists
    #[error("Account no longer exists")]
    UnknownUser,

    /// User store failure
    #[error("User lookup failed: {0}")]
    Lookup(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Lookup(ref details) => {
                tracing::error!(error = %details, "Principal resolution failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNAUTHORIZED,
        };

        let (error, message) = if status == StatusCode::UNAUTHORIZED {
            ("unauthorized", self.to_string())
        } else {
            ("internal_error", "An internal error occurred".to_string())
        };

        let body = serde_json::json!({ "error": error, "message": message });
        (status, Json(body)).into_response()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Validates an access token and loads the current account behind it
///
/// # Errors
///
/// - `InvalidToken` if the token is malformed, expired or not an access token
/// - `UnknownUser` if the subject no longer exists
/// - `Lookup` if the user store fails
pub async fn authenticate(
    token: &str,
    secret: &str,
    users: &dyn UserRepository,
) -> Result<(Principal, User), AuthError> {
    let claims = validate_access_token(token, secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        _ => AuthError::InvalidToken("Invalid token".to_string()),
    })?;

    let user = users
        .find_user(claims.sub)
        .await
        .map_err(|e| AuthError::Lookup(e.to_string()))?
        .ok_or(AuthError::UnknownUser)?;

    Ok((Principal::from(&user), user))
}

/// State captured by [`require_principal`]
#[derive(Clone)]
pub struct AuthState {
    pub secret: Arc<str>,
    pub users: Arc<dyn UserRepository>,
}

impl AuthState {
    pub fn new(secret: impl Into<Arc<str>>, users: Arc<dyn UserRepository>) -> Self {
        Self {
            secret: secret.into(),
            users,
        }
    }
}

/// Bearer authentication middleware
///
/// Inserts both the [`Principal`] and the freshly loaded [`User`] into the
/// request extensions.
///
/// # Errors
///
/// Returns 401 Unauthorized if the header is missing or malformed, the
/// token is invalid or expired, or the account was deleted.
pub async fn require_principal(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers())?;
    let (principal, user) = authenticate(token, &auth.secret, auth.users.as_ref()).await?;

    tracing::debug!(user_id = %principal.user_id, role = %principal.role, "Principal resolved");

    req.extensions_mut().insert(principal);
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AuthError::MissingCredentials)));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn test_auth_error_into_response() {
        assert_eq!(
            AuthError::MissingCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidFormat("bad".to_string()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Lookup("down".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_principal_from_user() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
            email_verified_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let principal = Principal::from(&user);
        assert_eq!(principal.user_id, user.id);
        assert!(principal.is_admin());
    }
}
