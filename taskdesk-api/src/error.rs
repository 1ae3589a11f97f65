/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers return `Result<T, ApiError>`; every shared-crate error has a
/// `From` conversion so handlers can use `?` throughout.
///
/// # Response Format
///
/// ```json
/// { "error": "validation_error", "message": "Request validation failed",
///   "details": [{ "field": "dueDate", "message": "..." }] }
/// ```
///
/// Internal errors are logged and replaced with an opaque message.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use taskdesk_shared::auth::authorization::AuthzError;
use taskdesk_shared::auth::jwt::JwtError;
use taskdesk_shared::auth::middleware::AuthError;
use taskdesk_shared::auth::password::PasswordError;
use taskdesk_shared::models::task::TaskValidationError;
use taskdesk_shared::repository::RepositoryError;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400) - unreadable body
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Forbidden (403) with code `self_deletion`
    SelfDeletion,

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) with code `last_admin_protected`
    LastAdminProtected,

    /// Conflict (409) with code `owner_has_tasks`
    OwnerHasTasks,

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    InternalError(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation (camelCase, as sent by the client)
    pub field: String,

    /// Error message
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "not_found", "self_deletion")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::SelfDeletion => write!(f, "Forbidden: {}", AuthzError::SelfDeletion),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::LastAdminProtected => {
                write!(f, "Conflict: {}", AuthzError::LastAdminProtected)
            }
            ApiError::OwnerHasTasks => write!(f, "Conflict: user still owns tasks"),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::SelfDeletion => (
                StatusCode::FORBIDDEN,
                "self_deletion",
                AuthzError::SelfDeletion.to_string(),
                None,
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::LastAdminProtected => (
                StatusCode::CONFLICT,
                "last_admin_protected",
                AuthzError::LastAdminProtected.to_string(),
                None,
            ),
            ApiError::OwnerHasTasks => (
                StatusCode::CONFLICT,
                "owner_has_tasks",
                "Cannot delete a user who still owns tasks".to_string(),
                None,
            ),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Convert repository errors to API errors
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OwnerNotFound => {
                ApiError::invalid("userId", "The selected user does not exist")
            }
            RepositoryError::Validation(errors) => errors.into(),
            RepositoryError::DuplicateEmail => {
                ApiError::invalid("email", "The email has already been taken")
            }
            RepositoryError::Authorization(err) => err.into(),
            RepositoryError::OwnerHasTasks => ApiError::OwnerHasTasks,
            RepositoryError::ConflictRace => {
                ApiError::InternalError("Conflict persisted after retry".to_string())
            }
            RepositoryError::Database(err) => {
                ApiError::InternalError(format!("Database error: {}", err))
            }
        }
    }
}

/// Convert task rule violations to API errors
impl From<Vec<TaskValidationError>> for ApiError {
    fn from(errors: Vec<TaskValidationError>) -> Self {
        ApiError::ValidationError(
            errors
                .iter()
                .map(|e| ValidationErrorDetail::new(e.field(), e.to_string()))
                .collect(),
        )
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Forbidden => ApiError::Forbidden(err.to_string()),
            AuthzError::SelfDeletion => ApiError::SelfDeletion,
            AuthzError::LastAdminProtected => ApiError::LastAdminProtected,
        }
    }
}

/// Convert auth errors to API errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Lookup(msg) => ApiError::InternalError(msg),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

/// Convert JWT errors to API errors
impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            _ => ApiError::Unauthorized("Invalid token".to_string()),
        }
    }
}

/// Field path and message of a body that parsed as JSON but not as the
/// target type
fn rejected_field(err: &(dyn std::error::Error + 'static)) -> Option<(String, String)> {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(path_err) = e.downcast_ref::<serde_path_to_error::Error<serde_json::Error>>() {
            let path = path_err.path().to_string();
            let field = if path == "." { "body".to_string() } else { path };
            return Some((field, path_err.inner().to_string()));
        }
        source = e.source();
    }
    None
}

/// Convert JSON body rejections to API errors
///
/// Bodies of the wrong shape are a 422 on the offending field; bodies that
/// are not JSON at all are a 400.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => match rejected_field(&err) {
                Some((field, message)) => ApiError::invalid(&field, message),
                None => ApiError::invalid("body", err.body_text()),
            },
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert request validation failures to API errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = camel_case(&field);
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("The {} field is invalid", field));
                    ValidationErrorDetail::new(field.clone(), message)
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::ValidationError(details)
    }
}
