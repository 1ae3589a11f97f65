/// Request extractors
///
/// [`ApiJson`] wraps axum's `Json` so malformed bodies are answered with the
/// same `{error, message, details}` shape as every other failure. A value of
/// the wrong type is reported against the field that carried it:
///
/// ```json
/// { "error": "validation_error", "message": "Request validation failed",
///   "details": [{ "field": "dueDate", "message": "input contains invalid characters at line 1 column 31" }] }
/// ```

use axum::extract::FromRequest;

use crate::error::ApiError;

/// JSON request body with [`ApiError`] rejections
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
