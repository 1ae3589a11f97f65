/// Admin user roster endpoints
///
/// All endpoints are admin only. Deletion goes through
/// [`UserRepository::delete_user`](taskdesk_shared::repository::UserRepository::delete_user),
/// which re-checks the self-deletion and last-admin rules against the
/// persisted admin count inside the same transaction as the delete.
///
/// # Endpoints
///
/// - `GET /v1/users` - Paged roster (10 per page, newest first) with counters
/// - `POST /v1/users` - Create a user with any role
/// - `GET /v1/users/:id` - User, 10 most recent tasks and task counters
/// - `PATCH /v1/users/:id` - Update name, email, role or password
/// - `DELETE /v1/users/:id` - Delete

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ApiJson,
    routes::non_blank,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use taskdesk_shared::{
    auth::{
        authorization::{require, Operation, Target},
        middleware::Principal,
        password,
    },
    models::{
        task::{Task, TaskStats},
        user::{CreateUser, Role, UpdateUser, User, UserFilter, UserStats},
    },
    query::{ListingEntryPoint, Page, PageRequest, Scope},
};
use uuid::Uuid;
use validator::Validate;

/// Tasks shown on the user detail view
const RECENT_TASKS: i64 = 10;

/// Roster query string
#[derive(Debug, Default, Deserialize)]
pub struct UserListParams {
    pub search: Option<String>,
    pub role: Option<String>,
    pub page: Option<i64>,
}

/// Roster page with counters over the whole roster
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    #[serde(flatten)]
    pub users: Page<User>,
    pub stats: UserStats,
}

/// User detail view
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetailResponse {
    pub user: User,
    pub recent_tasks: Vec<Task>,
    pub task_stats: TaskStats,
}

/// Create user request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "The name field is required and may not exceed 255 characters"))]
    pub name: String,

    #[serde(default)]
    #[validate(
        email(message = "The email must be a valid email address"),
        length(max = 255, message = "The email may not exceed 255 characters")
    )]
    pub email: String,

    #[serde(default)]
    pub password: String,

    #[serde(default, alias = "password_confirmation")]
    #[validate(must_match(other = "password", message = "The password confirmation does not match"))]
    pub password_confirmation: String,

    #[validate(required(message = "The role field is required"))]
    pub role: Option<Role>,
}

/// Update user request
///
/// A blank `password` leaves the current one in place.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 255, message = "The name field is required and may not exceed 255 characters"))]
    pub name: Option<String>,

    #[validate(
        email(message = "The email must be a valid email address"),
        length(max = 255, message = "The email may not exceed 255 characters")
    )]
    pub email: Option<String>,

    pub role: Option<Role>,

    pub password: Option<String>,

    #[serde(alias = "password_confirmation")]
    pub password_confirmation: Option<String>,
}

async fn load_user(state: &AppState, id: Uuid) -> ApiResult<User> {
    state
        .users
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

fn check_password(raw: &str) -> ApiResult<()> {
    password::validate_password(raw).map_err(|e| ApiError::invalid("password", e))
}

/// Paged roster
///
/// `search` matches name or email; an unknown `role` value is ignored.
pub async fn index(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<UserListParams>,
) -> ApiResult<Json<UserListResponse>> {
    require(&principal, Operation::ManageUsers, Target::None)?;

    let filter = UserFilter {
        search: non_blank(params.search).map(|s| s.trim().to_string()),
        role: params.role.as_deref().and_then(Role::parse),
    };
    let page = PageRequest::new(params.page, None, ListingEntryPoint::Api);

    let users = state.users.list_users(&filter, page).await?;
    let stats = state.users.user_stats().await?;

    Ok(Json(UserListResponse { users, stats }))
}

/// Create a user
pub async fn store(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    require(&principal, Operation::ManageUsers, Target::None)?;

    req.validate()?;
    check_password(&req.password)?;

    let role = req
        .role
        .ok_or_else(|| ApiError::invalid("role", "The role field is required"))?;

    let user = state
        .users
        .create_user(CreateUser {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            password_hash: password::hash_password(&req.password)?,
            role,
            email_verified_at: None,
        })
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, created_by = %principal.user_id, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

/// User detail
pub async fn show(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserDetailResponse>> {
    require(&principal, Operation::ManageUsers, Target::None)?;

    let user = load_user(&state, id).await?;
    let recent_tasks = state.tasks.recent_tasks(id, RECENT_TASKS).await?;
    let task_stats = state.tasks.task_stats(Scope::OwnedBy(id)).await?;

    Ok(Json(UserDetailResponse {
        user,
        recent_tasks,
        task_stats,
    }))
}

/// Update a user
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(mut req): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    require(&principal, Operation::ManageUsers, Target::None)?;

    req.password = non_blank(req.password);
    req.password_confirmation = non_blank(req.password_confirmation);
    req.validate()?;

    if req.password != req.password_confirmation {
        return Err(ApiError::invalid(
            "passwordConfirmation",
            "The password confirmation does not match",
        ));
    }

    let password_hash = match req.password.as_deref() {
        Some(raw) => {
            check_password(raw)?;
            Some(password::hash_password(raw)?)
        }
        None => None,
    };

    let changes = UpdateUser {
        name: req.name.map(|n| n.trim().to_string()),
        email: req.email.map(|e| e.trim().to_string()),
        role: req.role,
        password_hash,
    };

    let user = if changes.is_empty() {
        load_user(&state, id).await?
    } else {
        state
            .users
            .update_user(id, changes)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?
    };

    tracing::info!(user_id = %user.id, updated_by = %principal.user_id, "User updated");

    Ok(Json(user))
}

/// Delete a user
///
/// # Errors
///
/// - `403 self_deletion`: Caller targeted their own account
/// - `409 last_admin_protected`: Target is the only admin
/// - `409 owner_has_tasks`: Target still owns tasks
/// - `404 Not Found`: No such user
pub async fn destroy(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    require(&principal, Operation::ManageUsers, Target::None)?;

    if !state.users.delete_user(&principal, id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %id, deleted_by = %principal.user_id, "User deleted");

    Ok(Json(json!({ "message": "User deleted successfully" })))
}
