/// Task endpoints
///
/// Every handler receives the [`Principal`] resolved by the bearer
/// middleware. Listings and the export are scoped with
/// [`scope_for`] before any user-supplied filter; single-task operations
/// load the task first and then ask the policy, so a missing task is a 404
/// and someone else's task is a 403. Mutations carry the same scope down to
/// the write, so a task reassigned after the check is left untouched.
///
/// # Endpoints
///
/// - `GET /v1/tasks` - Paged listing, 10 per page by default
/// - `GET /v1/tasks/page` - Paged listing, 5 per page by default
/// - `POST /v1/tasks` - Create (admin only)
/// - `GET /v1/tasks/export` - CSV of every visible task
/// - `GET /v1/tasks/:id` - Show
/// - `PATCH /v1/tasks/:id` - Partial update
/// - `DELETE /v1/tasks/:id` - Delete
/// - `PATCH /v1/tasks/:id/toggle` - Flip `completed`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ApiJson,
    routes::{deserialize_some, non_blank},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use taskdesk_shared::{
    auth::{
        authorization::{require, scope_for, Operation, Target},
        middleware::Principal,
    },
    export::csv_stream,
    models::task::{NewTask, Task, TaskChanges},
    query::{ListParams, ListingEntryPoint, Page},
    repository::today,
};
use uuid::Uuid;

/// Create task request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,

    pub description: Option<String>,

    pub due_date: Option<NaiveDate>,

    /// Owner of the new task
    #[serde(alias = "user_id")]
    pub user_id: Option<Uuid>,

    #[serde(default)]
    pub completed: bool,
}

/// Partial task update
///
/// `description` and `dueDate` accept an explicit `null` to clear them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,

    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,

    #[serde(default, alias = "due_date", deserialize_with = "deserialize_some")]
    pub due_date: Option<Option<NaiveDate>>,

    pub completed: Option<bool>,

    /// Reassign the task (honoured for admins only)
    #[serde(alias = "user_id")]
    pub user_id: Option<Uuid>,
}

impl UpdateTaskRequest {
    fn into_changes(self, principal: &Principal) -> TaskChanges {
        TaskChanges {
            title: self.title,
            description: self.description.map(non_blank),
            due_date: self.due_date,
            completed: self.completed,
            owner_user_id: self.user_id.filter(|_| principal.is_admin()),
        }
    }
}

async fn load_task(state: &AppState, id: Uuid) -> ApiResult<Task> {
    state
        .tasks
        .find_task(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

/// Error for a mutation that matched no row: 403 if the task now belongs
/// to someone else, 404 if it is gone
async fn unmatched(state: &AppState, principal: &Principal, operation: Operation, id: Uuid) -> ApiError {
    match load_task(state, id).await {
        Ok(task) => match require(principal, operation, Target::task(&task)) {
            Err(denied) => denied.into(),
            Ok(()) => ApiError::NotFound("Task not found".to_string()),
        },
        Err(err) => err,
    }
}

async fn list(
    state: &AppState,
    principal: &Principal,
    params: &ListParams,
    entry: ListingEntryPoint,
) -> ApiResult<Page<Task>> {
    require(principal, Operation::ListTasks, Target::None)?;

    let query = params.to_query(scope_for(principal));
    let page = state
        .tasks
        .query_tasks(&query, params.page_request(entry))
        .await?;

    Ok(page)
}

/// Paged task listing for API clients
pub async fn index(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Task>>> {
    list(&state, &principal, &params, ListingEntryPoint::Api)
        .await
        .map(Json)
}

/// Paged task listing with the smaller page size used by the web client
pub async fn page(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Task>>> {
    list(&state, &principal, &params, ListingEntryPoint::Page)
        .await
        .map(Json)
}

/// Create a task on behalf of any user
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin
/// - `422 Unprocessable Entity`: Invalid fields or unknown `userId`
pub async fn store(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    require(&principal, Operation::CreateTask, Target::None)?;

    let owner_user_id = req
        .user_id
        .ok_or_else(|| ApiError::invalid("userId", "The user field is required"))?;

    let new_task = NewTask {
        title: req.title,
        description: non_blank(req.description),
        due_date: req.due_date,
        owner_user_id,
        completed: req.completed,
    };
    new_task.validate(today())?;

    let task = state.tasks.insert_task(new_task).await?;

    tracing::info!(
        task_id = %task.id,
        owner_user_id = %task.owner_user_id,
        created_by = %principal.user_id,
        "Task created"
    );

    Ok((StatusCode::CREATED, Json(task)))
}

/// Show one task
pub async fn show(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = load_task(&state, id).await?;
    require(&principal, Operation::ReadTask, Target::task(&task))?;

    Ok(Json(task))
}

/// Partially update a task
///
/// A `userId` sent by a non-admin is ignored.
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let task = load_task(&state, id).await?;
    require(&principal, Operation::UpdateTask, Target::task(&task))?;

    let changes = req.into_changes(&principal);
    changes.validate(today())?;

    match state.tasks.update_task(id, scope_for(&principal), changes).await? {
        Some(updated) => Ok(Json(updated)),
        None => Err(unmatched(&state, &principal, Operation::UpdateTask, id).await),
    }
}

/// Delete a task
pub async fn destroy(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let task = load_task(&state, id).await?;
    require(&principal, Operation::DeleteTask, Target::task(&task))?;

    if !state.tasks.delete_task(id, scope_for(&principal)).await? {
        return Err(unmatched(&state, &principal, Operation::DeleteTask, id).await);
    }

    tracing::info!(task_id = %id, deleted_by = %principal.user_id, "Task deleted");

    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

/// Flip a task between completed and pending
pub async fn toggle(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = load_task(&state, id).await?;
    require(&principal, Operation::ToggleTask, Target::task(&task))?;

    match state.tasks.toggle_task(id, scope_for(&principal)).await? {
        Some(toggled) => Ok(Json(toggled)),
        None => Err(unmatched(&state, &principal, Operation::ToggleTask, id).await),
    }
}

/// Stream every visible task as CSV
///
/// Honours the same `status` and `search` filters as the listings;
/// pagination parameters are ignored.
pub async fn export(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    require(&principal, Operation::ExportTasks, Target::None)?;

    let query = params.to_query(scope_for(&principal));
    let body = Body::from_stream(csv_stream(state.tasks.stream_tasks(query)));

    tracing::info!(user_id = %principal.user_id, "Task export started");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"tasks.csv\""),
        ],
        body,
    ))
}
