/// Dashboard counters
///
/// ```text
/// GET /v1/dashboard
/// ```
///
/// Task counters follow the caller's scope. `totalUsers` is only filled in
/// for admins.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Extension, Json};
use serde::Serialize;
use taskdesk_shared::{
    auth::{authorization::scope_for, middleware::Principal},
    models::user::{User, UserSummary},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub pending_tasks: i64,
    pub total_users: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub stats: DashboardStats,
    pub user: UserSummary,
}

pub async fn index(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<DashboardResponse>> {
    let tasks = state.tasks.task_stats(scope_for(&principal)).await?;

    let total_users = if principal.is_admin() {
        Some(state.users.user_stats().await?.total)
    } else {
        None
    };

    Ok(Json(DashboardResponse {
        stats: DashboardStats {
            total_tasks: tasks.total,
            completed_tasks: tasks.completed,
            pending_tasks: tasks.pending,
            total_users,
        },
        user: user.summary(),
    }))
}
