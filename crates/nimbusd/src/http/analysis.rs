use axum::Json;
use axum::extract::State;
use nimbus_controlplane::service::{RecentFinding, ResourceStat, TaskStats, VulnerabilityStat};

use super::AppState;
use super::auth::AuthUser;
use super::error::ApiResult;

pub async fn task_stats(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<TaskStats>> {
    Ok(Json(state.plane.stats().task_stats(user.id())?))
}

pub async fn vulnerability_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<VulnerabilityStat>>> {
    Ok(Json(state.plane.stats().vulnerability_stats(user.id())?))
}

pub async fn resource_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<ResourceStat>>> {
    Ok(Json(state.plane.stats().resource_stats(user.id())?))
}

pub async fn recent_findings(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<RecentFinding>>> {
    Ok(Json(state.plane.stats().recent_findings(user.id())?))
}
