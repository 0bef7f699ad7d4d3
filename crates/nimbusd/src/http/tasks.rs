use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use nimbus_controlplane::service::TaskSubmission;
use nimbus_controlplane::{Task, TaskResult};
use serde::Serialize;

use super::AppState;
use super::auth::AuthUser;
use super::error::{ApiJson, ApiResult};

/// Created task; `queue_warning` is set when it could not be queued
#[derive(Debug, Serialize)]
struct CreatedTask {
    #[serde(flatten)]
    task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_warning: Option<String>,
}

pub async fn list(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(state.plane.tasks().list_tasks(user.id())?))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<TaskSubmission>,
) -> ApiResult<impl IntoResponse> {
    let submission = state.plane.tasks().submit_task(user.id(), &input).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedTask {
            task: submission.task,
            queue_warning: submission.queue_warning,
        }),
    ))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.plane.tasks().get_task(user.id(), &id)?))
}

pub async fn results(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TaskResult>>> {
    Ok(Json(state.plane.tasks().list_results(user.id(), &id)?))
}
