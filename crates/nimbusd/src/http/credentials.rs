use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use nimbus_controlplane::Credential;
use nimbus_controlplane::service::{CredentialUpdate, NewCredential};
use serde_json::json;

use super::AppState;
use super::auth::AuthUser;
use super::error::{ApiJson, ApiResult};

pub async fn list(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<Credential>>> {
    Ok(Json(state.plane.credentials().list(user.id())?))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<NewCredential>,
) -> ApiResult<impl IntoResponse> {
    let created = state.plane.credentials().create(user.id(), &input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Credential>> {
    Ok(Json(state.plane.credentials().get(user.id(), &id)?))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<CredentialUpdate>,
) -> ApiResult<Json<Credential>> {
    Ok(Json(state.plane.credentials().update(user.id(), &id, &update)?))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.plane.credentials().delete(user.id(), &id)?;
    Ok(Json(json!({ "message": "Credential deleted successfully" })))
}
