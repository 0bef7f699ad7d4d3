//! Bearer authentication and the account routes

use axum::extract::{FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::Json;
use nimbus_controlplane::Claims;
use nimbus_controlplane::model::User;
use nimbus_controlplane::service::{ProfileUpdate, Registration};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use super::error::{ApiError, ApiJson, ApiResult};

/// Claims of the caller, from `Authorization: Bearer <jwt>`
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.user_id
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Authorization header required"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Authorization header format must be Bearer {token}"))?;

        let claims = state.plane.tokens.verify(token.trim())?;
        Ok(AuthUser(claims))
    }
}

/// Public shape of a user
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<Registration>,
) -> ApiResult<impl IntoResponse> {
    let registered = state.plane.auth().register(&input)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "user": UserView::from(registered.user),
            "token": registered.token,
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state.plane.auth().login(&input.username, &input.password)?;
    tracing::info!(user_id = %session.user.id, "login");
    Ok(Json(json!({
        "message": "Login successful",
        "user": UserView::from(session.user),
        "token": session.token,
    })))
}

pub async fn profile(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<UserView>> {
    Ok(Json(state.plane.auth().profile(user.id())?.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.plane.auth().update_profile(user.id(), &update)?;
    Ok(Json(json!({
        "message": "User updated successfully",
        "user": UserView::from(updated),
    })))
}
