//! In-request cloud operations
//!
//! Each call runs the adapter inside the request and still leaves a
//! finished task behind for history.

use axum::Json;
use axum::extract::{Query, State};
use nimbus_cloud::OperateRequest;
use nimbus_controlplane::Operation;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::AppState;
use super::auth::AuthUser;
use super::error::{ApiJson, ApiResult};

#[derive(Debug, Deserialize)]
pub struct EnumerateRequest {
    pub credential_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialRef {
    pub credential_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OperateBody {
    pub credential_id: String,
    pub resource_type: String,
    pub action: String,
    pub resource_id: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

pub async fn enumerate(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<EnumerateRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .plane
        .tasks()
        .run_inline(
            user.id(),
            &input.credential_id,
            input.region.as_deref(),
            Operation::Enumerate {
                resource_type: input.resource_type.clone(),
            },
        )
        .await?;
    Ok(Json(json!({
        "message": "Resource enumeration completed",
        "credential": outcome.credential_name,
        "resource_type": input.resource_type,
        "result": outcome.result,
        "task_id": outcome.task_id,
    })))
}

pub async fn escalate(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<CredentialRef>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .plane
        .tasks()
        .run_inline(user.id(), &input.credential_id, None, Operation::Escalate)
        .await?;
    Ok(Json(json!({
        "message": "Privilege escalation completed",
        "credential": outcome.credential_name,
        "result": outcome.result,
        "task_id": outcome.task_id,
    })))
}

pub async fn operate(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<OperateBody>,
) -> ApiResult<Json<Value>> {
    let mut request = OperateRequest::new(&input.resource_type, &input.action, &input.resource_id);
    request.params = input.params;
    request
        .params
        .insert("resource_type".into(), Value::String(input.resource_type.clone()));
    request
        .params
        .insert("action".into(), Value::String(input.action.clone()));
    request
        .params
        .insert("resource_id".into(), Value::String(input.resource_id.clone()));

    let outcome = state
        .plane
        .tasks()
        .run_inline(user.id(), &input.credential_id, None, Operation::Operate(request))
        .await?;
    Ok(Json(json!({
        "message": "Resource operation completed",
        "credential": outcome.credential_name,
        "resource_type": input.resource_type,
        "action": input.action,
        "resource_id": input.resource_id,
        "result": outcome.result,
        "task_id": outcome.task_id,
    })))
}

pub async fn takeover(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<CredentialRef>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .plane
        .tasks()
        .run_inline(user.id(), &input.credential_id, None, Operation::Takeover)
        .await?;
    Ok(Json(json!({
        "message": "Cloud platform takeover completed",
        "credential": outcome.credential_name,
        "result": outcome.result,
        "task_id": outcome.task_id,
    })))
}

fn cached(state: &AppState, user: &AuthUser, credential_id: &str) -> ApiResult<Json<Value>> {
    let last = state
        .plane
        .tasks()
        .fetch_last_enumeration(user.id(), credential_id)?;
    Ok(Json(json!({
        "message": "Resources fetched from database",
        "credential": last.credential_name,
        "result": last.result,
        "task_id": last.task_id,
        "timestamp": last.timestamp,
    })))
}

/// `GET /api/cloud/resources?credential_id=`
pub async fn resources(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<CredentialRef>,
) -> ApiResult<Json<Value>> {
    cached(&state, &user, &query.credential_id)
}

/// `POST /api/cloud/resources` with `{"credential_id": ...}`
pub async fn resources_by_body(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<CredentialRef>,
) -> ApiResult<Json<Value>> {
    cached(&state, &user, &input.credential_id)
}
