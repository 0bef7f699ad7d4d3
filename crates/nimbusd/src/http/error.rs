//! Error responses
//!
//! Every failure leaves as `{"error": "<message>"}` with the status of its
//! kind. Store and cipher failures are logged and answered generically.

use axum::Json;
use axum::extract::FromRequest;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nimbus_controlplane::ControlPlaneError;

/// Response wrapper around [`ControlPlaneError`]
#[derive(Debug)]
pub struct ApiError(pub ControlPlaneError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn unauthorized(message: &str) -> Self {
        ApiError(ControlPlaneError::Unauthorized(message.to_string()))
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            ControlPlaneError::BadRequest(_)
            | ControlPlaneError::UnsupportedProvider(_)
            | ControlPlaneError::UnsupportedResourceType(_)
            | ControlPlaneError::UnsupportedTaskType(_) => StatusCode::BAD_REQUEST,
            ControlPlaneError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ControlPlaneError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlPlaneError::Conflict(_) => StatusCode::CONFLICT,
            ControlPlaneError::Upstream(_) | ControlPlaneError::Cloud(_) => StatusCode::BAD_GATEWAY,
            ControlPlaneError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ControlPlaneError::AdapterInit(_)
            | ControlPlaneError::Internal(_)
            | ControlPlaneError::Database(_)
            | ControlPlaneError::Secret(_)
            | ControlPlaneError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match &self.0 {
            ControlPlaneError::Database(_)
            | ControlPlaneError::Secret(_)
            | ControlPlaneError::Json(_)
            | ControlPlaneError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ControlPlaneError> for ApiError {
    fn from(err: ControlPlaneError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(ControlPlaneError::BadRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, %status, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }
        let body = serde_json::json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}

/// `Json` whose rejection is an [`ApiError`]
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
