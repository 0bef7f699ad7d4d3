//! HTTP API
//!
//! ```text
//! /health                         public
//! /api/auth/{register,login}      public
//! /api/user/profile               bearer
//! /api/credentials[/{id}]         bearer
//! /api/tasks[/{id}[/results]]     bearer
//! /api/cloud/*                    bearer, runs the adapter in-request
//! /api/analysis/*                 bearer
//! ```

mod analysis;
mod auth;
mod cloud;
mod credentials;
pub mod error;
mod tasks;

use axum::Json;
use axum::Router;
use axum::http::{HeaderName, Method, header};
use axum::routing::{get, post};
use nimbus_controlplane::ControlPlane;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub plane: ControlPlane,
}

impl AppState {
    pub fn new(plane: ControlPlane) -> Self {
        Self { plane }
    }
}

fn cors() -> CorsLayer {
    const HEADERS: [HeaderName; 3] = [header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION];
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(HEADERS)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/user/profile", get(auth::profile).put(auth::update_profile))
        .route("/credentials", get(credentials::list).post(credentials::create))
        .route(
            "/credentials/{id}",
            get(credentials::get)
                .put(credentials::update)
                .delete(credentials::delete),
        )
        .route("/tasks", get(tasks::list).post(tasks::create))
        .route("/tasks/{id}", get(tasks::get))
        .route("/tasks/{id}/results", get(tasks::results))
        .route("/cloud/enumerate", post(cloud::enumerate))
        .route("/cloud/escalate", post(cloud::escalate))
        .route("/cloud/operate", post(cloud::operate))
        .route("/cloud/takeover", post(cloud::takeover))
        .route(
            "/cloud/resources",
            get(cloud::resources).post(cloud::resources_by_body),
        )
        .route("/analysis/task-stats", get(analysis::task_stats))
        .route("/analysis/vulnerability-stats", get(analysis::vulnerability_stats))
        .route("/analysis/resource-stats", get(analysis::resource_stats))
        .route("/analysis/recent-findings", get(analysis::recent_findings));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}
