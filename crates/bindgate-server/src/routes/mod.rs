//! Gate routes

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::Serialize;
use tracing::debug;

use crate::middleware::auth::AuthenticatedUser;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct AppsResponse {
    pub apps: Vec<String>,
    pub user: AuthenticatedUser,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// GET /apps
pub async fn list_apps(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    debug!(dn = %user.dn, "Listing registered apps");

    Json(AppsResponse {
        apps: state.config.gate.apps.clone(),
        user,
    })
}

/// GET /management/health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "UP",
            version: bindgate_core::VERSION,
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    )
}
