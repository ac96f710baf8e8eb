//! HTTP API for the control service.
//!
//! Provides endpoints for:
//! - Deployment management (create, list, delete)
//! - Liveness and health checks

mod deployments;

use std::sync::Arc;

use axum::{
    routing::{delete, get},
    Router,
};

use crate::deployment::DeploymentManager;

pub use deployments::{
    CreateDeploymentRequest, CreateDeploymentResponse, DeleteDeploymentResponse, ErrorResponse,
    ListDeploymentsResponse,
};

/// Shared application state for the control service.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Deployment manager for orchestrating deployments.
    pub manager: Arc<DeploymentManager>,
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        // Deployment management
        .route(
            "/deployments",
            get(deployments::list_deployments).post(deployments::create_deployment),
        )
        .route("/deployments/{name}", delete(deployments::delete_deployment))
        .with_state(state)
}

/// Liveness probe.
async fn ping() -> &'static str {
    "pong!"
}

/// Health check endpoint.
async fn health_check() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse { status: "healthy" })
}

/// Health response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
}
