//! Deployment management endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::deployment::{CreatedDeployment, DeletedDeployment, LifecycleOutcome};
use crate::sink::TracingSink;
use crate::types::DeploymentInstance;

use super::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Request to create a new deployment.
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    /// Unique deployment name.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Port the application listens on.
    ///
    /// Accepted as a wide integer so out-of-range values are reported as
    /// validation errors rather than JSON parse errors.
    pub port: i64,
}

/// Response for a created deployment.
#[derive(Debug, Serialize)]
pub struct CreateDeploymentResponse {
    /// Deployment name.
    pub name: String,
    /// Container image.
    pub image: String,
    /// Application port.
    pub port: u16,
    /// Stack outputs.
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Creation timestamp.
    pub created_at: String,
}

impl From<CreatedDeployment> for CreateDeploymentResponse {
    fn from(created: CreatedDeployment) -> Self {
        Self {
            name: created.name,
            image: created.image,
            port: created.port,
            outputs: created.outputs,
            created_at: created.created_at.to_rfc3339(),
        }
    }
}

/// Response for a deleted deployment.
#[derive(Debug, Serialize)]
pub struct DeleteDeploymentResponse {
    /// Deployment name.
    pub name: String,
    /// Deletion timestamp.
    pub deleted_at: String,
}

impl From<DeletedDeployment> for DeleteDeploymentResponse {
    fn from(deleted: DeletedDeployment) -> Self {
        Self {
            name: deleted.name,
            deleted_at: deleted.deleted_at.to_rfc3339(),
        }
    }
}

/// Response for the deployment listing.
#[derive(Debug, Serialize)]
pub struct ListDeploymentsResponse {
    /// Known deployments.
    pub deployments: Vec<DeploymentInstance>,
    /// Why the listing is empty, when the engine could not be queried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Outcome tag, e.g. `already_exists`.
    pub kind: &'static str,
    /// Error message.
    pub error: String,
}

/// List deployments in the project.
pub async fn list_deployments(
    State(state): State<AppState>,
) -> (StatusCode, Json<ListDeploymentsResponse>) {
    let listing = state.manager.list().await;
    let status = if listing.outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ListDeploymentsResponse {
            error: listing.outcome.message(),
            deployments: listing.deployments,
        }),
    )
}

/// Create and provision a new deployment.
///
/// Responds once the engine reports the deployment up.
pub async fn create_deployment(
    State(state): State<AppState>,
    Json(request): Json<CreateDeploymentRequest>,
) -> Result<(StatusCode, Json<CreateDeploymentResponse>), ApiError> {
    info!(
        deployment = %request.name,
        image = %request.image,
        port = request.port,
        "creating deployment via API"
    );

    let sink = TracingSink::for_deployment(&request.name);
    let outcome = state
        .manager
        .create(&request.name, &request.image, request.port, &sink)
        .await;

    match outcome {
        LifecycleOutcome::Success(created) => Ok((StatusCode::CREATED, Json(created.into()))),
        other => Err(outcome_error(&other)),
    }
}

/// Destroy and remove a deployment.
pub async fn delete_deployment(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteDeploymentResponse>, ApiError> {
    info!(deployment = %name, "deleting deployment via API");

    let sink = TracingSink::for_deployment(&name);
    match state.manager.delete(&name, &sink).await {
        LifecycleOutcome::Success(deleted) => Ok(Json(deleted.into())),
        other => Err(outcome_error(&other)),
    }
}

fn outcome_error<T>(outcome: &LifecycleOutcome<T>) -> ApiError {
    (
        outcome_to_status(outcome),
        Json(ErrorResponse {
            kind: outcome.kind(),
            error: outcome.message().unwrap_or_default(),
        }),
    )
}

const fn outcome_to_status<T>(outcome: &LifecycleOutcome<T>) -> StatusCode {
    match outcome {
        LifecycleOutcome::Success(_) => StatusCode::OK,
        LifecycleOutcome::AlreadyExists { .. } | LifecycleOutcome::ConcurrentConflict { .. } => {
            StatusCode::CONFLICT
        }
        LifecycleOutcome::Invalid { .. } => StatusCode::BAD_REQUEST,
        LifecycleOutcome::PartialTeardown { .. } | LifecycleOutcome::Failure { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
