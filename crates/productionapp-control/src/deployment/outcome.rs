//! Outcomes of lifecycle operations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ControlError, ControlResult};
use crate::types::DeploymentInstance;

/// Result of a lifecycle operation, as shown to the caller.
///
/// Every error is folded into exactly one of these tags at the orchestrator
/// boundary; nothing propagates past it.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleOutcome<T> {
    /// The operation completed.
    Success(T),
    /// A deployment with this name is already live.
    AlreadyExists {
        /// Deployment name.
        name: String,
    },
    /// Another operation is mutating this deployment; retry later.
    ConcurrentConflict {
        /// Deployment name.
        name: String,
    },
    /// Resources were destroyed but the stack record lingers and needs an operator.
    PartialTeardown {
        /// Deployment name.
        name: String,
        /// Error reported while removing the record.
        message: String,
    },
    /// The request was malformed and never reached the engine.
    Invalid {
        /// What was wrong.
        message: String,
    },
    /// Any other failure, with the engine's message passed through.
    Failure {
        /// Error message.
        message: String,
    },
}

impl<T> LifecycleOutcome<T> {
    /// Machine-readable tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::AlreadyExists { .. } => "already_exists",
            Self::ConcurrentConflict { .. } => "concurrent_conflict",
            Self::PartialTeardown { .. } => "partial_teardown",
            Self::Invalid { .. } => "invalid",
            Self::Failure { .. } => "failure",
        }
    }

    /// Whether the operation completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Human-readable message for anything but success.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Success(_) => None,
            Self::AlreadyExists { name } => Some(format!(
                "deployment '{name}' already exists, pick a unique name"
            )),
            Self::ConcurrentConflict { name } => Some(format!(
                "deployment '{name}' already has an update in progress"
            )),
            Self::PartialTeardown { name, message } => Some(format!(
                "deployment '{name}' was destroyed but its stack record could not be removed: {message}"
            )),
            Self::Invalid { message } | Self::Failure { message } => Some(message.clone()),
        }
    }

    /// The success value, if any.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<ControlResult<T>> for LifecycleOutcome<T> {
    fn from(result: ControlResult<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(ControlError::AlreadyExists(name)) => Self::AlreadyExists { name },
            Err(ControlError::ConcurrentConflict(name)) => Self::ConcurrentConflict { name },
            Err(ControlError::PartialTeardown { name, message }) => {
                Self::PartialTeardown { name, message }
            }
            Err(err @ ControlError::Validation(_)) => Self::Invalid {
                message: err.to_string(),
            },
            Err(err) => Self::Failure {
                message: err.to_string(),
            },
        }
    }
}

/// A deployment that was created and is up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedDeployment {
    /// Deployment name.
    pub name: String,
    /// Container image.
    pub image: String,
    /// Application port.
    pub port: u16,
    /// Stack outputs reported by the engine (e.g. `url`).
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// When the engine reported the deployment up.
    pub created_at: DateTime<Utc>,
}

/// A deployment that was destroyed and removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedDeployment {
    /// Deployment name.
    pub name: String,
    /// When the stack record was removed.
    pub deleted_at: DateTime<Utc>,
}

/// Deployments currently known to the project.
///
/// When the engine cannot be queried, `deployments` is empty and `outcome`
/// carries the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentListing {
    /// Deployments, ordered by name.
    pub deployments: Vec<DeploymentInstance>,
    /// Whether the listing succeeded.
    pub outcome: LifecycleOutcome<()>,
}

impl DeploymentListing {
    /// Names of the listed deployments.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.deployments.iter().map(|d| d.name.as_str()).collect()
    }
}
