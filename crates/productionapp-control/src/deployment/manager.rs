//! Core deployment orchestration logic.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::sink::OutputSink;
use crate::state::{Active, Lifecycle, Requested};
use crate::types::{DeploymentInstance, DeploymentName, DeploymentSpec};
use crate::workspace::Workspace;

use super::outcome::{CreatedDeployment, DeletedDeployment, DeploymentListing, LifecycleOutcome};

/// Orchestrates deployment lifecycle operations.
///
/// The manager keeps no record of which deployments exist; the engine is
/// the only source of truth and is asked on every call. It holds no locks
/// either: conflicting mutations are serialised by the engine and reported
/// back as [`LifecycleOutcome::ConcurrentConflict`].
#[derive(Debug, Clone)]
pub struct DeploymentManager {
    workspace: Workspace,
}

impl DeploymentManager {
    /// Create a new deployment manager.
    #[must_use]
    pub const fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// The workspace this manager operates in.
    #[must_use]
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// List deployments in the project.
    ///
    /// Never fails: an engine error yields an empty listing with a
    /// `Failure` outcome.
    pub async fn list(&self) -> DeploymentListing {
        match self.workspace.list_stacks().await {
            Ok(stacks) => DeploymentListing {
                deployments: stacks.into_iter().map(DeploymentInstance::from).collect(),
                outcome: LifecycleOutcome::Success(()),
            },
            Err(e) => {
                warn!(project = %self.workspace.project(), error = %e, "failed to list deployments");
                DeploymentListing {
                    deployments: Vec::new(),
                    outcome: Err::<(), _>(ControlError::from(e)).into(),
                }
            }
        }
    }

    /// Create and provision a new deployment.
    ///
    /// Blocks until the engine reports the deployment is up. Progress is
    /// forwarded to `sink`. A name that is already taken yields
    /// `AlreadyExists` and leaves the existing deployment untouched.
    pub async fn create(
        &self,
        name: &str,
        image: &str,
        port: i64,
        sink: &dyn OutputSink,
    ) -> LifecycleOutcome<CreatedDeployment> {
        let spec = match DeploymentSpec::new(name, image, port) {
            Ok(spec) => spec,
            Err(e) => {
                info!(deployment = %name, error = %e, "rejected deployment request");
                return Err::<CreatedDeployment, _>(e).into();
            }
        };

        self.create_spec(spec, sink).await
    }

    /// Create and provision a deployment from a validated descriptor.
    pub async fn create_spec(
        &self,
        spec: DeploymentSpec,
        sink: &dyn OutputSink,
    ) -> LifecycleOutcome<CreatedDeployment> {
        let name = spec.name().clone();
        let result = self.try_create(spec, sink).await;

        match &result {
            Ok(created) => info!(deployment = %name, outputs = ?created.outputs, "deployment created"),
            Err(e @ ControlError::AlreadyExists(_)) => info!(deployment = %name, "{e}"),
            Err(e) => error!(deployment = %name, error = %e, "deployment failed"),
        }

        result.into()
    }

    async fn try_create(
        &self,
        spec: DeploymentSpec,
        sink: &dyn OutputSink,
    ) -> ControlResult<CreatedDeployment> {
        let requested = Lifecycle::<Requested>::new(&spec);

        info!(
            deployment = %requested.name(),
            project = %self.workspace.project(),
            image = %spec.image(),
            port = spec.port(),
            "creating deployment"
        );

        let stack = self.workspace.create_stack(&spec).await?;
        let provisioning = requested.start_provisioning();
        info!(deployment = %provisioning.name(), state = provisioning.state_name(), "stack created");

        // If this fails the stack record stays behind; a later delete cleans it up.
        let summary = self.workspace.engine().up(&stack, sink).await?;
        let active = provisioning.activate(summary);

        Ok(CreatedDeployment {
            name: active.name().to_string(),
            image: spec.image().to_owned(),
            port: spec.port(),
            outputs: active.summary().outputs.clone(),
            created_at: active.since(),
        })
    }

    /// Destroy a deployment's resources and remove its stack.
    ///
    /// If resources are destroyed but the stack record cannot be removed,
    /// the result is `PartialTeardown`; nothing is retried.
    pub async fn delete(
        &self,
        name: &str,
        sink: &dyn OutputSink,
    ) -> LifecycleOutcome<DeletedDeployment> {
        // A name that fails validation can never have been created.
        let name = match DeploymentName::parse(name) {
            Ok(name) => name,
            Err(e) => {
                return LifecycleOutcome::Failure {
                    message: format!("no deployment named '{name}': {e}"),
                }
            }
        };

        let result = self.try_delete(name.clone(), sink).await;

        match &result {
            Ok(_) => info!(deployment = %name, "deployment deleted"),
            Err(e @ ControlError::ConcurrentConflict(_)) => warn!(deployment = %name, "{e}"),
            Err(e) => error!(deployment = %name, error = %e, "deployment deletion failed"),
        }

        result.into()
    }

    async fn try_delete(
        &self,
        name: DeploymentName,
        sink: &dyn OutputSink,
    ) -> ControlResult<DeletedDeployment> {
        info!(deployment = %name, project = %self.workspace.project(), "deleting deployment");

        let stack = self.workspace.select_stack(&name).await?;
        let destroying = Lifecycle::<Active>::selected(name).start_destroying();

        self.workspace.engine().destroy(&stack, sink).await?;
        info!(deployment = %destroying.name(), "resources destroyed");

        if let Err(e) = self.workspace.engine().remove_stack(&stack).await {
            return Err(ControlError::PartialTeardown {
                name: destroying.name().to_string(),
                message: e.to_string(),
            });
        }

        let removed = destroying.remove();
        Ok(DeletedDeployment {
            name: removed.name().to_string(),
            deleted_at: Utc::now(),
        })
    }
}
