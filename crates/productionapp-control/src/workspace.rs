//! Project-scoped access to the automation engine.

use std::sync::Arc;

use crate::engine::{AutomationEngine, DeploymentProgram, StackRef, StackSummary};
use crate::error::EngineResult;
use crate::types::{DeploymentName, DeploymentSpec, ProjectName};

/// Binds engine calls to one project.
///
/// Holds no state of its own: every call goes to the engine.
#[derive(Clone)]
pub struct Workspace {
    project: ProjectName,
    engine: Arc<dyn AutomationEngine>,
}

impl Workspace {
    /// Create a workspace for `project`.
    pub fn new(project: ProjectName, engine: Arc<dyn AutomationEngine>) -> Self {
        Self { project, engine }
    }

    /// Project this workspace is bound to.
    #[must_use]
    pub const fn project(&self) -> &ProjectName {
        &self.project
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &dyn AutomationEngine {
        self.engine.as_ref()
    }

    /// Reference to a stack in this project.
    #[must_use]
    pub fn stack(&self, name: &DeploymentName) -> StackRef {
        StackRef::new(self.project.clone(), name.clone())
    }

    /// All stacks in the project.
    pub async fn list_stacks(&self) -> EngineResult<Vec<StackSummary>> {
        self.engine.list_stacks(&self.project).await
    }

    /// Create a stack running a single deployment built from `spec`.
    pub async fn create_stack(&self, spec: &DeploymentSpec) -> EngineResult<StackRef> {
        let stack = self.stack(spec.name());
        self.engine
            .create_stack(&stack, &DeploymentProgram::Deployment(spec.clone()))
            .await?;
        Ok(stack)
    }

    /// Select an existing stack with a no-op program.
    pub async fn select_stack(&self, name: &DeploymentName) -> EngineResult<StackRef> {
        let stack = self.stack(name);
        self.engine
            .select_stack(&stack, &DeploymentProgram::Empty)
            .await?;
        Ok(stack)
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}
