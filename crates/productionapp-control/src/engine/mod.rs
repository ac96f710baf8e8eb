//! Automation engine capability.
//!
//! The engine owns all infrastructure state: which stacks exist, what they
//! contain, and the plan/apply machinery that reconciles them. This module
//! defines the narrow set of operations the control service needs from it.
//! [`CliEngine`] drives the `pulumi` CLI; [`MockEngine`] is an in-memory
//! double for tests.

mod cli;
mod mock;

pub use cli::CliEngine;
pub use mock::{MockEngine, UpdateGate};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, EngineType};
use crate::error::{ControlResult, EngineResult};
use crate::sink::OutputSink;
use crate::types::{DeploymentInstance, DeploymentName, DeploymentSpec, ProjectName};

/// Fully qualified reference to one stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackRef {
    /// Project the stack belongs to.
    pub project: ProjectName,
    /// Stack name.
    pub name: DeploymentName,
}

impl StackRef {
    /// Create a new stack reference.
    #[must_use]
    pub const fn new(project: ProjectName, name: DeploymentName) -> Self {
        Self { project, name }
    }
}

impl fmt::Display for StackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}

/// The program a stack is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentProgram {
    /// A single Deployment component built from the descriptor.
    Deployment(DeploymentSpec),
    /// No resources. Used when a stack is only selected for teardown.
    Empty,
}

/// A stack as listed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSummary {
    /// Stack name.
    pub name: String,
    /// Last update time.
    #[serde(default)]
    pub last_update: Option<String>,
    /// Whether an update is currently running.
    #[serde(default)]
    pub update_in_progress: bool,
    /// Number of resources in the stack.
    #[serde(default)]
    pub resource_count: Option<u64>,
    /// Backend URL for the stack.
    #[serde(default)]
    pub url: Option<String>,
}

impl From<StackSummary> for DeploymentInstance {
    fn from(summary: StackSummary) -> Self {
        Self {
            name: summary.name,
            last_update: summary.last_update,
            resource_count: summary.resource_count,
            update_in_progress: summary.update_in_progress,
            url: summary.url,
        }
    }
}

/// Result of a successful `up`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpSummary {
    /// Stack outputs, e.g. `url`.
    pub outputs: BTreeMap<String, serde_json::Value>,
}

/// Operations required of an automation engine.
///
/// Implementations must serialise mutating operations per stack and report
/// a concurrent mutation as [`EngineError::ConcurrentUpdate`] rather than
/// corrupting state.
///
/// [`EngineError::ConcurrentUpdate`]: crate::error::EngineError::ConcurrentUpdate
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// List every stack in the project.
    async fn list_stacks(&self, project: &ProjectName) -> EngineResult<Vec<StackSummary>>;

    /// Create a new stack bound to `program`.
    ///
    /// Fails with `StackAlreadyExists` if the name is taken.
    async fn create_stack(&self, stack: &StackRef, program: &DeploymentProgram)
        -> EngineResult<()>;

    /// Select an existing stack, binding it to `program`.
    ///
    /// Fails with `StackNotFound` if there is no such stack.
    async fn select_stack(&self, stack: &StackRef, program: &DeploymentProgram)
        -> EngineResult<()>;

    /// Provision the stack's resources, streaming progress to `sink`.
    async fn up(&self, stack: &StackRef, sink: &dyn OutputSink) -> EngineResult<UpSummary>;

    /// Tear down the stack's resources, streaming progress to `sink`.
    async fn destroy(&self, stack: &StackRef, sink: &dyn OutputSink) -> EngineResult<()>;

    /// Remove the stack's bookkeeping record.
    async fn remove_stack(&self, stack: &StackRef) -> EngineResult<()>;
}

/// Create an engine from configuration.
pub fn create_engine(config: &EngineConfig) -> ControlResult<Arc<dyn AutomationEngine>> {
    match config.engine_type {
        EngineType::Cli => Ok(Arc::new(CliEngine::new(config)?)),
        EngineType::Mock => Ok(Arc::new(MockEngine::new())),
    }
}
