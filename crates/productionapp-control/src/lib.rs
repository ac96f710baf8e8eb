//! productionapp control plane
//!
//! This crate creates, lists and deletes container deployments by driving an
//! infrastructure-as-code automation engine. Each deployment is one stack in
//! a fixed project; the engine is the only source of truth for which
//! deployments exist.
//!
//! # Architecture
//!
//! - **Engine** ([`engine`]): the [`AutomationEngine`] capability trait, with
//!   a CLI-backed implementation and an in-memory [`MockEngine`]
//! - **Workspace** ([`workspace`]): binds engine calls to one project
//! - **Orchestration** ([`deployment`]): the [`DeploymentManager`] runs each
//!   lifecycle flow and folds every error into a [`LifecycleOutcome`]
//! - **API surface** ([`api`]): HTTP endpoints over the manager
//!
//! # Lifecycle
//!
//! Each flow walks the typestate machine in [`state`]:
//!
//! ```text
//! Requested ──▶ Provisioning ──▶ Active ──▶ Destroying ──▶ Removed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use productionapp_control::{DeploymentManager, MockEngine, NullSink, ProjectName, Workspace};
//!
//! let workspace = Workspace::new(ProjectName::new("productionapp-platform"), Arc::new(MockEngine::new()));
//! let manager = DeploymentManager::new(workspace);
//!
//! let outcome = manager
//!     .create("demo", "gcr.io/kuar-demo/kuard-amd64:blue", 80, &NullSink)
//!     .await;
//! assert!(outcome.is_success());
//! ```

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod deployment;
pub mod engine;
pub mod error;
pub mod service;
pub mod sink;
pub mod state;
pub mod types;
pub mod workspace;

// Re-export commonly used types at the crate root
pub use config::{ControlConfig, EngineConfig, EngineType};
pub use deployment::{
    CreatedDeployment, DeletedDeployment, DeploymentListing, DeploymentManager, LifecycleOutcome,
};
pub use engine::{AutomationEngine, CliEngine, MockEngine, StackRef, UpdateGate};
pub use error::{ControlError, ControlResult, EngineError, EngineResult};
pub use service::ControlService;
pub use sink::{BufferSink, NullSink, OutputSink, TracingSink};
pub use state::{Active, Destroying, Lifecycle, LifecycleState, Provisioning, Removed, Requested};
pub use types::{DeploymentInstance, DeploymentName, DeploymentSpec, InstanceState, ProjectName};
pub use workspace::Workspace;
