//! Deployment lifecycle orchestration.
//!
//! [`DeploymentManager`] creates, lists and deletes deployments by
//! delegating to the automation engine, and reports each result as a
//! [`LifecycleOutcome`].

mod manager;
mod outcome;

pub use manager::DeploymentManager;
pub use outcome::{CreatedDeployment, DeletedDeployment, DeploymentListing, LifecycleOutcome};
