//! Typestate encoding of a deployment's lifecycle.
//!
//! Each orchestration flow walks one path through the state machine:
//!
//! ```text
//! Requested ──▶ Provisioning ──▶ Active ──▶ Destroying ──▶ Removed
//! ```
//!
//! `create` runs `Requested → Provisioning → Active`; `delete` starts from a
//! selected `Active` deployment and runs `Destroying → Removed`. Invalid
//! transitions do not compile.
//!
//! ```ignore
//! let requested = Lifecycle::<Requested>::new(&spec);
//! let provisioning = requested.start_provisioning();
//! let active = provisioning.activate(summary);
//! // active.start_provisioning() would not compile
//! ```

use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use crate::engine::UpSummary;
use crate::types::{DeploymentName, DeploymentSpec};

/// Marker trait for lifecycle states.
pub trait LifecycleState: private::Sealed + Send + Sync {
    /// State name for logging.
    fn name() -> &'static str;
}

mod private {
    pub trait Sealed {}
}

/// Descriptor validated, nothing sent to the engine yet.
#[derive(Debug, Clone, Copy)]
pub struct Requested;

/// Stack created, resources being provisioned.
#[derive(Debug, Clone, Copy)]
pub struct Provisioning;

/// Resources are up.
#[derive(Debug, Clone, Copy)]
pub struct Active;

/// Resources being torn down.
#[derive(Debug, Clone, Copy)]
pub struct Destroying;

/// Resources and stack record are gone.
#[derive(Debug, Clone, Copy)]
pub struct Removed;

impl private::Sealed for Requested {}
impl private::Sealed for Provisioning {}
impl private::Sealed for Active {}
impl private::Sealed for Destroying {}
impl private::Sealed for Removed {}

impl LifecycleState for Requested {
    fn name() -> &'static str {
        "requested"
    }
}

impl LifecycleState for Provisioning {
    fn name() -> &'static str {
        "provisioning"
    }
}

impl LifecycleState for Active {
    fn name() -> &'static str {
        "active"
    }
}

impl LifecycleState for Destroying {
    fn name() -> &'static str {
        "destroying"
    }
}

impl LifecycleState for Removed {
    fn name() -> &'static str {
        "removed"
    }
}

/// A deployment moving through its lifecycle.
#[derive(Debug)]
pub struct Lifecycle<S: LifecycleState> {
    name: DeploymentName,
    summary: UpSummary,
    since: DateTime<Utc>,
    _state: PhantomData<S>,
}

impl<S: LifecycleState> Lifecycle<S> {
    /// Deployment name.
    #[must_use]
    pub const fn name(&self) -> &DeploymentName {
        &self.name
    }

    /// Current state name.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        S::name()
    }

    /// When the deployment entered its current state.
    #[must_use]
    pub const fn since(&self) -> DateTime<Utc> {
        self.since
    }

    fn transition<T: LifecycleState>(self) -> Lifecycle<T> {
        Lifecycle {
            name: self.name,
            summary: self.summary,
            since: Utc::now(),
            _state: PhantomData,
        }
    }
}

impl Lifecycle<Requested> {
    /// Start a create flow from a validated descriptor.
    #[must_use]
    pub fn new(spec: &DeploymentSpec) -> Self {
        Self {
            name: spec.name().clone(),
            summary: UpSummary::default(),
            since: Utc::now(),
            _state: PhantomData,
        }
    }

    /// The engine accepted the stack; resources are being provisioned.
    #[must_use]
    pub fn start_provisioning(self) -> Lifecycle<Provisioning> {
        self.transition()
    }
}

impl Lifecycle<Provisioning> {
    /// The engine reports the deployment is up.
    #[must_use]
    pub fn activate(self, summary: UpSummary) -> Lifecycle<Active> {
        let mut active: Lifecycle<Active> = self.transition();
        active.summary = summary;
        active
    }
}

impl Lifecycle<Active> {
    /// Start a delete flow for an existing deployment.
    #[must_use]
    pub fn selected(name: DeploymentName) -> Self {
        Self {
            name,
            summary: UpSummary::default(),
            since: Utc::now(),
            _state: PhantomData,
        }
    }

    /// Outputs reported by the engine when the deployment came up.
    #[must_use]
    pub const fn summary(&self) -> &UpSummary {
        &self.summary
    }

    /// Tear down resources.
    #[must_use]
    pub fn start_destroying(self) -> Lifecycle<Destroying> {
        self.transition()
    }
}

impl Lifecycle<Destroying> {
    /// Resources and stack record are gone.
    #[must_use]
    pub fn remove(self) -> Lifecycle<Removed> {
        self.transition()
    }
}
