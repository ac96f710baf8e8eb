//! Common test utilities for control integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use productionapp_control::{
    api::{self, AppState},
    AutomationEngine, DeploymentManager, DeploymentName, MockEngine, ProjectName, StackRef,
    UpdateGate, Workspace,
};
use rstest::fixture;

/// Project every test deployment lives in.
pub const TEST_PROJECT: &str = "productionapp-test";

/// Complete test control plane with a mock engine wired in.
pub struct TestControl {
    pub engine: Arc<MockEngine>,
    pub manager: Arc<DeploymentManager>,
    pub gate: Option<UpdateGate>,
}

impl TestControl {
    /// Creates a control plane whose engine completes updates immediately.
    pub fn new() -> Self {
        Self::with_engine(MockEngine::new(), None)
    }

    /// Creates a control plane whose engine holds updates until the gate releases them.
    pub fn gated() -> Self {
        let (engine, gate) = MockEngine::with_update_gate();
        Self::with_engine(engine, Some(gate))
    }

    fn with_engine(engine: MockEngine, gate: Option<UpdateGate>) -> Self {
        let engine = Arc::new(engine);
        let dyn_engine: Arc<dyn AutomationEngine> = engine.clone();
        let workspace = Workspace::new(ProjectName::new(TEST_PROJECT), dyn_engine);

        Self {
            engine,
            manager: Arc::new(DeploymentManager::new(workspace)),
            gate,
        }
    }

    /// Engine reference for a deployment name.
    pub fn stack(&self, name: &str) -> StackRef {
        self.manager
            .workspace()
            .stack(&DeploymentName::parse(name).unwrap())
    }

    /// HTTP router over this control plane.
    pub fn router(&self) -> axum::Router {
        api::router(AppState {
            manager: Arc::clone(&self.manager),
        })
    }

    /// Waits until an update is running against `name`.
    pub async fn wait_for_update(&self, name: &str) {
        let stack = self.stack(name);
        while !self.engine.update_in_progress(&stack) {
            tokio::task::yield_now().await;
        }
    }
}

impl Default for TestControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Control plane with an immediately completing mock engine.
#[fixture]
pub fn control() -> TestControl {
    TestControl::new()
}

/// Control plane whose updates block until released.
#[fixture]
pub fn gated_control() -> TestControl {
    TestControl::gated()
}
