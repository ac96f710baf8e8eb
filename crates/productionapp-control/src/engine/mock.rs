//! In-memory automation engine for testing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{EngineError, EngineResult};
use crate::sink::OutputSink;
use crate::types::{InstanceState, ProjectName};

use super::{AutomationEngine, DeploymentProgram, StackRef, StackSummary, UpSummary};

type StackKey = (String, String);

fn key(stack: &StackRef) -> StackKey {
    (
        stack.project.as_str().to_owned(),
        stack.name.as_str().to_owned(),
    )
}

#[derive(Debug)]
struct MockStack {
    state: InstanceState,
    updating: bool,
    program: DeploymentProgram,
    resources: u64,
    outputs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default)]
struct Faults {
    remove: HashSet<StackKey>,
    up: HashMap<StackKey, String>,
}

/// Holds `up` and `destroy` calls of a [`MockEngine`] until released.
#[derive(Debug, Clone)]
pub struct UpdateGate {
    permits: Arc<Semaphore>,
}

impl UpdateGate {
    /// Let one held operation complete.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }
}

/// In-memory engine.
///
/// Stacks live in a map keyed by project and name. A stack with an update
/// running rejects further mutations with `ConcurrentUpdate`, matching how
/// a real backend serialises updates.
#[derive(Debug, Default)]
pub struct MockEngine {
    stacks: Mutex<HashMap<StackKey, MockStack>>,
    faults: Mutex<Faults>,
    unreachable: AtomicBool,
    gate: Option<UpdateGate>,
}

impl MockEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine whose updates block until the returned gate releases them.
    #[must_use]
    pub fn with_update_gate() -> (Self, UpdateGate) {
        let gate = UpdateGate {
            permits: Arc::new(Semaphore::new(0)),
        };
        let engine = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (engine, gate)
    }

    /// Make every call fail as if the backend could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make the next `remove_stack` for this stack fail.
    pub fn fail_next_remove(&self, stack: &StackRef) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.remove.insert(key(stack));
        }
    }

    /// Make the next `up` for this stack fail with `message`.
    pub fn fail_next_up(&self, stack: &StackRef, message: impl Into<String>) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.up.insert(key(stack), message.into());
        }
    }

    /// Current state of a stack, `None` if it does not exist.
    #[must_use]
    pub fn stack_state(&self, stack: &StackRef) -> Option<InstanceState> {
        self.lock_stacks()
            .ok()
            .and_then(|stacks| stacks.get(&key(stack)).map(|s| s.state))
    }

    /// Whether an update is running against this stack.
    #[must_use]
    pub fn update_in_progress(&self, stack: &StackRef) -> bool {
        self.lock_stacks()
            .ok()
            .and_then(|stacks| stacks.get(&key(stack)).map(|s| s.updating))
            .unwrap_or(false)
    }

    /// Number of stacks across all projects.
    #[must_use]
    pub fn stack_count(&self) -> usize {
        self.lock_stacks().map(|stacks| stacks.len()).unwrap_or(0)
    }

    fn lock_stacks(&self) -> EngineResult<MutexGuard<'_, HashMap<StackKey, MockStack>>> {
        self.stacks
            .lock()
            .map_err(|_| EngineError::other("lock poisoned"))
    }

    fn check_reachable(&self) -> EngineResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(EngineError::other("automation backend unreachable"));
        }
        Ok(())
    }

    async fn wait_gate(&self) -> EngineResult<()> {
        if let Some(gate) = &self.gate {
            gate.permits
                .acquire()
                .await
                .map_err(|_| EngineError::other("update gate closed"))?
                .forget();
        }
        Ok(())
    }

    /// Mark the stack as updating, failing if another update holds it.
    fn begin_update(&self, stack: &StackRef, state: InstanceState) -> EngineResult<()> {
        let mut stacks = self.lock_stacks()?;
        let entry = stacks
            .get_mut(&key(stack))
            .ok_or_else(|| EngineError::StackNotFound(stack.name.to_string()))?;

        if entry.updating {
            return Err(EngineError::ConcurrentUpdate(stack.name.to_string()));
        }
        entry.updating = true;
        entry.state = state;
        Ok(())
    }
}

#[async_trait]
impl AutomationEngine for MockEngine {
    async fn list_stacks(&self, project: &ProjectName) -> EngineResult<Vec<StackSummary>> {
        self.check_reachable()?;
        let stacks = self.lock_stacks()?;

        let mut summaries: Vec<_> = stacks
            .iter()
            .filter(|((p, _), _)| p == project.as_str())
            .map(|((_, name), stack)| StackSummary {
                name: name.clone(),
                last_update: None,
                update_in_progress: stack.updating,
                resource_count: Some(stack.resources),
                url: None,
            })
            .collect();

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn create_stack(
        &self,
        stack: &StackRef,
        program: &DeploymentProgram,
    ) -> EngineResult<()> {
        self.check_reachable()?;
        let mut stacks = self.lock_stacks()?;

        let key = key(stack);
        if stacks.contains_key(&key) {
            return Err(EngineError::StackAlreadyExists(stack.name.to_string()));
        }

        stacks.insert(
            key,
            MockStack {
                state: InstanceState::Provisioning,
                updating: false,
                program: program.clone(),
                resources: 0,
                outputs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn select_stack(
        &self,
        stack: &StackRef,
        program: &DeploymentProgram,
    ) -> EngineResult<()> {
        self.check_reachable()?;
        let mut stacks = self.lock_stacks()?;

        let entry = stacks
            .get_mut(&key(stack))
            .ok_or_else(|| EngineError::StackNotFound(stack.name.to_string()))?;

        if !entry.updating {
            entry.program = program.clone();
        }
        Ok(())
    }

    async fn up(&self, stack: &StackRef, sink: &dyn OutputSink) -> EngineResult<UpSummary> {
        self.check_reachable()?;
        self.begin_update(stack, InstanceState::Provisioning)?;

        sink.line(&format!("Updating ({})", stack.name));
        self.wait_gate().await?;

        let failure = self
            .faults
            .lock()
            .map_err(|_| EngineError::other("lock poisoned"))?
            .up
            .remove(&key(stack));

        let mut stacks = self.lock_stacks()?;
        let entry = stacks
            .get_mut(&key(stack))
            .ok_or_else(|| EngineError::StackNotFound(stack.name.to_string()))?;

        // A failed update leaves the stack idle with whatever it had before.
        entry.updating = false;
        entry.state = InstanceState::Active;

        if let Some(message) = failure {
            sink.line(&format!("error: {message}"));
            return Err(EngineError::Other(message));
        }

        match &entry.program {
            DeploymentProgram::Deployment(spec) => {
                sink.line(&format!(
                    " +  productionapp:index:Deployment {} created (image {}, port {})",
                    spec.name(),
                    spec.image(),
                    spec.port()
                ));
                entry.resources = 4;
                entry.outputs.insert(
                    "url".to_owned(),
                    serde_json::Value::String(format!("http://{}.mock.invalid", spec.name())),
                );
            }
            DeploymentProgram::Empty => {
                entry.resources = 0;
                entry.outputs.clear();
            }
        }
        sink.line(&format!("Resources: {} total", entry.resources));

        Ok(UpSummary {
            outputs: entry.outputs.clone(),
        })
    }

    async fn destroy(&self, stack: &StackRef, sink: &dyn OutputSink) -> EngineResult<()> {
        self.check_reachable()?;
        self.begin_update(stack, InstanceState::Destroying)?;

        sink.line(&format!("Destroying ({})", stack.name));
        self.wait_gate().await?;

        let mut stacks = self.lock_stacks()?;
        let entry = stacks
            .get_mut(&key(stack))
            .ok_or_else(|| EngineError::StackNotFound(stack.name.to_string()))?;

        sink.line(&format!("Resources: {} deleted", entry.resources));
        entry.updating = false;
        entry.resources = 0;
        entry.outputs.clear();
        Ok(())
    }

    async fn remove_stack(&self, stack: &StackRef) -> EngineResult<()> {
        self.check_reachable()?;

        let injected = self
            .faults
            .lock()
            .map_err(|_| EngineError::other("lock poisoned"))?
            .remove
            .remove(&key(stack));
        if injected {
            return Err(EngineError::other(format!(
                "failed to remove stack '{}': backend rejected the request",
                stack.name
            )));
        }

        let mut stacks = self.lock_stacks()?;
        let entry = stacks
            .get(&key(stack))
            .ok_or_else(|| EngineError::StackNotFound(stack.name.to_string()))?;

        if entry.updating {
            return Err(EngineError::ConcurrentUpdate(stack.name.to_string()));
        }
        if entry.resources > 0 {
            return Err(EngineError::other(format!(
                "stack '{}' still has {} resources",
                stack.name, entry.resources
            )));
        }

        stacks.remove(&key(stack));
        Ok(())
    }
}
