//! Shared Init/Run/Stop contract for long-running components
//!
//! Every worker-owning component (the chunk source and the uploader) goes
//! through the same state machine:
//!
//! ```text
//! Idle --init--> Initialized --run--> Running --stop--> Stopped
//! ```
//!
//! `stop` is accepted in any state. It only does work while `Running`,
//! and a stopped component cannot be restarted.

use serde::Serialize;

use crate::error::LifecycleError;

/// Component lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Idle,
    Initialized,
    Running,
    Stopped,
}

/// State machine shared by all components
#[derive(Debug)]
pub struct Lifecycle {
    state: ComponentState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ComponentState::Idle,
        }
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ComponentState::Running
    }

    /// Check that `init` is allowed
    pub fn check_init(&self) -> Result<(), LifecycleError> {
        match self.state {
            ComponentState::Idle => Ok(()),
            ComponentState::Initialized => Err(LifecycleError::AlreadyInitialized),
            ComponentState::Running => Err(LifecycleError::AlreadyRunning),
            ComponentState::Stopped => Err(LifecycleError::Stopped),
        }
    }

    /// Record a successful `init`
    pub fn initialized(&mut self) {
        debug_assert_eq!(self.state, ComponentState::Idle);
        self.state = ComponentState::Initialized;
    }

    /// Check that `run` is allowed
    pub fn check_run(&self) -> Result<(), LifecycleError> {
        match self.state {
            ComponentState::Initialized => Ok(()),
            ComponentState::Idle => Err(LifecycleError::NotInitialized),
            ComponentState::Running => Err(LifecycleError::AlreadyRunning),
            ComponentState::Stopped => Err(LifecycleError::Stopped),
        }
    }

    /// Record a successful `run`
    pub fn started(&mut self) {
        debug_assert_eq!(self.state, ComponentState::Initialized);
        self.state = ComponentState::Running;
    }

    /// Transition for `stop`. Returns true when background work was running
    /// and has to be torn down by the caller.
    pub fn stop(&mut self) -> bool {
        match self.state {
            ComponentState::Idle | ComponentState::Stopped => false,
            ComponentState::Initialized => {
                self.state = ComponentState::Stopped;
                false
            }
            ComponentState::Running => {
                self.state = ComponentState::Stopped;
                true
            }
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// A component driven by the uniform run/stop contract
pub trait Component: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn state(&self) -> ComponentState;

    /// Start background work. Returns once started, not once finished.
    fn run(&mut self) -> crate::Result<()>;

    /// Request shutdown and block until background work has ceased.
    /// Must be a no-op when nothing is running.
    fn stop(&mut self) -> crate::Result<()>;
}

/// Configuration step of the contract. Validates and prepares state
/// without starting any background work.
pub trait Configure {
    type Config;

    fn init(&mut self, config: Self::Config) -> crate::Result<()>;
}

/// Run components in order. On failure, everything already started is
/// stopped again in reverse order before the error is returned.
pub fn run_all(components: &mut [&mut dyn Component]) -> crate::Result<()> {
    for index in 0..components.len() {
        if let Err(e) = components[index].run() {
            tracing::error!("{} run failed: {}", components[index].name(), e);
            // Best effort, the run error is the one worth reporting.
            let _ = stop_all(&mut components[..index]);
            return Err(e);
        }
        tracing::debug!("{} running", components[index].name());
    }
    Ok(())
}

/// Stop components in reverse order. Every component is stopped even if
/// an earlier one fails; the first error is returned.
pub fn stop_all(components: &mut [&mut dyn Component]) -> crate::Result<()> {
    let mut first_error = None;
    for component in components.iter_mut().rev() {
        tracing::debug!("stopping {}...", component.name());
        if let Err(e) = component.stop() {
            tracing::error!("{} stop failed: {}", component.name(), e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
