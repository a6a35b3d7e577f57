use serde::{Deserialize, Serialize};

/// Whether frames are currently being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PipelineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Result of a `start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTransition {
    /// `Stopped -> Running`; `on_start` is due.
    First,
    /// Already running or paused; nothing changed.
    Ignored,
}

/// Tracks `Stopped -> Running <-> Paused` and gates frame dispatch.
///
/// `start` while running or paused is a no-op. `pause` and `resume` are
/// idempotent and report whether a transition happened so callers fire
/// `on_paused`/`on_resumed` exactly once per real transition.
#[derive(Debug, Default, Clone)]
pub struct PipelineStateMachine {
    state: PipelineState,
    started: bool,
}

impl PipelineStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == PipelineState::Paused
    }

    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    /// True once `start` has succeeded in this lifetime.
    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Frames are dispatched only while running.
    pub fn should_dispatch(&self) -> bool {
        self.is_running()
    }

    pub fn start(&mut self) -> StartTransition {
        if self.state != PipelineState::Stopped {
            return StartTransition::Ignored;
        }
        self.state = PipelineState::Running;
        self.started = true;
        StartTransition::First
    }

    /// Returns `true` if the pipeline moved from running to paused.
    pub fn pause(&mut self) -> bool {
        self.transition(PipelineState::Running, PipelineState::Paused)
    }

    /// Returns `true` if the pipeline moved from paused to running.
    pub fn resume(&mut self) -> bool {
        self.transition(PipelineState::Paused, PipelineState::Running)
    }

    /// Moves to `Stopped` from any state and ends the lifetime, so the next
    /// `start` reports `First` again. Returns `true` if the state changed.
    pub fn stop(&mut self) -> bool {
        self.started = false;
        let was = std::mem::replace(&mut self.state, PipelineState::Stopped);
        was != PipelineState::Stopped
    }

    fn transition(&mut self, from: PipelineState, to: PipelineState) -> bool {
        if self.state != from {
            return false;
        }
        tracing::debug!(?from, ?to, "pipeline state transition");
        self.state = to;
        true
    }
}
