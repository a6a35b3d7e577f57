//! Lifecycle dispatch.
//!
//! The dispatcher walks the registry in order and calls the hook matching
//! the event on each module that declares it. A failing hook is logged and
//! recorded; the remaining modules still receive the event.

use std::collections::VecDeque;

use crate::{
    tracking::CameraStatus, CameraPipelineModule, FrameContext, HookError, HookResult,
    LifecycleHook, ModuleCommands, ModuleRegistry, PipelineError, StartContext,
};

/// A lifecycle event together with its payload.
#[derive(Debug)]
pub enum LifecycleEvent<'a> {
    /// Payload is each module's own name.
    Attach,
    Start(StartContext<'a>),
    UpdateWithResults(&'a FrameContext),
    Paused,
    Resumed,
    CameraStatusChange(CameraStatus),
    Detach,
}

impl LifecycleEvent<'_> {
    pub fn hook(&self) -> LifecycleHook {
        match self {
            LifecycleEvent::Attach => LifecycleHook::Attach,
            LifecycleEvent::Start(_) => LifecycleHook::Start,
            LifecycleEvent::UpdateWithResults(_) => LifecycleHook::UpdateWithResults,
            LifecycleEvent::Paused => LifecycleHook::Paused,
            LifecycleEvent::Resumed => LifecycleHook::Resumed,
            LifecycleEvent::CameraStatusChange(_) => LifecycleHook::CameraStatusChange,
            LifecycleEvent::Detach => LifecycleHook::Detach,
        }
    }
}

/// A hook that returned an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    pub module: String,
    pub event: LifecycleHook,
    pub error: HookError,
}

impl HookFailure {
    pub fn to_error(&self) -> PipelineError {
        PipelineError::ModuleHookFailure {
            module: self.module.clone(),
            event: self.event,
            message: self.error.message().to_string(),
        }
    }
}

/// What happened while dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub event: LifecycleHook,
    /// Modules whose hook was called, in call order, including failed ones.
    pub invoked: Vec<String>,
    pub failures: Vec<HookFailure>,
}

impl DispatchReport {
    fn new(event: LifecycleHook) -> Self {
        Self {
            event,
            invoked: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, other: DispatchReport) {
        self.invoked.extend(other.invoked);
        self.failures.extend(other.failures);
    }
}

/// Invokes lifecycle hooks and keeps a bounded history of failures.
#[derive(Debug)]
pub struct LifecycleDispatcher {
    recent_failures: VecDeque<HookFailure>,
    history: usize,
    total_failures: u64,
}

impl LifecycleDispatcher {
    pub fn new(history: usize) -> Self {
        Self {
            recent_failures: VecDeque::with_capacity(history.min(256)),
            history,
            total_failures: 0,
        }
    }

    /// Sends `event` to every registered module in registration order.
    ///
    /// The registry cannot change during the walk: hooks only reach it
    /// through `commands`, which the caller applies afterwards.
    pub fn dispatch(
        &mut self,
        registry: &mut ModuleRegistry,
        event: &mut LifecycleEvent<'_>,
        commands: &mut ModuleCommands,
    ) -> DispatchReport {
        let mut report = DispatchReport::new(event.hook());
        for module in registry.iter_mut() {
            report.absorb(self.dispatch_to(module.as_mut(), event, commands));
        }
        report
    }

    /// Sends `event` to a single module, e.g. one that was just registered
    /// or unregistered.
    pub fn dispatch_to(
        &mut self,
        module: &mut dyn CameraPipelineModule,
        event: &mut LifecycleEvent<'_>,
        commands: &mut ModuleCommands,
    ) -> DispatchReport {
        let hook = event.hook();
        let mut report = DispatchReport::new(hook);
        if !module.hooks().contains(hook) {
            return report;
        }

        let name = module.name().to_string();
        let outcome = invoke(module, &name, event, commands);
        report.invoked.push(name.clone());

        if let Err(error) = outcome {
            tracing::warn!(module = %name, event = %hook, %error, "module hook failed");
            let failure = HookFailure {
                module: name,
                event: hook,
                error,
            };
            self.remember(failure.clone());
            report.failures.push(failure);
        }
        report
    }

    /// Most recent failures, oldest first.
    pub fn recent_failures(&self) -> impl Iterator<Item = &HookFailure> {
        self.recent_failures.iter()
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    /// Adds a failure the orchestrator detected outside a hook call, such as
    /// a rejected deferred registration.
    pub(crate) fn record_failure(&mut self, failure: HookFailure) {
        self.remember(failure);
    }

    fn remember(&mut self, failure: HookFailure) {
        self.total_failures += 1;
        if self.history == 0 {
            return;
        }
        if self.recent_failures.len() == self.history {
            self.recent_failures.pop_front();
        }
        self.recent_failures.push_back(failure);
    }
}

fn invoke(
    module: &mut dyn CameraPipelineModule,
    name: &str,
    event: &mut LifecycleEvent<'_>,
    commands: &mut ModuleCommands,
) -> HookResult {
    match event {
        LifecycleEvent::Attach => module.on_attach(name),
        LifecycleEvent::Start(start) => module.on_start(start, commands),
        LifecycleEvent::UpdateWithResults(frame) => {
            module.on_update_with_results(*frame, commands)
        }
        LifecycleEvent::Paused => module.on_paused(),
        LifecycleEvent::Resumed => module.on_resumed(),
        LifecycleEvent::CameraStatusChange(status) => module.on_camera_status_change(*status),
        LifecycleEvent::Detach => module.on_detach(),
    }
}
