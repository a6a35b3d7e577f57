//! The camera pipeline module contract.
//!
//! A module is a named unit of behaviour that plugs into the frame loop by
//! implementing any subset of the lifecycle hooks. Which hooks a module
//! implements is declared explicitly through [`CameraPipelineModule::hooks`];
//! the dispatcher never calls a hook outside that set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    config::CameraSetup, tracking::CameraStatus, FrameContext, HookResult, StartContext,
};

/// Lifecycle events a module can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleHook {
    Attach,
    Start,
    UpdateWithResults,
    Paused,
    Resumed,
    CameraStatusChange,
    Detach,
}

impl LifecycleHook {
    pub const ALL: [LifecycleHook; 7] = [
        LifecycleHook::Attach,
        LifecycleHook::Start,
        LifecycleHook::UpdateWithResults,
        LifecycleHook::Paused,
        LifecycleHook::Resumed,
        LifecycleHook::CameraStatusChange,
        LifecycleHook::Detach,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleHook::Attach => "onAttach",
            LifecycleHook::Start => "onStart",
            LifecycleHook::UpdateWithResults => "onUpdateWithResults",
            LifecycleHook::Paused => "onPaused",
            LifecycleHook::Resumed => "onResumed",
            LifecycleHook::CameraStatusChange => "onCameraStatusChange",
            LifecycleHook::Detach => "onDetach",
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of hooks a module implements.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct HookSet(u8);

impl HookSet {
    pub const EMPTY: HookSet = HookSet(0);
    pub const ALL: HookSet = HookSet(0b0111_1111);

    pub fn of(hooks: &[LifecycleHook]) -> Self {
        hooks.iter().fold(Self::EMPTY, |set, hook| set.with(*hook))
    }

    #[must_use]
    pub fn with(self, hook: LifecycleHook) -> Self {
        Self(self.0 | hook.bit())
    }

    pub fn contains(self, hook: LifecycleHook) -> bool {
        self.0 & hook.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = LifecycleHook> {
        LifecycleHook::ALL
            .into_iter()
            .filter(move |hook| self.contains(*hook))
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A pluggable unit of per-frame behaviour.
///
/// Every hook has a no-op default so implementors only write the ones they
/// declare in [`hooks`](Self::hooks). Hooks run synchronously on the frame
/// loop and must return promptly; a hook that blocks stalls the whole
/// pipeline.
pub trait CameraPipelineModule {
    /// Unique name within the registry.
    fn name(&self) -> &str;

    /// Hooks this module implements. Defaults to all of them.
    fn hooks(&self) -> HookSet {
        HookSet::ALL
    }

    fn on_attach(&mut self, _name: &str) -> HookResult {
        Ok(())
    }

    fn on_start(
        &mut self,
        _start: &mut StartContext<'_>,
        _commands: &mut ModuleCommands,
    ) -> HookResult {
        Ok(())
    }

    fn on_update_with_results(
        &mut self,
        _frame: &FrameContext,
        _commands: &mut ModuleCommands,
    ) -> HookResult {
        Ok(())
    }

    fn on_paused(&mut self) -> HookResult {
        Ok(())
    }

    fn on_resumed(&mut self) -> HookResult {
        Ok(())
    }

    fn on_camera_status_change(&mut self, _status: CameraStatus) -> HookResult {
        Ok(())
    }

    fn on_detach(&mut self) -> HookResult {
        Ok(())
    }
}

impl fmt::Debug for dyn CameraPipelineModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraPipelineModule")
            .field("name", &self.name())
            .field("hooks", &self.hooks())
            .finish()
    }
}

/// A buffered registry edit, kept in the order it was issued.
#[derive(Debug)]
pub(crate) enum RegistryChange {
    Add(Box<dyn CameraPipelineModule>),
    Remove(String),
}

/// Requests a hook makes of the pipeline. They are buffered and applied
/// once the current lifecycle event has reached every module. Registry
/// edits are applied in the order they were issued.
#[derive(Debug, Default)]
pub struct ModuleCommands {
    registry_changes: Vec<RegistryChange>,
    camera_setup: Option<CameraSetup>,
    stop_requested: bool,
}

impl ModuleCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` after the current event completes.
    pub fn add_module(&mut self, module: Box<dyn CameraPipelineModule>) {
        self.registry_changes.push(RegistryChange::Add(module));
    }

    /// Unregisters the named module after the current event completes.
    pub fn remove_module(&mut self, name: impl Into<String>) {
        self.registry_changes.push(RegistryChange::Remove(name.into()));
    }

    /// Replaces the camera intrinsics and re-seeds the tracker's reference
    /// frame. Later submissions within the same event win.
    pub fn update_camera_projection(&mut self, setup: CameraSetup) {
        self.camera_setup = Some(setup);
    }

    /// Stops the pipeline once the in-flight frame has finished.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn is_empty(&self) -> bool {
        self.registry_changes.is_empty()
            && self.camera_setup.is_none()
            && !self.stop_requested
    }

    pub(crate) fn take_registry_changes(&mut self) -> Vec<RegistryChange> {
        std::mem::take(&mut self.registry_changes)
    }

    pub(crate) fn take_camera_setup(&mut self) -> Option<CameraSetup> {
        self.camera_setup.take()
    }

    pub(crate) fn take_stop_request(&mut self) -> bool {
        std::mem::take(&mut self.stop_requested)
    }
}

type StartHook = Box<dyn FnMut(&mut StartContext<'_>, &mut ModuleCommands) -> HookResult>;
type UpdateHook = Box<dyn FnMut(&FrameContext, &mut ModuleCommands) -> HookResult>;
type StatusHook = Box<dyn FnMut(CameraStatus) -> HookResult>;
type NameHook = Box<dyn FnMut(&str) -> HookResult>;
type PlainHook = Box<dyn FnMut() -> HookResult>;

/// A module assembled from closures, for application logic that does not
/// warrant its own type. Only the hooks that were set are reported in
/// [`CameraPipelineModule::hooks`].
///
/// ```
/// use camera_pipeline_core::FnModule;
///
/// let module = FnModule::new("spinner")
///     .on_update_with_results(|frame, _| {
///         let _elapsed = frame.timestamp_millis;
///         Ok(())
///     });
/// ```
#[derive(Default)]
pub struct FnModule {
    name: String,
    attach: Option<NameHook>,
    start: Option<StartHook>,
    update: Option<UpdateHook>,
    paused: Option<PlainHook>,
    resumed: Option<PlainHook>,
    status: Option<StatusHook>,
    detach: Option<PlainHook>,
}

impl FnModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn on_attach(mut self, hook: impl FnMut(&str) -> HookResult + 'static) -> Self {
        self.attach = Some(Box::new(hook));
        self
    }

    pub fn on_start(
        mut self,
        hook: impl FnMut(&mut StartContext<'_>, &mut ModuleCommands) -> HookResult + 'static,
    ) -> Self {
        self.start = Some(Box::new(hook));
        self
    }

    pub fn on_update_with_results(
        mut self,
        hook: impl FnMut(&FrameContext, &mut ModuleCommands) -> HookResult + 'static,
    ) -> Self {
        self.update = Some(Box::new(hook));
        self
    }

    pub fn on_paused(mut self, hook: impl FnMut() -> HookResult + 'static) -> Self {
        self.paused = Some(Box::new(hook));
        self
    }

    pub fn on_resumed(mut self, hook: impl FnMut() -> HookResult + 'static) -> Self {
        self.resumed = Some(Box::new(hook));
        self
    }

    pub fn on_camera_status_change(
        mut self,
        hook: impl FnMut(CameraStatus) -> HookResult + 'static,
    ) -> Self {
        self.status = Some(Box::new(hook));
        self
    }

    pub fn on_detach(mut self, hook: impl FnMut() -> HookResult + 'static) -> Self {
        self.detach = Some(Box::new(hook));
        self
    }
}

impl CameraPipelineModule for FnModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> HookSet {
        let declared = [
            (self.attach.is_some(), LifecycleHook::Attach),
            (self.start.is_some(), LifecycleHook::Start),
            (self.update.is_some(), LifecycleHook::UpdateWithResults),
            (self.paused.is_some(), LifecycleHook::Paused),
            (self.resumed.is_some(), LifecycleHook::Resumed),
            (self.status.is_some(), LifecycleHook::CameraStatusChange),
            (self.detach.is_some(), LifecycleHook::Detach),
        ];
        declared
            .into_iter()
            .filter(|(present, _)| *present)
            .fold(HookSet::EMPTY, |set, (_, hook)| set.with(hook))
    }

    fn on_attach(&mut self, name: &str) -> HookResult {
        self.attach.as_mut().map_or(Ok(()), |hook| hook(name))
    }

    fn on_start(
        &mut self,
        start: &mut StartContext<'_>,
        commands: &mut ModuleCommands,
    ) -> HookResult {
        self.start
            .as_mut()
            .map_or(Ok(()), |hook| hook(start, commands))
    }

    fn on_update_with_results(
        &mut self,
        frame: &FrameContext,
        commands: &mut ModuleCommands,
    ) -> HookResult {
        self.update
            .as_mut()
            .map_or(Ok(()), |hook| hook(frame, commands))
    }

    fn on_paused(&mut self) -> HookResult {
        self.paused.as_mut().map_or(Ok(()), |hook| hook())
    }

    fn on_resumed(&mut self) -> HookResult {
        self.resumed.as_mut().map_or(Ok(()), |hook| hook())
    }

    fn on_camera_status_change(&mut self, status: CameraStatus) -> HookResult {
        self.status.as_mut().map_or(Ok(()), |hook| hook(status))
    }

    fn on_detach(&mut self) -> HookResult {
        self.detach.as_mut().map_or(Ok(()), |hook| hook())
    }
}

impl fmt::Debug for FnModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModule")
            .field("name", &self.name)
            .field("hooks", &self.hooks())
            .finish()
    }
}
