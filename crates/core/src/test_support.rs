//! Recording modules and shared-state collaborators for unit tests.

use std::{cell::RefCell, rc::Rc};

use crate::{
    capture::CaptureDevice,
    config::CameraSetup,
    render::{FrameRenderer, Scene, SceneRenderer},
    tracking::{CameraStatus, TrackingProvider, TrackingResult},
    CameraPipelineModule, FrameContext, HookError, HookResult, LifecycleHook, ModuleCommands,
    PipelineError, RenderSurface, Result, StartContext, VideoFrame,
};

/// Shared, ordered log of hook invocations across modules.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Rc<RefCell<Vec<(LifecycleHook, String)>>>,
    frames: Rc<RefCell<Vec<(String, FrameContext)>>>,
}

impl CallLog {
    pub fn record(&self, hook: LifecycleHook, module: &str) {
        self.entries.borrow_mut().push((hook, module.to_string()));
    }

    pub fn entries(&self) -> Vec<(LifecycleHook, String)> {
        self.entries.borrow().clone()
    }

    /// Module names that received `hook`, in call order.
    pub fn calls_for(&self, hook: LifecycleHook) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|(seen, _)| *seen == hook)
            .map(|(_, module)| module.clone())
            .collect()
    }

    pub fn count(&self, module: &str, hook: LifecycleHook) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(seen, name)| *seen == hook && name == module)
            .count()
    }

    /// Frames seen by `module`, in order.
    pub fn frames_for(&self, module: &str) -> Vec<FrameContext> {
        self.frames
            .borrow()
            .iter()
            .filter(|(name, _)| name == module)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
        self.frames.borrow_mut().clear();
    }
}

/// Module that implements every hook, logs each call and can be told to
/// fail on one of them.
pub struct RecordingModule {
    name: String,
    log: CallLog,
    fail_on: Option<LifecycleHook>,
    on_update: Option<Box<dyn FnMut(&FrameContext, &mut ModuleCommands)>>,
}

impl RecordingModule {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_on: None,
            on_update: None,
        }
    }

    pub fn failing_on(mut self, hook: LifecycleHook) -> Self {
        self.fail_on = Some(hook);
        self
    }

    /// Extra behaviour run inside `on_update_with_results`.
    pub fn on_update(
        mut self,
        action: impl FnMut(&FrameContext, &mut ModuleCommands) + 'static,
    ) -> Self {
        self.on_update = Some(Box::new(action));
        self
    }

    pub fn boxed(self) -> Box<dyn CameraPipelineModule> {
        Box::new(self)
    }

    fn record(&self, hook: LifecycleHook) -> HookResult {
        self.log.record(hook, &self.name);
        if self.fail_on == Some(hook) {
            return Err(HookError::msg(format!("{} refused {hook}", self.name)));
        }
        Ok(())
    }
}

impl CameraPipelineModule for RecordingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_attach(&mut self, _name: &str) -> HookResult {
        self.record(LifecycleHook::Attach)
    }

    fn on_start(
        &mut self,
        _start: &mut StartContext<'_>,
        _commands: &mut ModuleCommands,
    ) -> HookResult {
        self.record(LifecycleHook::Start)
    }

    fn on_update_with_results(
        &mut self,
        frame: &FrameContext,
        commands: &mut ModuleCommands,
    ) -> HookResult {
        self.log
            .frames
            .borrow_mut()
            .push((self.name.clone(), frame.clone()));
        if let Some(action) = self.on_update.as_mut() {
            action(frame, commands);
        }
        self.record(LifecycleHook::UpdateWithResults)
    }

    fn on_paused(&mut self) -> HookResult {
        self.record(LifecycleHook::Paused)
    }

    fn on_resumed(&mut self) -> HookResult {
        self.record(LifecycleHook::Resumed)
    }

    fn on_camera_status_change(&mut self, _status: CameraStatus) -> HookResult {
        self.record(LifecycleHook::CameraStatusChange)
    }

    fn on_detach(&mut self) -> HookResult {
        self.record(LifecycleHook::Detach)
    }
}

/// Lets a test keep a handle on a collaborator after handing it to the
/// orchestrator.
#[derive(Debug, Default)]
pub struct Shared<T>(pub Rc<RefCell<T>>);

impl<T> Shared<T> {
    pub fn new(inner: T) -> Self {
        Self(Rc::new(RefCell::new(inner)))
    }

    pub fn handle(&self) -> Rc<RefCell<T>> {
        self.0.clone()
    }
}

impl<T: CaptureDevice> CaptureDevice for Shared<T> {
    fn open(&mut self, surface: &RenderSurface) -> Result<()> {
        self.0.borrow_mut().open(surface)
    }

    fn next_frame(&mut self) -> Option<VideoFrame> {
        self.0.borrow_mut().next_frame()
    }

    fn release(&mut self) {
        self.0.borrow_mut().release()
    }

    fn is_open(&self) -> bool {
        self.0.borrow().is_open()
    }
}

impl<T: TrackingProvider> TrackingProvider for Shared<T> {
    fn configure(&mut self, setup: &CameraSetup) {
        self.0.borrow_mut().configure(setup)
    }

    fn track(&mut self, frame: &VideoFrame) -> TrackingResult {
        self.0.borrow_mut().track(frame)
    }

    fn recenter(&mut self) {
        self.0.borrow_mut().recenter()
    }
}

impl<T: FrameRenderer> FrameRenderer for Shared<T> {
    fn draw_frame(&mut self, frame: &VideoFrame, surface: &RenderSurface) -> Result<()> {
        self.0.borrow_mut().draw_frame(frame, surface)
    }
}

/// Frame renderer that fails every draw.
#[derive(Debug, Default)]
pub struct FailingFrameRenderer;

impl FrameRenderer for FailingFrameRenderer {
    fn draw_frame(&mut self, _frame: &VideoFrame, _surface: &RenderSurface) -> Result<()> {
        Err(PipelineError::Render("video texture upload failed".into()))
    }
}

/// Scene renderer whose scene lives in the orchestrator and whose draw
/// count is shared with the test.
#[derive(Debug, Default)]
pub struct CountingSceneRenderer {
    pub scene: Scene,
    pub draws: Rc<RefCell<u64>>,
}

impl SceneRenderer for CountingSceneRenderer {
    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn render(&mut self, _frame: &FrameContext) -> Result<()> {
        *self.draws.borrow_mut() += 1;
        Ok(())
    }
}
