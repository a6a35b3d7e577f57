//! The pipeline orchestrator.
//!
//! [`PipelineOrchestrator`] owns the module registry, the state machine and
//! the external collaborators (capture device, tracking provider, frame and
//! scene renderers). The host drives it by calling [`tick`] once per
//! display refresh; everything happens synchronously inside that call.
//!
//! Per frame, in order: the next camera frame is pulled, `on_start` fires if
//! this is the first frame of the lifetime, the tracker produces a pose,
//! `on_camera_status_change` fires if the tracking status changed,
//! `on_update_with_results` fires with the frame's [`FrameContext`], and the
//! frame and scene renderers draw. Registry changes and stop requests made by
//! hooks are applied after the event that issued them.
//!
//! [`tick`]: PipelineOrchestrator::tick

use crate::{
    capture::{CaptureDevice, SimulatedCamera},
    dispatch::{DispatchReport, HookFailure, LifecycleDispatcher, LifecycleEvent},
    render::{CameraFeedRenderer, FrameRenderer, SceneGraphRenderer, SceneRenderer},
    module::RegistryChange,
    state::{PipelineState, PipelineStateMachine, StartTransition},
    tracking::{CameraStatus, SimulatedTracker, TrackingProvider},
    CameraIntrinsics, CameraPipelineModule, CameraSetup, FrameContext, HookError, LifecycleHook,
    ModuleCommands, ModuleRegistry, PipelineConfig, PipelineError, RenderSurface, Result,
    StartContext,
};

/// The external components the orchestrator drives.
pub struct Collaborators {
    pub camera: Box<dyn CaptureDevice>,
    pub tracker: Box<dyn TrackingProvider>,
    pub frame_renderer: Box<dyn FrameRenderer>,
    pub scene_renderer: Box<dyn SceneRenderer>,
}

impl Collaborators {
    /// Simulated camera and tracker with the placeholder renderers.
    pub fn simulated(config: &PipelineConfig) -> Self {
        Self {
            camera: Box::new(SimulatedCamera::new(config.camera.frame_interval_millis)),
            tracker: Box::new(SimulatedTracker::default()),
            frame_renderer: Box::new(CameraFeedRenderer::new()),
            scene_renderer: Box::new(SceneGraphRenderer::new()),
        }
    }
}

/// What a single [`PipelineOrchestrator::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// `run` has not been called, or the pipeline was stopped.
    Idle,
    /// Paused; the frame loop was skipped entirely.
    Paused,
    /// The capture device had no frame ready.
    NoFrame,
    Dispatched(FrameReport),
}

/// Details of a dispatched frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// `on_start` fired on this frame.
    pub started: bool,
    pub status_change: Option<CameraStatus>,
    pub update: DispatchReport,
    /// A hook requested a stop, which ran after this frame completed.
    pub stopped: bool,
}

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    registry: ModuleRegistry,
    dispatcher: LifecycleDispatcher,
    state: PipelineStateMachine,
    camera: Box<dyn CaptureDevice>,
    tracker: Box<dyn TrackingProvider>,
    frame_renderer: Box<dyn FrameRenderer>,
    scene_renderer: Box<dyn SceneRenderer>,
    /// Set by `run`, cleared by `stop`.
    surface: Option<RenderSurface>,
    intrinsics: CameraIntrinsics,
    camera_status: CameraStatus,
    has_pose: bool,
    frames_dispatched: u64,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        let intrinsics = config
            .camera
            .setup_for(config.surface.width, config.surface.height)
            .intrinsics;
        Self {
            dispatcher: LifecycleDispatcher::new(config.failure_history),
            registry: ModuleRegistry::new(),
            state: PipelineStateMachine::new(),
            camera: collaborators.camera,
            tracker: collaborators.tracker,
            frame_renderer: collaborators.frame_renderer,
            scene_renderer: collaborators.scene_renderer,
            surface: None,
            intrinsics,
            camera_status: CameraStatus::Initializing,
            has_pose: false,
            frames_dispatched: 0,
            config,
        }
    }

    pub fn simulated(config: PipelineConfig) -> Self {
        let collaborators = Collaborators::simulated(&config);
        Self::new(config, collaborators)
    }

    /// Registers a module before or after `run`.
    ///
    /// The module receives `on_attach` immediately. If the pipeline has
    /// already started, it also receives `on_start` right away so it never
    /// sees a frame without having been started.
    pub fn add_module(&mut self, module: Box<dyn CameraPipelineModule>) -> Result<()> {
        let name = module.name().to_string();
        self.registry.register(module)?;

        let mut commands = ModuleCommands::new();
        self.introduce(&name, &mut commands);
        self.settle(&mut commands);
        Ok(())
    }

    /// Alias of [`add_module`](Self::add_module).
    pub fn add_camera_pipeline_module(
        &mut self,
        module: Box<dyn CameraPipelineModule>,
    ) -> Result<()> {
        self.add_module(module)
    }

    /// Unregisters a module, calling its `on_detach`. Returns `false` if no
    /// module had that name.
    pub fn remove_module(&mut self, name: &str) -> bool {
        let mut commands = ModuleCommands::new();
        let removed = self.detach(name, &mut commands);
        self.settle(&mut commands);
        removed
    }

    /// Registered module names in invocation order.
    pub fn modules(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Acquires the camera bound to `surface`. The pipeline starts on the
    /// first frame the device delivers. Calling `run` again while the
    /// pipeline is live is a no-op.
    pub fn run(&mut self, surface: RenderSurface) -> Result<()> {
        if self.surface.is_some() {
            tracing::debug!("run called on a live pipeline; ignoring");
            return Ok(());
        }

        self.camera.open(&surface).map_err(|err| match err {
            PipelineError::DeviceUnavailable(_) => err,
            other => PipelineError::DeviceUnavailable(other.to_string()),
        })?;

        tracing::info!(
            surface = %surface.id,
            width = surface.width,
            height = surface.height,
            "camera acquired"
        );
        self.intrinsics.pixel_rect_width = surface.width;
        self.intrinsics.pixel_rect_height = surface.height;
        self.surface = Some(surface);
        Ok(())
    }

    /// One iteration of the frame loop. Call once per display refresh.
    pub fn tick(&mut self) -> Result<FrameOutcome> {
        let Some(surface) = self.surface.clone() else {
            return Ok(FrameOutcome::Idle);
        };
        if self.state.is_paused() {
            return Ok(FrameOutcome::Paused);
        }
        let Some(frame) = self.camera.next_frame() else {
            return Ok(FrameOutcome::NoFrame);
        };

        let mut commands = ModuleCommands::new();
        let started = self.state.state() == PipelineState::Stopped
            && self.start(&surface, &mut commands);

        let tracking = self.tracker.track(&frame);
        self.has_pose |= tracking.pose.is_some();

        let mut status_change = None;
        if tracking.status != self.camera_status {
            tracing::info!(
                from = ?self.camera_status,
                to = ?tracking.status,
                "camera status changed"
            );
            self.camera_status = tracking.status;
            status_change = Some(tracking.status);
            self.dispatcher.dispatch(
                &mut self.registry,
                &mut LifecycleEvent::CameraStatusChange(tracking.status),
                &mut commands,
            );
            self.apply(&mut commands);
        }

        let context = FrameContext {
            frame_index: frame.index,
            canvas_width: surface.width,
            canvas_height: surface.height,
            intrinsics: self.intrinsics,
            pose: tracking.pose,
            camera_status: tracking.status,
            timestamp_millis: frame.timestamp_millis,
        };
        tracing::trace!(frame = context.frame_index, pose = ?context.pose, "dispatching frame");

        let mut update = self.dispatcher.dispatch(
            &mut self.registry,
            &mut LifecycleEvent::UpdateWithResults(&context),
            &mut commands,
        );
        update.failures.extend(self.apply(&mut commands));
        self.frames_dispatched += 1;

        let drawn = self.frame_renderer.draw_frame(&frame, &surface);
        let rendered = self.scene_renderer.render(&context);

        // A stop requested during this frame holds even if drawing failed.
        let stopped = commands.take_stop_request();
        if stopped {
            self.stop();
        }
        drawn?;
        rendered?;

        Ok(FrameOutcome::Dispatched(FrameReport {
            frame_index: context.frame_index,
            started,
            status_change,
            update,
            stopped,
        }))
    }

    /// Suspends frame dispatch. Returns `true` if the pipeline was running.
    pub fn pause(&mut self) -> bool {
        if !self.state.pause() {
            return false;
        }
        tracing::info!("pipeline paused");

        let mut commands = ModuleCommands::new();
        self.dispatcher
            .dispatch(&mut self.registry, &mut LifecycleEvent::Paused, &mut commands);
        if self.config.release_camera_on_pause {
            self.camera.release();
        }
        self.settle(&mut commands);
        true
    }

    /// Resumes frame dispatch, reacquiring the camera if `pause` released
    /// it. Returns `Ok(false)` if the pipeline was not paused.
    pub fn resume(&mut self) -> Result<bool> {
        if !self.state.is_paused() {
            return Ok(false);
        }
        if !self.camera.is_open() {
            if let Some(surface) = &self.surface {
                self.camera.open(surface)?;
            }
        }

        self.state.resume();
        tracing::info!("pipeline resumed");

        let mut commands = ModuleCommands::new();
        self.dispatcher
            .dispatch(&mut self.registry, &mut LifecycleEvent::Resumed, &mut commands);
        self.settle(&mut commands);
        Ok(true)
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn state(&self) -> PipelineState {
        self.state.state()
    }

    /// Re-anchors tracking to the current device pose. Works while paused;
    /// fails until the tracker has produced at least one pose.
    pub fn recenter(&mut self) -> Result<()> {
        if !self.has_pose {
            return Err(PipelineError::NotReady("no camera pose has been produced yet"));
        }
        tracing::info!("recentering tracker");
        self.tracker.recenter();
        Ok(())
    }

    /// Tears the pipeline down: every module receives `on_detach` and is
    /// dropped, the camera is released and the state machine reset. A later
    /// `run` starts a fresh lifetime.
    pub fn stop(&mut self) {
        let mut modules = self.registry.drain();
        let mut discarded = ModuleCommands::new();
        for module in modules.iter_mut() {
            self.dispatcher
                .dispatch_to(module.as_mut(), &mut LifecycleEvent::Detach, &mut discarded);
        }

        self.camera.release();
        if self.state.stop() || self.surface.is_some() {
            tracing::info!(modules = modules.len(), "pipeline stopped");
        }
        self.surface = None;
        self.has_pose = false;
        self.camera_status = CameraStatus::Initializing;
    }

    /// Changes the canvas size reported from the next frame on.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if let Some(surface) = self.surface.as_mut() {
            surface.width = width;
            surface.height = height;
            self.intrinsics.pixel_rect_width = width;
            self.intrinsics.pixel_rect_height = height;
        }
    }

    pub fn surface(&self) -> Option<&RenderSurface> {
        self.surface.as_ref()
    }

    pub fn camera_status(&self) -> CameraStatus {
        self.camera_status
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    pub fn frames_dispatched(&self) -> u64 {
        self.frames_dispatched
    }

    pub fn recent_failures(&self) -> impl Iterator<Item = &HookFailure> {
        self.dispatcher.recent_failures()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Moves to running and fires `on_start` on the first start of the
    /// lifetime. The tracker is seeded from config before the hooks run so a
    /// module's own camera setup takes precedence.
    fn start(&mut self, surface: &RenderSurface, commands: &mut ModuleCommands) -> bool {
        match self.state.start() {
            StartTransition::First => {}
            StartTransition::Ignored => return false,
        }
        tracing::info!(modules = self.registry.len(), "pipeline started");

        let setup = self.config.camera.setup_for(surface.width, surface.height);
        self.configure_camera(&setup);

        let mut event = LifecycleEvent::Start(StartContext {
            canvas_width: surface.width,
            canvas_height: surface.height,
            scene: self.scene_renderer.scene_mut(),
        });
        self.dispatcher
            .dispatch(&mut self.registry, &mut event, commands);
        self.apply(commands);
        true
    }

    fn configure_camera(&mut self, setup: &CameraSetup) {
        self.intrinsics = setup.intrinsics;
        self.tracker.configure(setup);
    }

    fn canvas_size(&self) -> (u32, u32) {
        match &self.surface {
            Some(surface) => (surface.width, surface.height),
            None => (self.config.surface.width, self.config.surface.height),
        }
    }

    /// Sends `on_attach`, and `on_start` if the lifetime already started, to
    /// a freshly registered module.
    fn introduce(&mut self, name: &str, commands: &mut ModuleCommands) {
        let (canvas_width, canvas_height) = self.canvas_size();
        let started = self.state.has_started();
        let Some(module) = self.registry.get_mut(name) else {
            return;
        };

        self.dispatcher
            .dispatch_to(&mut *module, &mut LifecycleEvent::Attach, commands);
        if started {
            tracing::debug!(module = name, "late registration; sending onStart");
            let mut event = LifecycleEvent::Start(StartContext {
                canvas_width,
                canvas_height,
                scene: self.scene_renderer.scene_mut(),
            });
            self.dispatcher.dispatch_to(module, &mut event, commands);
        }
    }

    fn detach(&mut self, name: &str, commands: &mut ModuleCommands) -> bool {
        let Some(mut module) = self.registry.unregister(name) else {
            return false;
        };
        self.dispatcher
            .dispatch_to(module.as_mut(), &mut LifecycleEvent::Detach, commands);
        true
    }

    /// Applies buffered registry changes, in issue order, and camera setup.
    /// Hooks triggered here may buffer further changes, which are applied in
    /// turn. Stop requests are left in the buffer for the caller.
    ///
    /// Returns the deferred registrations that were rejected; they are also
    /// kept in the dispatcher's failure history.
    fn apply(&mut self, commands: &mut ModuleCommands) -> Vec<HookFailure> {
        let mut rejected = Vec::new();
        loop {
            let changes = commands.take_registry_changes();
            let setup = commands.take_camera_setup();
            if changes.is_empty() && setup.is_none() {
                return rejected;
            }

            for change in changes {
                match change {
                    RegistryChange::Remove(name) => {
                        self.detach(&name, commands);
                    }
                    RegistryChange::Add(module) => {
                        let name = module.name().to_string();
                        match self.registry.register(module) {
                            Ok(()) => self.introduce(&name, commands),
                            Err(error) => rejected.push(self.reject(name, error)),
                        }
                    }
                }
            }
            if let Some(setup) = setup {
                tracing::debug!(
                    intrinsics = ?setup.intrinsics,
                    "camera projection updated by module"
                );
                self.configure_camera(&setup);
            }
        }
    }

    fn reject(&mut self, module: String, error: PipelineError) -> HookFailure {
        tracing::warn!(module = %module, %error, "deferred registration rejected");
        let failure = HookFailure {
            module,
            event: LifecycleHook::Attach,
            error: HookError::msg(error.to_string()),
        };
        self.dispatcher.record_failure(failure.clone());
        failure
    }

    /// `apply`, then honour any stop request.
    fn settle(&mut self, commands: &mut ModuleCommands) {
        self.apply(commands);
        if commands.take_stop_request() {
            self.stop();
        }
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        if !self.registry.is_empty() || self.surface.is_some() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("state", &self.state.state())
            .field("modules", &self.registry.list())
            .field("surface", &self.surface)
            .field("camera_status", &self.camera_status)
            .field("frames_dispatched", &self.frames_dispatched)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::test_support::{
        CallLog, CountingSceneRenderer, FailingFrameRenderer, RecordingModule, Shared,
    };
    use crate::{FnModule, LifecycleHook, Pose, Vec3};

    struct Harness {
        pipeline: PipelineOrchestrator,
        log: CallLog,
        camera: Rc<RefCell<SimulatedCamera>>,
        tracker: Rc<RefCell<SimulatedTracker>>,
        video: Rc<RefCell<CameraFeedRenderer>>,
        draws: Rc<RefCell<u64>>,
    }

    impl Harness {
        fn new(config: PipelineConfig, tracker: SimulatedTracker) -> Self {
            Self::with_camera(config, SimulatedCamera::new(33), tracker)
        }

        fn with_camera(
            config: PipelineConfig,
            camera: SimulatedCamera,
            tracker: SimulatedTracker,
        ) -> Self {
            let camera = Shared::new(camera);
            let tracker = Shared::new(tracker);
            let video = Shared::new(CameraFeedRenderer::new());
            let scene = CountingSceneRenderer::default();
            let draws = scene.draws.clone();
            let handles = (camera.handle(), tracker.handle(), video.handle());

            let pipeline = PipelineOrchestrator::new(
                config,
                Collaborators {
                    camera: Box::new(camera),
                    tracker: Box::new(tracker),
                    frame_renderer: Box::new(video),
                    scene_renderer: Box::new(scene),
                },
            );
            Self {
                pipeline,
                log: CallLog::default(),
                camera: handles.0,
                tracker: handles.1,
                video: handles.2,
                draws,
            }
        }

        fn simple() -> Self {
            Self::new(PipelineConfig::default(), SimulatedTracker::default())
        }

        fn add(&mut self, name: &str) {
            self.pipeline
                .add_module(RecordingModule::new(name, &self.log).boxed())
                .unwrap();
        }

        fn run(&mut self) {
            self.pipeline
                .run(RenderSurface::new("canvas", 640, 480))
                .unwrap();
        }

        fn ticks(&mut self, count: usize) -> Vec<FrameOutcome> {
            (0..count).map(|_| self.pipeline.tick().unwrap()).collect()
        }

        fn updates(&self) -> Vec<String> {
            self.log.calls_for(LifecycleHook::UpdateWithResults)
        }
    }

    fn report(outcome: &FrameOutcome) -> &FrameReport {
        match outcome {
            FrameOutcome::Dispatched(report) => report,
            other => panic!("expected a dispatched frame, got {other:?}"),
        }
    }

    #[test]
    fn three_frames_dispatch_modules_in_registration_order() {
        let mut h = Harness::simple();
        h.add("A");
        h.add("B");
        h.run();

        let outcomes = h.ticks(3);

        assert!(report(&outcomes[0]).started);
        assert!(!report(&outcomes[1]).started);
        assert_eq!(h.updates(), vec!["A", "B", "A", "B", "A", "B"]);
        assert_eq!(h.log.count("A", LifecycleHook::UpdateWithResults), 3);
        assert_eq!(h.log.count("B", LifecycleHook::UpdateWithResults), 3);

        let stamps: Vec<u64> = h
            .log
            .frames_for("A")
            .iter()
            .map(|frame| frame.timestamp_millis)
            .collect();
        assert_eq!(stamps, vec![0, 33, 66]);
        assert_eq!(h.video.borrow().frames_drawn(), 3);
        assert_eq!(*h.draws.borrow(), 3);
        assert_eq!(h.pipeline.frames_dispatched(), 3);
    }

    #[test]
    fn every_event_follows_registration_order() {
        let mut h = Harness::simple();
        for name in ["tracker", "video", "scene", "app"] {
            h.add(name);
        }
        h.run();
        h.ticks(1);
        h.pipeline.pause();
        h.pipeline.resume().unwrap();
        h.pipeline.stop();

        let expected = vec!["tracker", "video", "scene", "app"];
        for hook in [
            LifecycleHook::Attach,
            LifecycleHook::Start,
            LifecycleHook::CameraStatusChange,
            LifecycleHook::UpdateWithResults,
            LifecycleHook::Paused,
            LifecycleHook::Resumed,
            LifecycleHook::Detach,
        ] {
            assert_eq!(h.log.calls_for(hook), expected, "order of {hook}");
        }
    }

    #[test]
    fn nothing_happens_until_run_and_first_frame() {
        let mut h = Harness::simple();
        h.add("A");

        assert_eq!(h.pipeline.tick().unwrap(), FrameOutcome::Idle);
        assert!(!h.pipeline.pause());
        h.run();
        assert_eq!(h.pipeline.state(), PipelineState::Stopped);
        assert_eq!(h.log.count("A", LifecycleHook::Start), 0);

        h.ticks(1);
        assert_eq!(h.pipeline.state(), PipelineState::Running);
        assert_eq!(h.log.count("A", LifecycleHook::Start), 1);
    }

    #[test]
    fn pause_and_resume_mid_run_gate_frames_and_fire_once() {
        let mut h = Harness::simple();
        h.add("A");
        h.add("B");
        h.run();
        h.ticks(2);

        assert!(h.pipeline.pause());
        assert!(!h.pipeline.pause());
        assert!(h.pipeline.is_paused());
        let paused = h.ticks(3);
        assert!(paused.iter().all(|outcome| *outcome == FrameOutcome::Paused));
        assert_eq!(h.updates().len(), 4);

        assert!(h.pipeline.resume().unwrap());
        assert!(!h.pipeline.resume().unwrap());
        h.ticks(1);

        assert_eq!(h.updates().len(), 6);
        assert_eq!(h.log.calls_for(LifecycleHook::Paused), vec!["A", "B"]);
        assert_eq!(h.log.calls_for(LifecycleHook::Resumed), vec!["A", "B"]);

        let entries = h.log.entries();
        let paused_at = entries
            .iter()
            .position(|(hook, _)| *hook == LifecycleHook::Paused)
            .unwrap();
        let resumed_at = entries
            .iter()
            .position(|(hook, _)| *hook == LifecycleHook::Resumed)
            .unwrap();
        assert!(entries[paused_at..resumed_at]
            .iter()
            .all(|(hook, _)| *hook != LifecycleHook::UpdateWithResults));
    }

    #[test]
    fn on_start_fires_once_across_pause_cycles() {
        let mut h = Harness::simple();
        h.add("A");
        h.run();

        for _ in 0..3 {
            h.ticks(2);
            h.pipeline.pause();
            h.pipeline.resume().unwrap();
        }
        h.pipeline.run(RenderSurface::new("canvas", 640, 480)).unwrap();
        h.ticks(1);

        assert_eq!(h.log.count("A", LifecycleHook::Start), 1);
        assert_eq!(h.log.count("A", LifecycleHook::Paused), 3);
    }

    #[test]
    fn failing_update_hook_is_isolated() {
        let mut h = Harness::simple();
        h.pipeline
            .add_module(
                RecordingModule::new("A", &h.log)
                    .failing_on(LifecycleHook::UpdateWithResults)
                    .boxed(),
            )
            .unwrap();
        h.add("B");
        h.run();

        let outcomes = h.ticks(3);

        assert_eq!(h.updates(), vec!["A", "B", "A", "B", "A", "B"]);
        for outcome in &outcomes {
            let update = &report(outcome).update;
            assert_eq!(update.invoked, vec!["A", "B"]);
            assert_eq!(update.failures.len(), 1);
            assert_eq!(update.failures[0].module, "A");
        }
        assert_eq!(h.pipeline.recent_failures().count(), 3);
        assert_eq!(h.pipeline.state(), PipelineState::Running);
    }

    #[test]
    fn run_without_a_camera_stays_stopped() {
        let mut h = Harness::with_camera(
            PipelineConfig::default(),
            SimulatedCamera::unavailable(),
            SimulatedTracker::default(),
        );
        h.add("A");

        let err = h
            .pipeline
            .run(RenderSurface::new("canvas", 640, 480))
            .unwrap_err();

        assert!(matches!(err, PipelineError::DeviceUnavailable(_)));
        assert_eq!(h.pipeline.state(), PipelineState::Stopped);
        assert_eq!(h.pipeline.tick().unwrap(), FrameOutcome::Idle);
        assert_eq!(h.log.count("A", LifecycleHook::Start), 0);
    }

    #[test]
    fn duplicate_module_is_rejected_and_registry_unchanged() {
        let mut h = Harness::simple();
        h.add("A");
        h.add("B");

        let err = h
            .pipeline
            .add_module(RecordingModule::new("A", &h.log).boxed())
            .unwrap_err();

        assert!(matches!(err, PipelineError::DuplicateModuleName(ref name) if name == "A"));
        assert_eq!(h.pipeline.modules(), vec!["A", "B"]);
        assert_eq!(h.log.count("A", LifecycleHook::Attach), 1);
    }

    #[test]
    fn recenter_requires_a_pose_then_rebases_later_poses() {
        let tracker = SimulatedTracker::new(Vec3::new(1.0, 0.0, 0.0), 0.0).with_warmup(1);
        let mut h = Harness::new(PipelineConfig::default(), tracker);
        h.add("A");

        assert!(matches!(h.pipeline.recenter(), Err(PipelineError::NotReady(_))));
        h.run();
        h.ticks(1);
        assert!(matches!(h.pipeline.recenter(), Err(PipelineError::NotReady(_))));

        h.ticks(2);
        let before = h.log.frames_for("A")[2].pose.unwrap();
        assert!(before.position.distance(Vec3::new(2.0, 3.0, 0.0)) < 1e-4);

        h.pipeline.recenter().unwrap();
        h.ticks(1);

        let after = h.log.frames_for("A")[3].pose.unwrap();
        assert!(after.position.distance(Vec3::new(1.0, 3.0, 0.0)) < 1e-4);
        assert_eq!(h.tracker.borrow().recenter_count(), 1);
    }

    #[test]
    fn recenter_is_allowed_while_paused() {
        let mut h = Harness::simple();
        h.run();
        h.ticks(1);
        h.pipeline.pause();

        h.pipeline.recenter().unwrap();

        assert!(h.pipeline.is_paused());
        assert_eq!(h.tracker.borrow().recenter_count(), 1);
    }

    #[test]
    fn late_module_gets_attach_and_start_before_frames() {
        let mut h = Harness::simple();
        h.add("A");
        h.run();
        h.ticks(1);

        h.add("C");
        assert_eq!(
            h.log.entries().last().cloned(),
            Some((LifecycleHook::Start, "C".to_string()))
        );
        assert_eq!(h.log.count("C", LifecycleHook::Attach), 1);

        h.ticks(1);
        assert_eq!(h.log.count("C", LifecycleHook::UpdateWithResults), 1);
        assert_eq!(h.log.count("A", LifecycleHook::Start), 1);
    }

    #[test]
    fn registry_changes_from_hooks_apply_after_the_event() {
        let mut h = Harness::simple();
        let log = h.log.clone();
        let mut done = false;
        let a = RecordingModule::new("A", &h.log).on_update(move |_, commands| {
            if !done {
                commands.add_module(RecordingModule::new("late", &log).boxed());
                commands.remove_module("B");
                done = true;
            }
        });
        h.pipeline.add_module(a.boxed()).unwrap();
        h.add("B");
        h.run();

        h.ticks(1);
        assert_eq!(h.updates(), vec!["A", "B"]);
        assert_eq!(h.log.count("B", LifecycleHook::Detach), 1);
        assert_eq!(h.log.count("late", LifecycleHook::Start), 1);
        assert_eq!(h.pipeline.modules(), vec!["A", "late"]);

        h.log.clear();
        h.ticks(1);
        assert_eq!(h.updates(), vec!["A", "late"]);
    }

    #[test]
    fn adding_then_removing_from_a_hook_leaves_no_trace() {
        let mut h = Harness::simple();
        let log = h.log.clone();
        let mut done = false;
        let a = RecordingModule::new("A", &h.log).on_update(move |_, commands| {
            if !done {
                commands.add_module(RecordingModule::new("tmp", &log).boxed());
                commands.remove_module("tmp");
                done = true;
            }
        });
        h.pipeline.add_module(a.boxed()).unwrap();
        h.run();

        h.ticks(2);

        assert_eq!(h.pipeline.modules(), vec!["A"]);
        assert_eq!(h.log.count("tmp", LifecycleHook::Attach), 1);
        assert_eq!(h.log.count("tmp", LifecycleHook::Detach), 1);
        assert_eq!(h.log.count("tmp", LifecycleHook::UpdateWithResults), 0);
    }

    #[test]
    fn removing_then_adding_from_a_hook_replaces_the_module() {
        let mut h = Harness::simple();
        let log = h.log.clone();
        let mut done = false;
        let a = RecordingModule::new("A", &h.log).on_update(move |_, commands| {
            if !done {
                commands.remove_module("tmp");
                commands.add_module(RecordingModule::new("tmp", &log).boxed());
                done = true;
            }
        });
        h.pipeline.add_module(a.boxed()).unwrap();
        h.add("tmp");
        h.run();

        let outcome = h.pipeline.tick().unwrap();

        assert!(report(&outcome).update.is_clean());
        assert_eq!(h.pipeline.modules(), vec!["A", "tmp"]);
        let tmp_hooks: Vec<LifecycleHook> = h
            .log
            .entries()
            .into_iter()
            .filter(|(_, module)| module == "tmp")
            .map(|(hook, _)| hook)
            .collect();
        assert_eq!(
            tmp_hooks,
            vec![
                LifecycleHook::Attach,
                LifecycleHook::Start,
                LifecycleHook::CameraStatusChange,
                LifecycleHook::UpdateWithResults,
                LifecycleHook::Detach,
                LifecycleHook::Attach,
                LifecycleHook::Start,
            ]
        );
    }

    #[test]
    fn rejected_deferred_registration_is_reported() {
        let mut h = Harness::simple();
        let log = h.log.clone();
        let mut done = false;
        let a = RecordingModule::new("A", &h.log).on_update(move |_, commands| {
            if !done {
                commands.add_module(RecordingModule::new("B", &log).boxed());
                done = true;
            }
        });
        h.pipeline.add_module(a.boxed()).unwrap();
        h.add("B");
        h.run();

        let outcome = h.pipeline.tick().unwrap();

        let failures = &report(&outcome).update.failures;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].module, "B");
        assert_eq!(failures[0].event, LifecycleHook::Attach);
        assert!(failures[0].error.message().contains("already registered"));
        assert_eq!(h.pipeline.recent_failures().count(), 1);
        assert_eq!(h.pipeline.modules(), vec!["A", "B"]);
        assert_eq!(h.log.count("B", LifecycleHook::Attach), 1);
    }

    #[test]
    fn stop_requested_mid_frame_lets_the_frame_finish() {
        let mut h = Harness::simple();
        let a = RecordingModule::new("A", &h.log).on_update(|_, commands| commands.request_stop());
        h.pipeline.add_module(a.boxed()).unwrap();
        h.add("B");
        h.run();

        let outcome = h.pipeline.tick().unwrap();

        assert!(report(&outcome).stopped);
        let entries = h.log.entries();
        let tail: Vec<_> = entries[entries.len() - 4..].to_vec();
        assert_eq!(
            tail,
            vec![
                (LifecycleHook::UpdateWithResults, "A".to_string()),
                (LifecycleHook::UpdateWithResults, "B".to_string()),
                (LifecycleHook::Detach, "A".to_string()),
                (LifecycleHook::Detach, "B".to_string()),
            ]
        );
        assert_eq!(h.pipeline.state(), PipelineState::Stopped);
        assert!(h.pipeline.modules().is_empty());
        assert!(!h.camera.borrow().is_open());
        assert_eq!(h.pipeline.tick().unwrap(), FrameOutcome::Idle);
    }

    #[test]
    fn stop_request_survives_a_failing_renderer() {
        let log = CallLog::default();
        let mut pipeline = PipelineOrchestrator::new(
            PipelineConfig::default(),
            Collaborators {
                camera: Box::new(SimulatedCamera::new(33)),
                tracker: Box::new(SimulatedTracker::default()),
                frame_renderer: Box::new(FailingFrameRenderer),
                scene_renderer: Box::new(CountingSceneRenderer::default()),
            },
        );
        let a = RecordingModule::new("A", &log).on_update(|_, commands| commands.request_stop());
        pipeline.add_module(a.boxed()).unwrap();
        pipeline.run(RenderSurface::new("canvas", 640, 480)).unwrap();

        let err = pipeline.tick().unwrap_err();

        assert!(matches!(err, PipelineError::Render(_)));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(pipeline.modules().is_empty());
        assert_eq!(log.count("A", LifecycleHook::Detach), 1);
        assert_eq!(pipeline.tick().unwrap(), FrameOutcome::Idle);
    }

    #[test]
    fn stop_ends_the_lifetime_and_run_starts_a_new_one() {
        let mut h = Harness::simple();
        h.add("A");
        h.run();
        h.ticks(2);
        h.pipeline.stop();
        h.pipeline.stop();
        assert_eq!(h.log.count("A", LifecycleHook::Detach), 1);

        h.add("A");
        h.run();
        h.ticks(1);

        assert_eq!(h.log.count("A", LifecycleHook::Start), 2);
        assert_eq!(h.pipeline.state(), PipelineState::Running);
    }

    #[test]
    fn pause_can_release_and_resume_reacquires_the_camera() {
        let config = PipelineConfig {
            release_camera_on_pause: true,
            ..PipelineConfig::default()
        };
        let mut h = Harness::new(config, SimulatedTracker::default());
        h.add("A");
        h.run();
        h.ticks(1);

        h.pipeline.pause();
        assert!(!h.camera.borrow().is_open());

        h.pipeline.resume().unwrap();
        assert!(h.camera.borrow().is_open());
        assert_eq!(h.camera.borrow().open_count(), 2);

        h.ticks(1);
        let stamps: Vec<u64> = h
            .log
            .frames_for("A")
            .iter()
            .map(|frame| frame.timestamp_millis)
            .collect();
        assert_eq!(stamps, vec![0, 33]);
    }

    #[test]
    fn resume_stays_paused_when_the_camera_cannot_be_reacquired() {
        let config = PipelineConfig {
            release_camera_on_pause: true,
            ..PipelineConfig::default()
        };
        let mut h = Harness::new(config, SimulatedTracker::default());
        h.add("A");
        h.run();
        h.ticks(1);
        h.pipeline.pause();

        h.camera.borrow_mut().set_available(false);
        let err = h.pipeline.resume().unwrap_err();

        assert!(matches!(err, PipelineError::DeviceUnavailable(_)));
        assert!(h.pipeline.is_paused());
        assert_eq!(h.log.count("A", LifecycleHook::Resumed), 0);
        assert_eq!(h.pipeline.tick().unwrap(), FrameOutcome::Paused);

        h.camera.borrow_mut().set_available(true);
        assert!(h.pipeline.resume().unwrap());
        assert_eq!(h.log.count("A", LifecycleHook::Resumed), 1);
    }

    #[test]
    fn camera_status_changes_are_dispatched_once_per_change() {
        let tracker = SimulatedTracker::default()
            .with_warmup(1)
            .with_lost_frames(3..4);
        let mut h = Harness::new(PipelineConfig::default(), tracker);
        h.add("A");
        h.run();

        let changes: Vec<_> = h
            .ticks(5)
            .iter()
            .map(|outcome| report(outcome).status_change)
            .collect();

        assert_eq!(
            changes,
            vec![
                None,
                Some(CameraStatus::Tracking),
                None,
                Some(CameraStatus::Lost),
                Some(CameraStatus::Tracking),
            ]
        );
        assert_eq!(h.log.count("A", LifecycleHook::CameraStatusChange), 3);
        assert!(h.log.frames_for("A")[3].pose.is_none());
    }

    #[test]
    fn camera_setup_from_on_start_reseeds_tracking() {
        let mut h = Harness::simple();
        let objects = Rc::new(RefCell::new(0));
        let seen = objects.clone();
        let app = FnModule::new("app").on_start(move |start, commands| {
            start.scene.add("marker", Vec3::new(0.0, 0.0, -5.0));
            *seen.borrow_mut() = start.scene.objects().len();

            let mut setup = crate::CameraConfig::default()
                .setup_for(start.canvas_width, start.canvas_height);
            setup.intrinsics.far_clip_plane = 50.0;
            setup.origin = Vec3::new(0.0, 0.0, 5.0);
            commands.update_camera_projection(setup);
            Ok(())
        });
        h.pipeline.add_module(Box::new(app)).unwrap();
        h.add("A");
        h.run();

        h.ticks(1);

        assert_eq!(*objects.borrow(), 1);
        let frame = &h.log.frames_for("A")[0];
        assert_eq!(frame.intrinsics.far_clip_plane, 50.0);
        assert_eq!(frame.canvas_width, 640);
        let pose: Pose = frame.pose.unwrap();
        assert!(pose.position.distance(Vec3::new(0.0, 0.0, 5.0)) < 1e-4);
    }

    #[test]
    fn resize_is_visible_from_the_next_frame() {
        let mut h = Harness::simple();
        h.add("A");
        h.run();
        h.ticks(1);

        h.pipeline.resize_surface(320, 200);
        h.ticks(1);

        let frames = h.log.frames_for("A");
        assert_eq!((frames[0].canvas_width, frames[0].canvas_height), (640, 480));
        assert_eq!((frames[1].canvas_width, frames[1].canvas_height), (320, 200));
        assert_eq!(frames[1].intrinsics.pixel_rect_width, 320);
    }

    #[test]
    fn remove_module_detaches_and_ignores_unknown_names() {
        let mut h = Harness::simple();
        h.add("A");
        h.add("B");

        assert!(h.pipeline.remove_module("A"));
        assert!(!h.pipeline.remove_module("missing"));

        assert_eq!(h.log.calls_for(LifecycleHook::Detach), vec!["A"]);
        assert_eq!(h.pipeline.modules(), vec!["B"]);
    }

    #[test]
    fn dropping_the_orchestrator_detaches_modules() {
        let mut h = Harness::simple();
        h.add("A");
        let log = h.log.clone();

        drop(h);

        assert_eq!(log.count("A", LifecycleHook::Detach), 1);
    }
}
