//! Modules the demo host installs on the pipeline.

use camera_pipeline_core::{
    CameraPipelineModule, CameraStatus, FrameContext, HookResult, HookSet, LifecycleHook,
    ModuleCommands, PipelineConfig, StartContext, Vec3,
};

/// Lays out a ground grid of markers, places the scene camera above the
/// origin and seeds tracking from that camera.
#[derive(Debug)]
pub struct SceneSeeder {
    camera_height: f32,
    grid_extent: i32,
}

impl Default for SceneSeeder {
    fn default() -> Self {
        Self {
            camera_height: 3.0,
            grid_extent: 5,
        }
    }
}

impl CameraPipelineModule for SceneSeeder {
    fn name(&self) -> &str {
        "scene-seeder"
    }

    fn hooks(&self) -> HookSet {
        HookSet::of(&[LifecycleHook::Start])
    }

    fn on_start(
        &mut self,
        start: &mut StartContext<'_>,
        commands: &mut ModuleCommands,
    ) -> HookResult {
        for x in -self.grid_extent..=self.grid_extent {
            for z in -self.grid_extent..=self.grid_extent {
                // Objects at y = 0 sit on the tracked ground plane.
                start
                    .scene
                    .add(format!("marker-{x}-{z}"), Vec3::new(x as f32, 0.0, z as f32));
            }
        }
        start.scene.camera.position = Vec3::new(0.0, self.camera_height, 0.0);

        let mut setup = PipelineConfig::default()
            .camera
            .setup_for(start.canvas_width, start.canvas_height);
        setup.origin = start.scene.camera.position;
        setup.facing = start.scene.camera.orientation;
        commands.update_camera_projection(setup);

        tracing::info!(objects = start.scene.objects().len(), "scene seeded");
        Ok(())
    }
}

/// Logs tracking progress.
#[derive(Debug)]
pub struct FrameLogger {
    every: u64,
    frames: u64,
}

impl FrameLogger {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            frames: 0,
        }
    }
}

impl CameraPipelineModule for FrameLogger {
    fn name(&self) -> &str {
        "frame-logger"
    }

    fn hooks(&self) -> HookSet {
        HookSet::of(&[
            LifecycleHook::UpdateWithResults,
            LifecycleHook::Paused,
            LifecycleHook::Resumed,
            LifecycleHook::CameraStatusChange,
            LifecycleHook::Detach,
        ])
    }

    fn on_update_with_results(
        &mut self,
        frame: &FrameContext,
        _commands: &mut ModuleCommands,
    ) -> HookResult {
        self.frames += 1;
        if self.frames % self.every == 0 {
            match frame.pose {
                Some(pose) => tracing::info!(
                    frame = frame.frame_index,
                    t = frame.timestamp_millis,
                    x = pose.position.x,
                    y = pose.position.y,
                    z = pose.position.z,
                    "camera pose"
                ),
                None => tracing::info!(frame = frame.frame_index, "no camera pose yet"),
            }
        }
        Ok(())
    }

    fn on_paused(&mut self) -> HookResult {
        tracing::info!(frames = self.frames, "paused");
        Ok(())
    }

    fn on_resumed(&mut self) -> HookResult {
        tracing::info!("resumed");
        Ok(())
    }

    fn on_camera_status_change(&mut self, status: CameraStatus) -> HookResult {
        tracing::info!(?status, "camera status");
        Ok(())
    }

    fn on_detach(&mut self) -> HookResult {
        tracing::info!(frames = self.frames, "frame logger detached");
        Ok(())
    }
}
