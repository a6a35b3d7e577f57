use crate::{FrameContext, Pose, RenderSurface, Result, Vec3, VideoFrame};

/// Draws the incoming camera frame onto the display surface.
pub trait FrameRenderer {
    fn draw_frame(&mut self, frame: &VideoFrame, surface: &RenderSurface) -> Result<()>;
}

/// Owns the 3D scene and performs the draw call for each frame.
pub trait SceneRenderer {
    /// Scene handed to modules in `on_start`.
    fn scene_mut(&mut self) -> &mut Scene;

    fn render(&mut self, frame: &FrameContext) -> Result<()>;
}

/// Named object placed in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub position: Vec3,
}

/// Scene graph content: a camera plus a flat list of objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub camera: Pose,
    objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, position: Vec3) {
        self.objects.push(SceneObject {
            name: name.into(),
            position,
        });
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|object| object.name == name)
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }
}

/// Placeholder video renderer. Keeps track of what it was asked to draw.
#[derive(Debug, Default)]
pub struct CameraFeedRenderer {
    frames_drawn: u64,
    last_frame: Option<VideoFrame>,
}

impl CameraFeedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn last_frame(&self) -> Option<&VideoFrame> {
        self.last_frame.as_ref()
    }
}

impl FrameRenderer for CameraFeedRenderer {
    fn draw_frame(&mut self, frame: &VideoFrame, surface: &RenderSurface) -> Result<()> {
        tracing::trace!(frame = frame.index, surface = %surface.id, "drawing camera frame");
        self.frames_drawn += 1;
        self.last_frame = Some(*frame);
        Ok(())
    }
}

/// Scene renderer that drives the scene camera from the tracked pose. The
/// draw itself is a placeholder until a GPU backend is wired in.
#[derive(Debug, Default)]
pub struct SceneGraphRenderer {
    scene: Scene,
    draw_calls: u64,
    projection: Option<[f32; 16]>,
}

impl SceneGraphRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn projection(&self) -> Option<&[f32; 16]> {
        self.projection.as_ref()
    }
}

impl SceneRenderer for SceneGraphRenderer {
    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn render(&mut self, frame: &FrameContext) -> Result<()> {
        if let Some(pose) = frame.pose {
            self.scene.camera = pose;
        }
        self.projection = Some(frame.intrinsics.projection_matrix());
        self.draw_calls += 1;
        Ok(())
    }
}
