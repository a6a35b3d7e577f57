use serde::{Deserialize, Serialize};

use crate::{render::Scene, tracking::CameraStatus, Pose};

/// Display surface the camera feed is bound to and drawn onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSurface {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

impl RenderSurface {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
        }
    }
}

/// Projection parameters of the AR camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub pixel_rect_width: u32,
    pub pixel_rect_height: u32,
    pub near_clip_plane: f32,
    pub far_clip_plane: f32,
    pub vertical_fov_degrees: f32,
}

impl CameraIntrinsics {
    pub fn aspect_ratio(&self) -> f32 {
        if self.pixel_rect_height == 0 {
            return 1.0;
        }
        self.pixel_rect_width as f32 / self.pixel_rect_height as f32
    }

    /// Column-major right-handed perspective projection.
    pub fn projection_matrix(&self) -> [f32; 16] {
        let f = 1.0 / (self.vertical_fov_degrees.to_radians() * 0.5).tan();
        let (near, far) = (self.near_clip_plane, self.far_clip_plane);
        let depth = near - far;

        let mut m = [0.0; 16];
        m[0] = f / self.aspect_ratio();
        m[5] = f;
        m[10] = (far + near) / depth;
        m[11] = -1.0;
        m[14] = 2.0 * far * near / depth;
        m
    }
}

/// A frame delivered by the capture device. Pixel data stays with the
/// device; the pipeline only needs its identity and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFrame {
    pub index: u64,
    /// Monotonic capture time.
    pub timestamp_millis: u64,
    pub width: u32,
    pub height: u32,
}

/// Immutable per-frame payload handed to every module's
/// `on_update_with_results` hook.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameContext {
    pub frame_index: u64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub intrinsics: CameraIntrinsics,
    /// `None` until the tracking provider has converged.
    pub pose: Option<Pose>,
    pub camera_status: CameraStatus,
    pub timestamp_millis: u64,
}

/// Payload of `on_start`: canvas geometry and the 3D renderer's scene.
#[derive(Debug)]
pub struct StartContext<'a> {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub scene: &'a mut Scene,
}
