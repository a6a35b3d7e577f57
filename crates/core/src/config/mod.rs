use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CameraIntrinsics, Pose, Quaternion, Result, Vec3};

/// Top-level configuration structure for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub camera: CameraConfig,
    pub surface: SurfaceConfig,
    /// Release the capture device while paused and reacquire it on resume.
    pub release_camera_on_pause: bool,
    /// Number of recent hook failures the dispatcher keeps for inspection.
    pub failure_history: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            surface: SurfaceConfig::default(),
            release_camera_on_pause: false,
            failure_history: 64,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Camera parameters handed to the tracking provider when the pipeline
/// starts, unless a module submits its own [`CameraSetup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub near_clip_plane: f32,
    pub far_clip_plane: f32,
    pub vertical_fov_degrees: f32,
    /// Scene position the tracker's reference frame is anchored to.
    pub origin: Vec3,
    /// Scene orientation the tracker's reference frame is anchored to.
    pub facing: Quaternion,
    /// Interval between frames produced by the simulated capture device.
    pub frame_interval_millis: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            near_clip_plane: 0.01,
            far_clip_plane: 1000.0,
            vertical_fov_degrees: 60.0,
            origin: Vec3::new(0.0, 3.0, 0.0),
            facing: Quaternion::IDENTITY,
            frame_interval_millis: 33,
        }
    }
}

impl CameraConfig {
    /// Builds the setup for a surface of the given pixel size.
    pub fn setup_for(&self, pixel_rect_width: u32, pixel_rect_height: u32) -> CameraSetup {
        CameraSetup {
            intrinsics: CameraIntrinsics {
                pixel_rect_width,
                pixel_rect_height,
                near_clip_plane: self.near_clip_plane,
                far_clip_plane: self.far_clip_plane,
                vertical_fov_degrees: self.vertical_fov_degrees,
            },
            origin: self.origin,
            facing: self.facing,
        }
    }
}

/// Default render surface used by hosts that do not supply their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            id: "camera-canvas".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Intrinsics plus the origin/facing that seed the tracker's reference
/// frame. Modules may submit one from `on_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSetup {
    pub intrinsics: CameraIntrinsics,
    pub origin: Vec3,
    pub facing: Quaternion,
}

impl CameraSetup {
    pub fn origin_pose(&self) -> Pose {
        Pose::new(self.origin, self.facing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "release_camera_on_pause": true, "camera": { "far_clip_plane": 50.0 } }"#;
        let config = PipelineConfig::from_json_str(json).unwrap();

        assert!(config.release_camera_on_pause);
        assert_eq!(config.camera.far_clip_plane, 50.0);
        assert_eq!(config.camera.near_clip_plane, 0.01);
        assert_eq!(config.surface, SurfaceConfig::default());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = PipelineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::PipelineError::Config(_)));
    }

    #[test]
    fn setup_carries_surface_size_and_seed() {
        let setup = CameraConfig::default().setup_for(320, 240);
        assert_eq!(setup.intrinsics.pixel_rect_width, 320);
        assert_eq!(setup.intrinsics.pixel_rect_height, 240);
        assert_eq!(setup.origin_pose().position, Vec3::new(0.0, 3.0, 0.0));
    }
}
