use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{config::CameraSetup, Pose, Quaternion, Vec3, VideoFrame};

/// Tracking quality reported by the pose-tracking provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraStatus {
    /// No pose yet; the provider is still converging.
    Initializing,
    Tracking,
    /// Tracking was lost; poses are unavailable until it is regained.
    Lost,
}

/// What the tracking provider reports for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingResult {
    pub pose: Option<Pose>,
    pub status: CameraStatus,
}

/// Turns raw video/sensor data into a 6DoF camera transform.
pub trait TrackingProvider {
    /// Applies new intrinsics and re-seeds the reference frame at the
    /// setup's origin and facing.
    fn configure(&mut self, setup: &CameraSetup);

    /// Produces the pose for `frame`, expressed in the current reference
    /// frame.
    fn track(&mut self, frame: &VideoFrame) -> TrackingResult;

    /// Re-anchors the reference frame so the current device pose maps to
    /// the configured origin and facing.
    fn recenter(&mut self);
}

/// Deterministic tracker used by tests and the demo host.
///
/// The device moves by a fixed step and yaw each frame. The first
/// `warmup_frames` frames produce no pose, and frames inside the scripted
/// lost window report [`CameraStatus::Lost`].
#[derive(Debug, Clone)]
pub struct SimulatedTracker {
    step: Vec3,
    yaw_per_frame: f32,
    warmup_frames: u64,
    lost_frames: Option<Range<u64>>,
    origin: Pose,
    reference: Pose,
    device_pose: Pose,
    frames_seen: u64,
    recenter_count: u32,
}

impl Default for SimulatedTracker {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, -0.01), 0.0)
    }
}

impl SimulatedTracker {
    pub fn new(step: Vec3, yaw_per_frame: f32) -> Self {
        Self {
            step,
            yaw_per_frame,
            warmup_frames: 0,
            lost_frames: None,
            origin: Pose::IDENTITY,
            reference: Pose::IDENTITY,
            device_pose: Pose::IDENTITY,
            frames_seen: 0,
            recenter_count: 0,
        }
    }

    /// Number of initial frames that produce no pose.
    pub fn with_warmup(mut self, frames: u64) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Frame indices (in tracked-frame order) during which tracking is lost.
    pub fn with_lost_frames(mut self, frames: Range<u64>) -> Self {
        self.lost_frames = Some(frames);
        self
    }

    pub fn recenter_count(&self) -> u32 {
        self.recenter_count
    }

    pub fn origin(&self) -> Pose {
        self.origin
    }

    fn advance_device(&mut self) {
        if self.frames_seen == 0 {
            return;
        }
        let yaw = Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), self.yaw_per_frame);
        let delta = Pose::new(self.step, yaw);
        self.device_pose = self.device_pose.compose(&delta);
    }
}

impl TrackingProvider for SimulatedTracker {
    fn configure(&mut self, setup: &CameraSetup) {
        self.origin = setup.origin_pose();
        self.reference = self.device_pose;
        tracing::debug!(origin = ?self.origin.position, "tracker reference frame seeded");
    }

    fn track(&mut self, _frame: &VideoFrame) -> TrackingResult {
        self.advance_device();
        let index = self.frames_seen;
        self.frames_seen += 1;

        if index < self.warmup_frames {
            return TrackingResult {
                pose: None,
                status: CameraStatus::Initializing,
            };
        }

        if self
            .lost_frames
            .as_ref()
            .is_some_and(|lost| lost.contains(&index))
        {
            return TrackingResult {
                pose: None,
                status: CameraStatus::Lost,
            };
        }

        let relative = self.device_pose.relative_to(&self.reference);
        TrackingResult {
            pose: Some(self.origin.compose(&relative)),
            status: CameraStatus::Tracking,
        }
    }

    fn recenter(&mut self) {
        self.reference = self.device_pose;
        self.recenter_count += 1;
    }
}
