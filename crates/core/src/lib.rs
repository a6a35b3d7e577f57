//! Core library for the AR camera pipeline.
//!
//! A live camera feed is handed, frame by frame, through an ordered list of
//! pluggable modules. The crate provides the pieces that make that work:
//! the module contract and registry, lifecycle dispatch with per-module
//! failure isolation, the run/pause/resume state machine, and the
//! orchestrator that drives the frame loop against a capture device, a
//! tracking provider and two renderers. Simulated collaborators are
//! included so the loop can be exercised without hardware.

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod math;
pub mod module;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod state;
pub mod tracking;

#[cfg(test)]
mod test_support;

pub use capture::{CaptureDevice, FrameClock, SimulatedCamera};
pub use config::{CameraConfig, CameraSetup, PipelineConfig, SurfaceConfig};
pub use dispatch::{DispatchReport, HookFailure, LifecycleDispatcher, LifecycleEvent};
pub use error::{HookError, HookResult, PipelineError, Result};
pub use frame::{CameraIntrinsics, FrameContext, RenderSurface, StartContext, VideoFrame};
pub use math::{Pose, Quaternion, Vec3};
pub use module::{CameraPipelineModule, FnModule, HookSet, LifecycleHook, ModuleCommands};
pub use pipeline::{Collaborators, FrameOutcome, FrameReport, PipelineOrchestrator};
pub use registry::ModuleRegistry;
pub use render::{
    CameraFeedRenderer, FrameRenderer, Scene, SceneGraphRenderer, SceneObject, SceneRenderer,
};
pub use state::{PipelineState, PipelineStateMachine, StartTransition};
pub use tracking::{CameraStatus, SimulatedTracker, TrackingProvider, TrackingResult};
