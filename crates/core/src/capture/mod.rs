use crate::{PipelineError, RenderSurface, Result, VideoFrame};

/// Exclusive handle on the camera feed. Only the orchestrator opens and
/// releases it.
pub trait CaptureDevice {
    /// Opens the device bound to `surface`. Opening an already open device
    /// is a no-op.
    fn open(&mut self, surface: &RenderSurface) -> Result<()>;

    /// Returns the next ready frame, or `None` if nothing is available yet
    /// or the device is closed.
    fn next_frame(&mut self) -> Option<VideoFrame>;

    fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// Monotonic capture clock in milliseconds.
#[derive(Debug, Default, Clone)]
pub struct FrameClock {
    pub time_millis: u64,
}

impl FrameClock {
    pub fn advance(&mut self, delta_millis: u64) {
        self.time_millis = self.time_millis.saturating_add(delta_millis);
    }
}

/// Camera that produces a frame every time it is polled, spaced by a fixed
/// interval. The clock keeps running across release/reopen so timestamps
/// stay monotonic.
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    frame_interval_millis: u64,
    available: bool,
    open_surface: Option<(u32, u32)>,
    clock: FrameClock,
    next_index: u64,
    open_count: u32,
}

impl SimulatedCamera {
    pub fn new(frame_interval_millis: u64) -> Self {
        Self {
            frame_interval_millis,
            available: true,
            open_surface: None,
            clock: FrameClock::default(),
            next_index: 0,
            open_count: 0,
        }
    }

    /// A camera whose device can never be opened.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(33)
        }
    }

    /// Makes later `open` calls succeed or fail. An already open device
    /// stays open until released.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Number of successful `open` calls.
    pub fn open_count(&self) -> u32 {
        self.open_count
    }
}

impl CaptureDevice for SimulatedCamera {
    fn open(&mut self, surface: &RenderSurface) -> Result<()> {
        if !self.available {
            return Err(PipelineError::DeviceUnavailable(format!(
                "no camera bound to surface `{}`",
                surface.id
            )));
        }
        if self.open_surface.is_none() {
            self.open_surface = Some((surface.width, surface.height));
            self.open_count += 1;
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Option<VideoFrame> {
        let (width, height) = self.open_surface?;
        let frame = VideoFrame {
            index: self.next_index,
            timestamp_millis: self.clock.time_millis,
            width,
            height,
        };
        self.next_index += 1;
        self.clock.advance(self.frame_interval_millis);
        Some(frame)
    }

    fn release(&mut self) {
        self.open_surface = None;
    }

    fn is_open(&self) -> bool {
        self.open_surface.is_some()
    }
}
