//! Device adapter interfaces.
//!
//! Each adapter is a thin capability trait over one piece of rig hardware. The
//! acquisition engine calls into these traits; adapters never call back into the engine.
//!
//! - [`Camera`]: discovery, configuration and frame retrieval
//! - [`Stage`]: three-axis motion with acknowledgement timeouts
//! - [`Illumination`]: single-byte LED color commands
//!
//! Simulated implementations live in [`mock`]; the serial LED controller lives in
//! [`serial_led`].

pub mod mock;
pub mod motion;
pub mod serial_led;

use crate::core::{AcquisitionMode, Axis, Bounds, BufferPolicy, CaptureOutcome};
use crate::error::AppResult;
use async_trait::async_trait;

/// Camera capability.
///
/// Setters receive values the engine has already clamped; drivers forward them as-is.
#[async_trait]
pub trait Camera: Send {
    /// Finds and opens the device matching `identifier` (empty selects the first one).
    ///
    /// Fails with `DeviceNotFound` when nothing matches. Connecting again to the same
    /// identifier is a no-op.
    async fn connect(&mut self, identifier: &str) -> AppResult<()>;

    async fn initialize(&mut self) -> AppResult<()>;

    fn is_connected(&self) -> bool;

    /// Sensor geometry `(width, height)` used for the complete-frame check.
    fn sensor_size(&self) -> (u32, u32);

    async fn exposure_bounds(&mut self) -> AppResult<Bounds>;
    async fn frame_rate_bounds(&mut self) -> AppResult<Bounds>;

    async fn disable_auto_exposure(&mut self) -> AppResult<()>;
    async fn disable_auto_gain(&mut self) -> AppResult<()>;
    async fn disable_auto_frame_rate(&mut self) -> AppResult<()>;

    async fn set_video_mode(&mut self, mode: &str) -> AppResult<()>;
    async fn set_buffer_policy(&mut self, policy: BufferPolicy) -> AppResult<()>;
    async fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> AppResult<()>;

    async fn start_acquisition(&mut self) -> AppResult<()>;
    async fn end_acquisition(&mut self) -> AppResult<()>;

    /// Pulls the next frame. Fails with `StreamNotActive` outside continuous acquisition.
    async fn capture_frame(&mut self) -> AppResult<CaptureOutcome>;

    async fn set_exposure(&mut self, exposure_us: f64) -> AppResult<()>;
    async fn set_gain(&mut self, gain_db: f64) -> AppResult<()>;
    async fn set_frame_rate(&mut self, frame_rate_fps: f64) -> AppResult<()>;
    /// Effective frame rate as reported by the device.
    async fn frame_rate(&mut self) -> AppResult<f64>;
}

/// Three-axis motion stage, positions in micrometres.
///
/// Moves resolve once the controller acknowledges completion. Implementations bound the
/// wait with a hardware timeout and report `MotionTimeout`, leaving the position at the
/// last acknowledged value.
#[async_trait]
pub trait Stage: Send {
    async fn home(&mut self, axis: Axis) -> AppResult<()>;
    async fn move_relative(&mut self, axis: Axis, delta_um: f64) -> AppResult<()>;
    async fn move_absolute(&mut self, axis: Axis, position_um: f64) -> AppResult<()>;
    async fn position(&mut self, axis: Axis) -> AppResult<f64>;
}

/// LED illumination controller.
#[async_trait]
pub trait Illumination: Send {
    async fn connect(&mut self) -> AppResult<()>;

    /// Sends one command byte. Fire-and-forget: no acknowledgement is awaited.
    async fn send_color_command(&mut self, command: u8) -> AppResult<()>;
}
