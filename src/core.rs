//! Core data types shared by the hardware adapters and the acquisition engine.
//!
//! # Overview
//!
//! - [`Frame`]: one captured (or averaged) image with its bit depth
//! - [`CaptureOutcome`]: what a single camera read produced
//! - [`Bounds`] and [`CameraConfig`]: hardware-reported limits and the clamped settings
//! - [`Axis`], [`StagePosition`]: stage coordinates in micrometres
//! - [`Color`]: the LED palette and its single-byte serial commands

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Frames
// =============================================================================

/// Image produced by the camera or by the averaging stage.
///
/// Pixels are stored row-major as `u16`, which covers every bit depth the rig's
/// sensors emit (8 to 16 bits).
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel data (row-major, `width * height` entries for a complete frame)
    pub pixels: Vec<u16>,
    /// Significant bits per pixel
    pub bits_per_pixel: u8,
}

impl Frame {
    /// Creates a frame, without checking that the buffer matches the geometry.
    pub fn new(width: u32, height: u32, pixels: Vec<u16>, bits_per_pixel: u8) -> Self {
        Self {
            width,
            height,
            pixels,
            bits_per_pixel,
        }
    }

    /// Number of pixels implied by the frame geometry.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// A frame is complete when its buffer holds exactly `width * height` pixels.
    pub fn is_complete(&self) -> bool {
        self.pixels.len() == self.expected_len()
    }

    /// Largest value representable at this bit depth (`2^bpp - 1`).
    pub fn max_value(&self) -> u32 {
        let bits = u32::from(self.bits_per_pixel.clamp(1, 16));
        (1u32 << bits) - 1
    }

    /// Image dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Result of a single camera read.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureOutcome {
    /// A full frame was delivered
    Complete(Frame),
    /// The driver reported a partial or corrupt buffer; callers discard it
    Incomplete,
}

// =============================================================================
// Camera settings
// =============================================================================

/// Inclusive `[min, max]` range reported by the hardware.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamps `value` into the range. Non-finite input collapses to the lower bound.
    pub fn clamp(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return if value == f64::INFINITY {
                self.max
            } else {
                self.min
            };
        }
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Exposure range used before a camera has reported its own (µs).
pub const DEFAULT_EXPOSURE_BOUNDS: Bounds = Bounds::new(0.006, 2_999_999.0);
/// Gain range of the rig's sensor (dB).
pub const DEFAULT_GAIN_BOUNDS: Bounds = Bounds::new(0.0, 47.0);
/// Frame-rate range used before a camera has reported its own (fps).
pub const DEFAULT_FRAME_RATE_BOUNDS: Bounds = Bounds::new(1.0, 67.0);

/// Camera settings together with the bounds they are clamped to.
///
/// Every setter clamps before storing, and returns the value that must be forwarded
/// to the driver. Out-of-range input is never rejected.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    exposure_us: f64,
    gain_db: f64,
    frame_rate_fps: f64,
    video_mode: String,
    exposure_bounds: Bounds,
    gain_bounds: Bounds,
    frame_rate_bounds: Bounds,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            exposure_us: DEFAULT_EXPOSURE_BOUNDS.min,
            gain_db: DEFAULT_GAIN_BOUNDS.min,
            frame_rate_fps: DEFAULT_FRAME_RATE_BOUNDS.min,
            video_mode: "7".to_string(),
            exposure_bounds: DEFAULT_EXPOSURE_BOUNDS,
            gain_bounds: DEFAULT_GAIN_BOUNDS,
            frame_rate_bounds: DEFAULT_FRAME_RATE_BOUNDS,
        }
    }
}

impl CameraConfig {
    pub fn exposure_us(&self) -> f64 {
        self.exposure_us
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    pub fn frame_rate_fps(&self) -> f64 {
        self.frame_rate_fps
    }

    pub fn video_mode(&self) -> &str {
        &self.video_mode
    }

    pub fn exposure_bounds(&self) -> Bounds {
        self.exposure_bounds
    }

    pub fn gain_bounds(&self) -> Bounds {
        self.gain_bounds
    }

    pub fn frame_rate_bounds(&self) -> Bounds {
        self.frame_rate_bounds
    }

    /// Replaces the bounds with the ones reported by a freshly connected camera.
    pub fn apply_hardware_bounds(&mut self, exposure: Bounds, frame_rate: Bounds) {
        self.exposure_bounds = exposure;
        self.frame_rate_bounds = frame_rate;
        self.exposure_us = exposure.clamp(self.exposure_us);
        self.frame_rate_fps = frame_rate.clamp(self.frame_rate_fps);
    }

    pub fn set_exposure(&mut self, exposure_us: f64) -> f64 {
        self.exposure_us = self.exposure_bounds.clamp(exposure_us);
        self.exposure_us
    }

    pub fn set_gain(&mut self, gain_db: f64) -> f64 {
        self.gain_db = self.gain_bounds.clamp(gain_db);
        self.gain_db
    }

    pub fn set_frame_rate(&mut self, frame_rate_fps: f64) -> f64 {
        self.frame_rate_fps = self.frame_rate_bounds.clamp(frame_rate_fps);
        self.frame_rate_fps
    }

    /// Records the rate the camera actually settled on after a set.
    pub fn record_frame_rate(&mut self, frame_rate_fps: f64) {
        self.frame_rate_fps = frame_rate_fps;
    }

    pub fn set_video_mode(&mut self, mode: impl Into<String>) {
        self.video_mode = mode.into();
    }
}

/// How the camera driver treats frames that arrive faster than they are read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Drop everything but the most recent frame
    NewestOnly,
}

/// Camera acquisition mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionMode {
    Continuous,
}

// =============================================================================
// Stage
// =============================================================================

/// Stage axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the stage position in micrometres, as read back from the controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl StagePosition {
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
    }
}

// =============================================================================
// Illumination
// =============================================================================

/// LED colors understood by the illumination controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Yellow,
    Green,
    Blue,
    /// All LEDs off
    Off,
}

impl Color {
    /// Fixed illumination order of the four-color sequence.
    pub const FOUR_COLOR_CYCLE: [Color; 4] = [Color::Red, Color::Yellow, Color::Green, Color::Blue];

    /// Single-byte command sent over the serial line.
    pub fn command_byte(&self) -> u8 {
        match self {
            Color::Red => b'r',
            Color::Yellow => b'y',
            Color::Green => b'g',
            Color::Blue => b'b',
            Color::Off => b'c',
        }
    }

    /// Stem used in four-color file names.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Color::Red => "r",
            Color::Yellow => "y",
            Color::Green => "g",
            Color::Blue => "b",
            Color::Off => "off",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Color::Red => "red",
            Color::Yellow => "yellow",
            Color::Green => "green",
            Color::Blue => "blue",
            Color::Off => "off",
        };
        f.write_str(name)
    }
}
