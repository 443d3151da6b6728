//! Capture requests and the geometry of defocus sweeps.
//!
//! Requests are built from the session's acquisition settings when a run is invoked and
//! are not modified afterwards. [`validate`](CaptureRequest::validate) runs before any
//! hardware is touched.

use crate::core::Color;
use crate::data::naming::{FileNamer, FRAMES_PER_FILE};
use crate::error::{AppResult, ScopeError};
use chrono::NaiveDate;
use std::path::PathBuf;

/// Largest xy or z step the stage controls accept (µm).
pub const MAX_STEP_UM: f64 = 5000.0;

/// Largest defocus radius, in z steps on each side of focus.
pub const MAX_Z_RADIUS: u32 = 100;

/// Largest distance a defocus sweep may back off from focus (µm).
pub const MAX_DEFOCUS_TRAVEL_UM: f64 = 50_000.0;

/// Clamps an operator-entered defocus radius into `[0, MAX_Z_RADIUS]`.
pub fn clamp_radius(radius: u32) -> u32 {
    radius.min(MAX_Z_RADIUS)
}

/// Clamps an operator-entered step size into `[0, MAX_STEP_UM]`.
pub fn clamp_step(step_um: f64) -> f64 {
    if step_um.is_nan() {
        return 0.0;
    }
    step_um.clamp(0.0, MAX_STEP_UM)
}

/// Parameters shared by every capture run.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    /// Frames (time points) to capture
    pub num_frames: u32,
    /// Explicit averaging count, overridden by a non-zero interval
    pub num_to_average: u32,
    pub interval_secs: f64,
    pub directory: PathBuf,
    pub name_template: String,
    pub starting_counter: u32,
    /// Date substituted into the name template
    pub date: NaiveDate,
}

impl CaptureRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.num_frames == 0 {
            return Err(ScopeError::InvalidRequest(
                "number of images must be positive".into(),
            ));
        }
        if self.num_to_average == 0 {
            return Err(ScopeError::InvalidRequest(
                "number to average must be positive".into(),
            ));
        }
        if !self.interval_secs.is_finite() || self.interval_secs < 0.0 {
            return Err(ScopeError::InvalidRequest(format!(
                "interval must be a non-negative number of seconds, got {}",
                self.interval_secs
            )));
        }
        Ok(())
    }

    /// Checks that the rollover counter can number every file of the run.
    ///
    /// A run of `n` frames starting at counter `c` uses numbers up to `c + ceil(n / 10)`.
    pub fn validate_rollover(&self) -> AppResult<()> {
        let files = self.num_frames.div_ceil(FRAMES_PER_FILE);
        if self.starting_counter.checked_add(files).is_none() {
            return Err(ScopeError::InvalidRequest(format!(
                "starting counter {} leaves no room for {} files",
                self.starting_counter, files
            )));
        }
        Ok(())
    }

    pub fn namer(&self) -> FileNamer {
        FileNamer::new(&self.directory, &self.name_template, self.date)
    }
}

/// Z-stack acquisition around the current focus.
#[derive(Clone, Debug, PartialEq)]
pub struct DefocusRequest {
    pub capture: CaptureRequest,
    pub z_step_um: f64,
    /// Steps on each side of focus
    pub radius: u32,
}

impl DefocusRequest {
    pub fn validate(&self) -> AppResult<()> {
        self.capture.validate()?;
        if !self.z_step_um.is_finite() || !(0.0..=MAX_STEP_UM).contains(&self.z_step_um) {
            return Err(ScopeError::InvalidRequest(format!(
                "z step must lie in [0, {MAX_STEP_UM}] um, got {}",
                self.z_step_um
            )));
        }
        if self.radius > MAX_Z_RADIUS {
            return Err(ScopeError::InvalidRequest(format!(
                "defocus radius must be at most {MAX_Z_RADIUS}, got {}",
                self.radius
            )));
        }
        let travel = -self.plan().approach();
        if travel > MAX_DEFOCUS_TRAVEL_UM {
            return Err(ScopeError::InvalidRequest(format!(
                "defocus sweep backs off {travel} um, more than {MAX_DEFOCUS_TRAVEL_UM} um"
            )));
        }
        Ok(())
    }

    pub fn plan(&self) -> DefocusPlan {
        DefocusPlan::new(self.z_step_um, self.radius)
    }
}

/// Four-color acquisition, cycling red, yellow, green, blue.
#[derive(Clone, Debug, PartialEq)]
pub struct FourColorRequest {
    pub capture: CaptureRequest,
}

impl FourColorRequest {
    pub fn validate(&self) -> AppResult<()> {
        self.capture.validate()?;
        self.capture.validate_rollover()
    }

    /// Illumination for frame `index`.
    pub fn color_for(index: u32) -> Color {
        Color::FOUR_COLOR_CYCLE[index as usize % Color::FOUR_COLOR_CYCLE.len()]
    }
}

/// Relative z moves of one defocus time point.
///
/// The stage first backs off to one step below the sweep, then advances one step before
/// each of the `2r + 1` exposures, and finally returns to where it started.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DefocusPlan {
    pub z_step_um: f64,
    pub radius: u32,
}

impl DefocusPlan {
    pub fn new(z_step_um: f64, radius: u32) -> Self {
        Self { z_step_um, radius }
    }

    /// Number of z positions imaged per time point.
    pub fn positions(&self) -> u32 {
        self.radius.saturating_mul(2).saturating_add(1)
    }

    /// Move before the sweep: `-(r + 1)·Δz`.
    pub fn approach(&self) -> f64 {
        -(f64::from(self.radius) + 1.0) * self.z_step_um
    }

    /// Move after the sweep: `-(r + 1)·Δz + Δz`.
    pub fn retreat(&self) -> f64 {
        self.approach() + self.z_step_um
    }

    /// Full z range covered, `(2r + 1)·Δz`.
    pub fn span(&self) -> f64 {
        f64::from(self.positions()) * self.z_step_um
    }

    /// Every relative move of one time point, in order.
    pub fn moves(&self) -> Vec<f64> {
        let mut moves = Vec::with_capacity(self.positions() as usize + 2);
        moves.push(self.approach());
        moves.extend(std::iter::repeat(self.z_step_um).take(self.positions() as usize));
        moves.push(self.retreat());
        moves
    }
}
