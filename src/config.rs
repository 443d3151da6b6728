//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. `config/scope.toml` (base configuration, optional)
//! 2. Environment variables prefixed with `SCOPE_`
//!
//! Every field has a default, so the controller also starts without a file.
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! SCOPE_APPLICATION__LOG_LEVEL=debug
//! SCOPE_CAMERA__IDENTIFIER=18255191
//! SCOPE_ACQUISITION__NAME_TEMPLATE="beads_{date}"
//! ```
//!
//! # Example
//!
//! ```no_run
//! use scope_daq::config::ScopeConfig;
//!
//! let config = ScopeConfig::load()?;
//! println!("Camera: {:?}", config.camera.identifier);
//! # Ok::<(), scope_daq::error::ScopeError>(())
//! ```

use crate::acquisition::sequence::{MAX_STEP_UM, MAX_Z_RADIUS};
use crate::acquisition::EngineSettings;
use crate::core::{Bounds, DEFAULT_EXPOSURE_BOUNDS, DEFAULT_FRAME_RATE_BOUNDS};
use crate::error::{AppResult, ScopeError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/scope.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub application: ApplicationConfig,
    pub camera: CameraSettings,
    pub stage: StageSettings,
    pub illumination: IlluminationSettings,
    /// Operator defaults, adjustable at runtime
    pub acquisition: AcquisitionSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
    /// Pause at the end of each dispatch tick
    pub tick_pause_ms: u64,
}

/// Camera selection and the simulated sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Serial number or name; empty selects the first camera found
    pub identifier: String,
    pub sensor_width: u32,
    pub sensor_height: u32,
    pub bits_per_pixel: u8,
    pub video_mode: String,
    pub initial_gain_db: f64,
    /// Exposure range reported by the simulated camera (µs)
    pub exposure_bounds: Bounds,
    /// Frame-rate range reported by the simulated camera (fps)
    pub frame_rate_bounds: Bounds,
}

/// Motion stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    /// Time allowed for the controller to acknowledge a move
    pub move_timeout_ms: u64,
    /// Duration of a simulated move
    pub simulated_move_ms: u64,
    /// Position every axis is driven to after homing (µm)
    pub home_position_um: f64,
    /// Pause after the defocus approach move
    pub settle_ms: u64,
}

/// LED controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IlluminationSettings {
    /// Drive a serial LED controller instead of the simulated one
    pub enabled: bool,
    /// Serial port (e.g., "/dev/ttyACM0", "COM5")
    pub port: String,
    pub baud_rate: u32,
}

/// Operator-adjustable acquisition parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub xy_step_um: f64,
    pub z_step_um: f64,
    /// Defocus radius in z steps
    pub z_radius: u32,
    pub num_images: u32,
    pub num_to_average: u32,
    /// Seconds sampled per frame; non-zero overrides `num_to_average`
    pub interval_secs: f64,
    pub directory: PathBuf,
    pub name_template: String,
    pub starting_counter: u32,
}

// ============================================================================
// Default values
// ============================================================================

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "scope_daq".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            tick_pause_ms: 1,
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            sensor_width: 640,
            sensor_height: 480,
            bits_per_pixel: 12,
            video_mode: "7".to_string(),
            initial_gain_db: 0.0,
            exposure_bounds: DEFAULT_EXPOSURE_BOUNDS,
            frame_rate_bounds: DEFAULT_FRAME_RATE_BOUNDS,
        }
    }
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            move_timeout_ms: 30_000,
            simulated_move_ms: 20,
            home_position_um: 5.0,
            settle_ms: 5_000,
        }
    }
}

impl Default for IlluminationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: "COM5".to_string(),
            baud_rate: 9600,
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            xy_step_um: 1.0,
            z_step_um: 1.0,
            z_radius: 1,
            num_images: 1,
            num_to_average: 10,
            interval_secs: 0.0,
            directory: PathBuf::new(),
            name_template: "test_{date}".to_string(),
            starting_counter: 1,
        }
    }
}

// ============================================================================
// Loading and validation
// ============================================================================

impl ScopeConfig {
    /// Load configuration from `config/scope.toml` and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// Precedence (highest first): `SCOPE_` environment variables, the file, built-in
    /// defaults. The result is validated.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ScopeConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SCOPE_").split("__"))
    }

    /// Checks:
    /// - log level and format are known
    /// - sensor geometry and bit depth are usable
    /// - bounds are not inverted
    /// - step sizes lie in `[0, 5000]` µm
    /// - the defocus radius is at most 100 steps
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ScopeError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(ScopeError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let camera = &self.camera;
        if camera.sensor_width == 0 || camera.sensor_height == 0 {
            return Err(ScopeError::Configuration(format!(
                "Sensor geometry must be non-zero, got {}x{}",
                camera.sensor_width, camera.sensor_height
            )));
        }
        if !(1..=16).contains(&camera.bits_per_pixel) {
            return Err(ScopeError::Configuration(format!(
                "bits_per_pixel must be 1-16, got {}",
                camera.bits_per_pixel
            )));
        }
        for (name, bounds) in [
            ("exposure_bounds", camera.exposure_bounds),
            ("frame_rate_bounds", camera.frame_rate_bounds),
        ] {
            if !(bounds.min.is_finite() && bounds.max.is_finite()) || bounds.min > bounds.max {
                return Err(ScopeError::Configuration(format!(
                    "Invalid camera {}: [{}, {}]",
                    name, bounds.min, bounds.max
                )));
            }
        }

        let acquisition = &self.acquisition;
        let step_range = Bounds::new(0.0, MAX_STEP_UM);
        for (name, step) in [
            ("xy_step_um", acquisition.xy_step_um),
            ("z_step_um", acquisition.z_step_um),
        ] {
            if !step_range.contains(step) {
                return Err(ScopeError::Configuration(format!(
                    "{} must lie in [0, {}], got {}",
                    name, MAX_STEP_UM, step
                )));
            }
        }
        if acquisition.z_radius > MAX_Z_RADIUS {
            return Err(ScopeError::Configuration(format!(
                "z_radius must be at most {}, got {}",
                MAX_Z_RADIUS, acquisition.z_radius
            )));
        }
        if !acquisition.interval_secs.is_finite() || acquisition.interval_secs < 0.0 {
            return Err(ScopeError::Configuration(format!(
                "interval_secs must be non-negative, got {}",
                acquisition.interval_secs
            )));
        }

        Ok(())
    }

    pub fn tick_pause(&self) -> Duration {
        Duration::from_millis(self.application.tick_pause_ms)
    }

    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.stage.move_timeout_ms)
    }

    /// Engine parameters derived from the camera and stage sections.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            initial_gain_db: self.camera.initial_gain_db,
            video_mode: self.camera.video_mode.clone(),
            home_position_um: self.stage.home_position_um,
            settle: Duration::from_millis(self.stage.settle_ms),
        }
    }
}
