//! Acquisition engine.
//!
//! Owns the camera, stage, LED controller and image sink, and is the only component
//! that calls into them. The engine tracks one of three states:
//!
//! ```text
//!            start_stream                 run_*
//!   Idle  ----------------->  Streaming  -------->  Capturing
//!         <-----------------             <--------
//!            stop_stream                 done / failed
//! ```
//!
//! A capture run requires the camera to be in continuous acquisition, so runs are only
//! admitted while streaming. When a run finishes, successfully or not, the engine goes
//! back to the state it was in before the run. A failed step aborts the rest of the run;
//! nothing is retried.
//!
//! ```
//! use scope_daq::acquisition::{AcquisitionEngine, EngineSettings, EngineState};
//! use scope_daq::data::RecordingSink;
//! use scope_daq::hardware::mock::{MockCamera, MockIllumination, MockStage};
//!
//! # tokio_test::block_on(async {
//! let mut engine = AcquisitionEngine::new(
//!     Box::new(MockCamera::new(64, 48, 12)),
//!     Box::new(MockStage::new()),
//!     Box::new(MockIllumination::new()),
//!     Box::new(RecordingSink::new()),
//!     EngineSettings::default(),
//! );
//! engine.connect_camera("").await?;
//! engine.start_stream().await?;
//! assert_eq!(engine.state(), EngineState::Streaming);
//! let averaged = engine.acquire_averaged(4).await?;
//! assert_eq!(averaged.dimensions(), (64, 48));
//! # Ok::<(), scope_daq::error::ScopeError>(())
//! # }).unwrap();
//! ```

pub mod averaging;
pub mod sequence;

use crate::core::{
    AcquisitionMode, Axis, BufferPolicy, CameraConfig, CaptureOutcome, Color, Frame,
    StagePosition,
};
use crate::data::naming::RolloverCounter;
use crate::data::ImageSink;
use crate::error::{AppResult, ScopeError};
use crate::hardware::{Camera, Illumination, Stage};
use averaging::{frames_to_average, FrameAccumulator};
use sequence::{CaptureRequest, DefocusRequest, FourColorRequest};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Externally visible engine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Streaming,
    Capturing,
}

/// Jog buttons of the stage panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JogDirection {
    Up,
    Down,
    Left,
    Right,
    ZUp,
    ZDown,
}

impl JogDirection {
    /// Axis and signed distance for one press.
    ///
    /// Up/down drive the x axis and left/right the y axis, matching how the camera image
    /// is oriented on the rig. Z-up moves the objective towards the sample.
    pub fn displacement(self, xy_step_um: f64, z_step_um: f64) -> (Axis, f64) {
        match self {
            JogDirection::Up => (Axis::X, -xy_step_um),
            JogDirection::Down => (Axis::X, xy_step_um),
            JogDirection::Left => (Axis::Y, -xy_step_um),
            JogDirection::Right => (Axis::Y, xy_step_um),
            JogDirection::ZUp => (Axis::Z, -z_step_um),
            JogDirection::ZDown => (Axis::Z, z_step_um),
        }
    }
}

/// Fixed engine parameters, taken from configuration at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub initial_gain_db: f64,
    pub video_mode: String,
    /// Absolute position every axis is driven to after homing (µm)
    pub home_position_um: f64,
    /// Pause after the defocus approach move
    pub settle: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            initial_gain_db: 0.0,
            video_mode: "7".to_string(),
            home_position_um: 5.0,
            settle: Duration::from_secs(5),
        }
    }
}

/// What a finished run produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub frames_saved: u32,
    /// Files written, in first-write order
    pub paths: Vec<PathBuf>,
    /// First file number not used by this run, for runs that use a rollover counter
    pub next_counter: Option<u32>,
}

impl RunSummary {
    fn record(&mut self, path: PathBuf) {
        self.frames_saved += 1;
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }
}

/// Drives the rig hardware.
pub struct AcquisitionEngine {
    camera: Box<dyn Camera>,
    stage: Box<dyn Stage>,
    illumination: Box<dyn Illumination>,
    sink: Box<dyn ImageSink>,
    config: CameraConfig,
    settings: EngineSettings,
    state: EngineState,
}

impl AcquisitionEngine {
    pub fn new(
        camera: Box<dyn Camera>,
        stage: Box<dyn Stage>,
        illumination: Box<dyn Illumination>,
        sink: Box<dyn ImageSink>,
        settings: EngineSettings,
    ) -> Self {
        let mut config = CameraConfig::default();
        config.set_video_mode(settings.video_mode.clone());
        Self {
            camera,
            stage,
            illumination,
            sink,
            config,
            settings,
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == EngineState::Streaming
    }

    pub fn camera_config(&self) -> &CameraConfig {
        &self.config
    }

    // =========================================================================
    // Device setup
    // =========================================================================

    /// Opens the camera and puts it under manual control, then connects the LEDs.
    #[instrument(skip(self))]
    pub async fn connect_camera(&mut self, identifier: &str) -> AppResult<()> {
        self.camera.connect(identifier).await?;
        self.camera.initialize().await?;

        let exposure = self.camera.exposure_bounds().await?;
        let frame_rate = self.camera.frame_rate_bounds().await?;
        self.config.apply_hardware_bounds(exposure, frame_rate);
        info!(
            exposure_min = exposure.min,
            exposure_max = exposure.max,
            fps_min = frame_rate.min,
            fps_max = frame_rate.max,
            "camera bounds"
        );

        self.camera.disable_auto_exposure().await?;
        self.camera.disable_auto_gain().await?;
        self.camera.disable_auto_frame_rate().await?;

        let gain = self.config.set_gain(self.settings.initial_gain_db);
        self.camera.set_gain(gain).await?;
        self.camera.set_video_mode(self.config.video_mode()).await?;

        self.illumination.connect().await?;
        info!(gain_db = gain, video_mode = self.config.video_mode(), "camera ready");
        Ok(())
    }

    /// Homes every axis, then drives them to the home position.
    pub async fn initialize_stage(&mut self) -> AppResult<()> {
        for axis in Axis::ALL {
            self.stage.home(axis).await?;
        }
        for axis in Axis::ALL {
            self.stage
                .move_absolute(axis, self.settings.home_position_um)
                .await?;
        }
        info!(home_um = self.settings.home_position_um, "stage initialized");
        Ok(())
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    /// Enters continuous acquisition. A no-op while already streaming.
    pub async fn start_stream(&mut self) -> AppResult<()> {
        match self.state {
            EngineState::Streaming => {
                debug!("stream already running");
                return Ok(());
            }
            EngineState::Capturing => return Err(ScopeError::CaptureInProgress),
            EngineState::Idle => {}
        }
        if !self.camera.is_connected() {
            return Err(ScopeError::NotConnected("camera"));
        }

        self.camera.set_buffer_policy(BufferPolicy::NewestOnly).await?;
        self.camera
            .set_acquisition_mode(AcquisitionMode::Continuous)
            .await?;
        self.camera.start_acquisition().await?;
        self.state = EngineState::Streaming;
        info!("stream started");
        Ok(())
    }

    /// Leaves continuous acquisition. A no-op while idle.
    pub async fn stop_stream(&mut self) -> AppResult<()> {
        match self.state {
            EngineState::Idle => return Ok(()),
            EngineState::Capturing => return Err(ScopeError::CaptureInProgress),
            EngineState::Streaming => {}
        }
        // Idle first, so a failing end_acquisition still leaves the loop tolerant of errors.
        self.state = EngineState::Idle;
        self.camera.end_acquisition().await?;
        info!("stream stopped");
        Ok(())
    }

    /// Pulls one frame for display.
    ///
    /// Returns `None` when the camera delivered an incomplete buffer.
    pub async fn pull_stream_frame(&mut self) -> AppResult<Option<Frame>> {
        if self.state != EngineState::Streaming {
            return Err(ScopeError::StreamNotActive);
        }
        self.next_complete_frame().await
    }

    async fn next_complete_frame(&mut self) -> AppResult<Option<Frame>> {
        match self.camera.capture_frame().await? {
            CaptureOutcome::Complete(frame)
                if frame.is_complete() && frame.dimensions() == self.camera.sensor_size() =>
            {
                Ok(Some(frame))
            }
            CaptureOutcome::Complete(frame) => {
                debug!(
                    expected = frame.expected_len(),
                    actual = frame.pixels.len(),
                    "dropping frame that does not match the sensor"
                );
                Ok(None)
            }
            CaptureOutcome::Incomplete => {
                debug!("dropping incomplete frame");
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Camera settings
    // =========================================================================

    /// Clamps and applies the exposure, returning the value sent to the camera.
    pub async fn set_exposure(&mut self, exposure_us: f64) -> AppResult<f64> {
        let applied = self.config.set_exposure(exposure_us);
        self.camera.set_exposure(applied).await?;
        debug!(requested = exposure_us, applied, "exposure set");
        Ok(applied)
    }

    pub async fn set_gain(&mut self, gain_db: f64) -> AppResult<f64> {
        let applied = self.config.set_gain(gain_db);
        self.camera.set_gain(applied).await?;
        debug!(requested = gain_db, applied, "gain set");
        Ok(applied)
    }

    /// Clamps and applies the frame rate, then reads back what the camera settled on.
    pub async fn set_frame_rate(&mut self, frame_rate_fps: f64) -> AppResult<f64> {
        let applied = self.config.set_frame_rate(frame_rate_fps);
        self.camera.set_frame_rate(applied).await?;
        let effective = self.camera.frame_rate().await?;
        self.config.record_frame_rate(effective);
        info!(requested = frame_rate_fps, applied, effective, "frame rate set");
        Ok(effective)
    }

    // =========================================================================
    // Stage and illumination
    // =========================================================================

    pub async fn move_relative(&mut self, axis: Axis, delta_um: f64) -> AppResult<()> {
        debug!(axis = %axis, delta_um, "relative move");
        self.stage.move_relative(axis, delta_um).await
    }

    pub async fn jog(
        &mut self,
        direction: JogDirection,
        xy_step_um: f64,
        z_step_um: f64,
    ) -> AppResult<()> {
        let (axis, delta) = direction.displacement(xy_step_um, z_step_um);
        self.move_relative(axis, delta).await
    }

    /// Reads the position back from the stage controller.
    pub async fn current_position(&mut self) -> AppResult<StagePosition> {
        let mut position = StagePosition::default();
        for axis in Axis::ALL {
            position.set(axis, self.stage.position(axis).await?);
        }
        Ok(position)
    }

    pub async fn set_color(&mut self, color: Color) -> AppResult<()> {
        debug!(color = %color, "illumination");
        self.illumination
            .send_color_command(color.command_byte())
            .await
    }

    // =========================================================================
    // Capture runs
    // =========================================================================

    /// Pulls frames until `count` complete ones have been averaged.
    ///
    /// Incomplete frames are skipped and do not count.
    pub async fn acquire_averaged(&mut self, count: u32) -> AppResult<Frame> {
        let (width, height) = self.camera.sensor_size();
        let target = count.max(1);
        let mut accumulator: Option<FrameAccumulator> = None;
        let mut skipped = 0u32;

        while accumulator.as_ref().map_or(0, FrameAccumulator::count) < target {
            let Some(frame) = self.next_complete_frame().await? else {
                skipped += 1;
                continue;
            };
            let acc = accumulator
                .get_or_insert_with(|| FrameAccumulator::new(width, height, frame.bits_per_pixel));
            if let Err(e) = acc.add(&frame) {
                debug!(error = %e, "skipping frame");
                skipped += 1;
            }
        }

        if skipped > 0 {
            debug!(skipped, averaged = target, "incomplete frames skipped while averaging");
        }
        accumulator
            .and_then(FrameAccumulator::finish)
            .ok_or(ScopeError::IncompleteFrame {
                expected: width as usize * height as usize,
                actual: 0,
            })
    }

    /// Appends `num_frames` averaged frames to `<base>_<N>.tiff`, rolling `N` over
    /// every ten frames.
    #[instrument(skip_all, fields(frames = request.num_frames))]
    pub async fn run_single_shot(&mut self, request: &CaptureRequest) -> AppResult<RunSummary> {
        request.validate()?;
        request.validate_rollover()?;
        let previous = self.begin_capture()?;
        let result = self.single_shot_steps(request).await;
        self.end_capture(previous, &result);
        result
    }

    async fn single_shot_steps(&mut self, request: &CaptureRequest) -> AppResult<RunSummary> {
        let namer = request.namer();
        let average = self.average_count(request).await?;
        let mut counter = RolloverCounter::new(request.starting_counter);
        let mut summary = RunSummary::default();

        for _ in 0..request.num_frames {
            let frame = self.acquire_averaged(average).await?;
            let path = namer.single_shot(counter.current());
            self.sink.append(&path, &frame)?;
            debug!(path = %path.display(), "frame saved");
            summary.record(path);
            counter.record_frame();
        }
        summary.next_counter = Some(counter.next_unused());
        Ok(summary)
    }

    /// Z-stack around the current focus, repeated for every time point.
    #[instrument(skip_all, fields(
        time_points = request.capture.num_frames,
        z_step_um = request.z_step_um,
        radius = request.radius,
    ))]
    pub async fn run_defocus(&mut self, request: &DefocusRequest) -> AppResult<RunSummary> {
        request.validate()?;
        let previous = self.begin_capture()?;
        let result = self.defocus_steps(request).await;
        self.end_capture(previous, &result);
        result
    }

    async fn defocus_steps(&mut self, request: &DefocusRequest) -> AppResult<RunSummary> {
        let namer = request.capture.namer();
        let plan = request.plan();
        let average = self.average_count(&request.capture).await?;
        let mut summary = RunSummary::default();
        info!(span_um = plan.span(), positions = plan.positions(), "defocus run started");

        for time_index in 0..request.capture.num_frames {
            self.move_relative(Axis::Z, plan.approach()).await?;
            if !self.settings.settle.is_zero() {
                tokio::time::sleep(self.settings.settle).await;
            }

            for z_index in 1..=plan.positions() {
                self.move_relative(Axis::Z, plan.z_step_um).await?;
                let frame = self.acquire_averaged(average).await?;
                let path = namer.defocus(time_index, z_index);
                self.sink.write(&path, &frame)?;
                debug!(time_index, z_index, path = %path.display(), "defocus step saved");
                summary.record(path);
            }

            self.move_relative(Axis::Z, plan.retreat()).await?;
            info!(time_index, "defocus time point finished");
        }
        Ok(summary)
    }

    /// Cycles red, yellow, green, blue, appending each frame to `<base>_<stem>_<N>.tiff`.
    ///
    /// One counter is shared across colors, so `N` advances after ten frames in total.
    #[instrument(skip_all, fields(frames = request.capture.num_frames))]
    pub async fn run_four_color(&mut self, request: &FourColorRequest) -> AppResult<RunSummary> {
        request.validate()?;
        let previous = self.begin_capture()?;
        let result = self.four_color_steps(request).await;
        self.end_capture(previous, &result);
        result
    }

    async fn four_color_steps(&mut self, request: &FourColorRequest) -> AppResult<RunSummary> {
        let namer = request.capture.namer();
        let average = self.average_count(&request.capture).await?;
        let mut counter = RolloverCounter::new(request.capture.starting_counter);
        let mut summary = RunSummary::default();

        for index in 0..request.capture.num_frames {
            let color = FourColorRequest::color_for(index);
            self.set_color(color).await?;
            let frame = self.acquire_averaged(average).await?;
            let path = namer.four_color(color, counter.current());
            self.sink.append(&path, &frame)?;
            debug!(color = %color, path = %path.display(), "four-color frame saved");
            summary.record(path);
            counter.record_frame();
        }
        summary.next_counter = Some(counter.next_unused());
        Ok(summary)
    }

    async fn average_count(&mut self, request: &CaptureRequest) -> AppResult<u32> {
        let frame_rate = if request.interval_secs > 0.0 {
            self.camera.frame_rate().await?
        } else {
            self.config.frame_rate_fps()
        };
        let count = frames_to_average(request.num_to_average, request.interval_secs, frame_rate);
        debug!(count, frame_rate, interval_secs = request.interval_secs, "frames per step");
        Ok(count)
    }

    fn begin_capture(&mut self) -> AppResult<EngineState> {
        match self.state {
            EngineState::Capturing => Err(ScopeError::CaptureInProgress),
            EngineState::Idle => Err(ScopeError::StreamNotActive),
            EngineState::Streaming => {
                self.state = EngineState::Capturing;
                Ok(EngineState::Streaming)
            }
        }
    }

    fn end_capture(&mut self, previous: EngineState, result: &AppResult<RunSummary>) {
        self.state = previous;
        match result {
            Ok(summary) => info!(
                frames = summary.frames_saved,
                files = summary.paths.len(),
                "capture run finished"
            ),
            Err(e) => warn!(error = %e, "capture run aborted"),
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Ends acquisition if it is running and forces the engine back to idle.
    pub async fn shutdown(&mut self) {
        if self.state != EngineState::Idle {
            if let Err(e) = self.camera.end_acquisition().await {
                warn!(error = %e, "failed to end acquisition during shutdown");
            }
        }
        self.state = EngineState::Idle;
        debug!("engine shut down");
    }
}
