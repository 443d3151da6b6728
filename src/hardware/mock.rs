//! Mock Hardware Implementations
//!
//! Provides simulated rig devices for testing and for running the controller without
//! vendor SDKs. All mock devices use async-safe waits (`tokio::time::sleep`, not
//! `std::thread::sleep`).
//!
//! # Available Mocks
//!
//! - `MockCamera` - Simulated sensor with continuous acquisition and scripted frames
//! - `MockStage` - Simulated three-axis stage with acknowledgement timeouts
//! - `MockIllumination` - Records LED command bytes
//!
//! Every mock is a cheap `Clone` handle over shared state, so a test can hand one clone
//! to the engine and keep another to inspect what the engine did.

use crate::core::{AcquisitionMode, Axis, Bounds, BufferPolicy, CaptureOutcome, Frame, StagePosition};
use crate::error::{AppResult, ScopeError};
use crate::hardware::motion::{await_acknowledgement, DEFAULT_MOVE_TIMEOUT};
use crate::hardware::{Camera, Illumination, Stage};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// MockCamera - Simulated Camera
// =============================================================================

/// Adapter call recorded by [`MockCamera`].
#[derive(Clone, Debug, PartialEq)]
pub enum CameraCall {
    Connect(String),
    Initialize,
    DisableAutoExposure,
    DisableAutoGain,
    DisableAutoFrameRate,
    SetVideoMode(String),
    SetBufferPolicy(BufferPolicy),
    SetAcquisitionMode(AcquisitionMode),
    StartAcquisition,
    EndAcquisition,
    CaptureFrame,
    SetExposure(f64),
    SetGain(f64),
    SetFrameRate(f64),
}

struct CameraState {
    devices: Vec<String>,
    connected: Option<String>,
    width: u32,
    height: u32,
    bits_per_pixel: u8,
    exposure_bounds: Bounds,
    frame_rate_bounds: Bounds,
    frame_rate: f64,
    acquiring: bool,
    script: VecDeque<CaptureOutcome>,
    fault_after: Option<usize>,
    frames_delivered: u64,
    calls: Vec<CameraCall>,
}

/// Simulated camera.
///
/// Frames are synthesized as a noisy gradient unless outcomes have been scripted with
/// [`MockCamera::push_outcome`], in which case they are delivered first, in order.
#[derive(Clone)]
pub struct MockCamera {
    state: Arc<Mutex<CameraState>>,
}

impl MockCamera {
    /// Create a camera that enumerates a single device with the given sensor geometry.
    pub fn new(width: u32, height: u32, bits_per_pixel: u8) -> Self {
        Self::with_devices(vec!["sim-0".to_string()], width, height, bits_per_pixel)
    }

    /// Create a camera that enumerates the listed device identifiers.
    pub fn with_devices(devices: Vec<String>, width: u32, height: u32, bits_per_pixel: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(CameraState {
                devices,
                connected: None,
                width,
                height,
                bits_per_pixel,
                exposure_bounds: Bounds::new(6.0, 30_000_000.0),
                frame_rate_bounds: Bounds::new(1.0, 60.0),
                frame_rate: 30.0,
                acquiring: false,
                script: VecDeque::new(),
                fault_after: None,
                frames_delivered: 0,
                calls: Vec::new(),
            })),
        }
    }

    /// Override the bounds the device reports after connect.
    pub fn with_bounds(self, exposure: Bounds, frame_rate: Bounds) -> Self {
        {
            let mut state = lock(&self.state);
            state.exposure_bounds = exposure;
            state.frame_rate_bounds = frame_rate;
            state.frame_rate = frame_rate.clamp(state.frame_rate);
        }
        self
    }

    /// Queue an outcome to be returned by a future `capture_frame`.
    pub fn push_outcome(&self, outcome: CaptureOutcome) {
        lock(&self.state).script.push_back(outcome);
    }

    /// Queue `count` incomplete reads.
    pub fn push_incomplete(&self, count: usize) {
        let mut state = lock(&self.state);
        for _ in 0..count {
            state.script.push_back(CaptureOutcome::Incomplete);
        }
    }

    /// Make capture number `n + 1` (counting from now) fail with a driver error.
    pub fn fail_after(&self, n: usize) {
        lock(&self.state).fault_after = Some(n);
    }

    /// Snapshot of every adapter call made so far.
    pub fn calls(&self) -> Vec<CameraCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of recorded calls matching `call`.
    pub fn count(&self, call: &CameraCall) -> usize {
        lock(&self.state).calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn is_acquiring(&self) -> bool {
        lock(&self.state).acquiring
    }

    pub fn frames_delivered(&self) -> u64 {
        lock(&self.state).frames_delivered
    }

    fn record(&self, call: CameraCall) {
        lock(&self.state).calls.push(call);
    }

    fn require_connected(&self) -> AppResult<()> {
        if lock(&self.state).connected.is_some() {
            Ok(())
        } else {
            Err(ScopeError::NotConnected("camera"))
        }
    }

    fn synthesize(state: &CameraState) -> Frame {
        let max = (1u32 << u32::from(state.bits_per_pixel.clamp(1, 16))) - 1;
        let span = (state.width + state.height).max(1);
        let mut rng = rand::thread_rng();
        let pixels = (0..state.height)
            .flat_map(|y| (0..state.width).map(move |x| (x, y)))
            .map(|(x, y)| {
                let base = (x + y) * max / span;
                let noise: i64 = rng.gen_range(-4..=4);
                (i64::from(base) + noise).clamp(0, i64::from(max)) as u16
            })
            .collect();
        Frame::new(state.width, state.height, pixels, state.bits_per_pixel)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new(640, 480, 12)
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn connect(&mut self, identifier: &str) -> AppResult<()> {
        self.record(CameraCall::Connect(identifier.to_string()));
        let mut state = lock(&self.state);

        let wanted = if identifier.is_empty() {
            state.devices.first().cloned()
        } else {
            state.devices.iter().find(|d| d.as_str() == identifier).cloned()
        };
        let device = wanted.ok_or_else(|| ScopeError::DeviceNotFound(identifier.to_string()))?;

        if state.connected.as_deref() == Some(device.as_str()) {
            debug!(device = %device, "MockCamera: already connected");
            return Ok(());
        }
        info!(device = %device, "MockCamera: connected");
        state.connected = Some(device);
        Ok(())
    }

    async fn initialize(&mut self) -> AppResult<()> {
        self.require_connected()?;
        self.record(CameraCall::Initialize);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected.is_some()
    }

    fn sensor_size(&self) -> (u32, u32) {
        let state = lock(&self.state);
        (state.width, state.height)
    }

    async fn exposure_bounds(&mut self) -> AppResult<Bounds> {
        self.require_connected()?;
        Ok(lock(&self.state).exposure_bounds)
    }

    async fn frame_rate_bounds(&mut self) -> AppResult<Bounds> {
        self.require_connected()?;
        Ok(lock(&self.state).frame_rate_bounds)
    }

    async fn disable_auto_exposure(&mut self) -> AppResult<()> {
        self.record(CameraCall::DisableAutoExposure);
        Ok(())
    }

    async fn disable_auto_gain(&mut self) -> AppResult<()> {
        self.record(CameraCall::DisableAutoGain);
        Ok(())
    }

    async fn disable_auto_frame_rate(&mut self) -> AppResult<()> {
        self.record(CameraCall::DisableAutoFrameRate);
        Ok(())
    }

    async fn set_video_mode(&mut self, mode: &str) -> AppResult<()> {
        self.record(CameraCall::SetVideoMode(mode.to_string()));
        Ok(())
    }

    async fn set_buffer_policy(&mut self, policy: BufferPolicy) -> AppResult<()> {
        self.record(CameraCall::SetBufferPolicy(policy));
        Ok(())
    }

    async fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> AppResult<()> {
        self.record(CameraCall::SetAcquisitionMode(mode));
        Ok(())
    }

    async fn start_acquisition(&mut self) -> AppResult<()> {
        self.require_connected()?;
        self.record(CameraCall::StartAcquisition);
        lock(&self.state).acquiring = true;
        info!("MockCamera: acquisition started");
        Ok(())
    }

    async fn end_acquisition(&mut self) -> AppResult<()> {
        self.record(CameraCall::EndAcquisition);
        lock(&self.state).acquiring = false;
        info!("MockCamera: acquisition ended");
        Ok(())
    }

    async fn capture_frame(&mut self) -> AppResult<CaptureOutcome> {
        self.record(CameraCall::CaptureFrame);
        let mut state = lock(&self.state);
        if !state.acquiring {
            return Err(ScopeError::StreamNotActive);
        }

        if let Some(remaining) = state.fault_after {
            if remaining == 0 {
                state.fault_after = None;
                return Err(ScopeError::Instrument("MockCamera: sensor readout failed".into()));
            }
            state.fault_after = Some(remaining - 1);
        }

        let outcome = match state.script.pop_front() {
            Some(outcome) => outcome,
            None => CaptureOutcome::Complete(Self::synthesize(&state)),
        };
        if matches!(outcome, CaptureOutcome::Complete(_)) {
            state.frames_delivered += 1;
        }
        Ok(outcome)
    }

    async fn set_exposure(&mut self, exposure_us: f64) -> AppResult<()> {
        self.record(CameraCall::SetExposure(exposure_us));
        Ok(())
    }

    async fn set_gain(&mut self, gain_db: f64) -> AppResult<()> {
        self.record(CameraCall::SetGain(gain_db));
        Ok(())
    }

    async fn set_frame_rate(&mut self, frame_rate_fps: f64) -> AppResult<()> {
        self.record(CameraCall::SetFrameRate(frame_rate_fps));
        let mut state = lock(&self.state);
        state.frame_rate = state.frame_rate_bounds.clamp(frame_rate_fps);
        Ok(())
    }

    async fn frame_rate(&mut self) -> AppResult<f64> {
        Ok(lock(&self.state).frame_rate)
    }
}

// =============================================================================
// MockStage - Simulated Motion Stage
// =============================================================================

/// Motion request recorded by [`MockStage`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StageMove {
    Home(Axis),
    Relative(Axis, f64),
    Absolute(Axis, f64),
}

struct StageState {
    position: StagePosition,
    moves: Vec<StageMove>,
    stalled: HashSet<Axis>,
    stall_after: Option<usize>,
}

/// Simulated three-axis stage.
///
/// Every move takes `move_delay` to be acknowledged and is bounded by `move_timeout`.
/// A stalled axis never acknowledges, which surfaces as `MotionTimeout`.
#[derive(Clone)]
pub struct MockStage {
    state: Arc<Mutex<StageState>>,
    move_delay: Duration,
    move_timeout: Duration,
}

impl MockStage {
    /// Create a stage at the origin with instant moves.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StageState {
                position: StagePosition::default(),
                moves: Vec::new(),
                stalled: HashSet::new(),
                stall_after: None,
            })),
            move_delay: Duration::ZERO,
            move_timeout: DEFAULT_MOVE_TIMEOUT,
        }
    }

    /// Set how long each move takes and how long the controller waits for it.
    pub fn with_timing(mut self, move_delay: Duration, move_timeout: Duration) -> Self {
        self.move_delay = move_delay;
        self.move_timeout = move_timeout;
        self
    }

    /// Make `axis` stop acknowledging moves.
    pub fn stall(&self, axis: Axis) {
        lock(&self.state).stalled.insert(axis);
    }

    /// Acknowledge `n` more moves, then stall every axis.
    pub fn stall_after(&self, n: usize) {
        lock(&self.state).stall_after = Some(n);
    }

    /// Every motion request received, including ones that timed out.
    pub fn moves(&self) -> Vec<StageMove> {
        lock(&self.state).moves.clone()
    }

    /// Sum of the relative moves issued on `axis`.
    pub fn net_relative(&self, axis: Axis) -> f64 {
        lock(&self.state)
            .moves
            .iter()
            .filter_map(|m| match m {
                StageMove::Relative(a, delta) if *a == axis => Some(*delta),
                _ => None,
            })
            .sum()
    }

    pub fn snapshot(&self) -> StagePosition {
        lock(&self.state).position
    }

    fn will_acknowledge(&self, axis: Axis) -> bool {
        let mut state = lock(&self.state);
        if let Some(remaining) = state.stall_after {
            if remaining == 0 {
                return false;
            }
            state.stall_after = Some(remaining - 1);
        }
        !state.stalled.contains(&axis)
    }

    async fn perform(&self, request: StageMove, axis: Axis, target: impl FnOnce(f64) -> f64) -> AppResult<()> {
        lock(&self.state).moves.push(request);
        let acknowledges = self.will_acknowledge(axis);
        let delay = self.move_delay;

        await_acknowledgement(axis, self.move_timeout, async move {
            if acknowledges {
                tokio::time::sleep(delay).await;
            } else {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
        .await?;

        let mut state = lock(&self.state);
        let current = state.position.get(axis);
        let next = target(current);
        state.position.set(axis, next);
        debug!(axis = %axis, from = current, to = next, "MockStage: move acknowledged");
        Ok(())
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for MockStage {
    async fn home(&mut self, axis: Axis) -> AppResult<()> {
        self.perform(StageMove::Home(axis), axis, |_| 0.0).await
    }

    async fn move_relative(&mut self, axis: Axis, delta_um: f64) -> AppResult<()> {
        self.perform(StageMove::Relative(axis, delta_um), axis, |p| p + delta_um)
            .await
    }

    async fn move_absolute(&mut self, axis: Axis, position_um: f64) -> AppResult<()> {
        self.perform(StageMove::Absolute(axis, position_um), axis, |_| position_um)
            .await
    }

    async fn position(&mut self, axis: Axis) -> AppResult<f64> {
        Ok(lock(&self.state).position.get(axis))
    }
}

// =============================================================================
// MockIllumination - Simulated LED controller
// =============================================================================

/// Simulated LED controller that records every command byte.
#[derive(Clone, Default)]
pub struct MockIllumination {
    commands: Arc<Mutex<Vec<u8>>>,
    connected: Arc<Mutex<bool>>,
}

impl MockIllumination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command bytes sent so far, in order.
    pub fn commands(&self) -> Vec<u8> {
        lock(&self.commands).clone()
    }

    pub fn is_connected(&self) -> bool {
        *lock(&self.connected)
    }
}

#[async_trait]
impl Illumination for MockIllumination {
    async fn connect(&mut self) -> AppResult<()> {
        *lock(&self.connected) = true;
        Ok(())
    }

    async fn send_color_command(&mut self, command: u8) -> AppResult<()> {
        debug!(command = %char::from(command), "MockIllumination: color command");
        lock(&self.commands).push(command);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_camera_connect_unknown_device() {
        let mut camera = MockCamera::with_devices(vec!["A".into()], 4, 4, 8);
        let result = camera.connect("B").await;
        assert!(matches!(result, Err(ScopeError::DeviceNotFound(id)) if id == "B"));
        assert!(!camera.is_connected());
    }

    #[tokio::test]
    async fn test_mock_camera_connect_is_idempotent() {
        let mut camera = MockCamera::with_devices(vec!["A".into()], 4, 4, 8);
        camera.connect("A").await.unwrap();
        camera.connect("A").await.unwrap();
        assert!(camera.is_connected());
    }

    #[tokio::test]
    async fn test_mock_camera_capture_requires_acquisition() {
        let mut camera = MockCamera::new(4, 4, 8);
        camera.connect("").await.unwrap();
        assert!(matches!(
            camera.capture_frame().await,
            Err(ScopeError::StreamNotActive)
        ));

        camera.start_acquisition().await.unwrap();
        match camera.capture_frame().await.unwrap() {
            CaptureOutcome::Complete(frame) => {
                assert!(frame.is_complete());
                assert!(frame.pixels.iter().all(|&p| u32::from(p) <= frame.max_value()));
            }
            CaptureOutcome::Incomplete => panic!("unexpected incomplete frame"),
        }
    }

    #[tokio::test]
    async fn test_mock_camera_scripted_outcomes_come_first() {
        let mut camera = MockCamera::new(2, 1, 8);
        camera.connect("").await.unwrap();
        camera.start_acquisition().await.unwrap();
        camera.push_incomplete(1);
        camera.push_outcome(CaptureOutcome::Complete(Frame::new(2, 1, vec![9, 9], 8)));

        assert_eq!(camera.capture_frame().await.unwrap(), CaptureOutcome::Incomplete);
        assert_eq!(
            camera.capture_frame().await.unwrap(),
            CaptureOutcome::Complete(Frame::new(2, 1, vec![9, 9], 8))
        );
        assert_eq!(camera.frames_delivered(), 1);
    }

    #[tokio::test]
    async fn test_mock_stage_relative_and_absolute_moves() {
        let mut stage = MockStage::new();
        stage.move_relative(Axis::Z, 5.0).await.unwrap();
        stage.move_relative(Axis::Z, -2.0).await.unwrap();
        assert_eq!(stage.position(Axis::Z).await.unwrap(), 3.0);

        stage.move_absolute(Axis::X, 12.0).await.unwrap();
        assert_eq!(stage.snapshot().x, 12.0);
        assert_eq!(stage.net_relative(Axis::Z), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_stage_stalled_axis_times_out_and_keeps_position() {
        let mut stage = MockStage::new().with_timing(Duration::ZERO, Duration::from_millis(20));
        stage.move_relative(Axis::Y, 4.0).await.unwrap();
        stage.stall(Axis::Y);

        let result = stage.move_relative(Axis::Y, 10.0).await;
        assert!(matches!(result, Err(ScopeError::MotionTimeout { axis: Axis::Y, .. })));
        assert_eq!(stage.snapshot().y, 4.0);
    }

    #[tokio::test]
    async fn test_mock_illumination_records_bytes() {
        let mut leds = MockIllumination::new();
        leds.connect().await.unwrap();
        leds.send_color_command(b'r').await.unwrap();
        leds.send_color_command(b'c').await.unwrap();
        assert!(leds.is_connected());
        assert_eq!(leds.commands(), b"rc".to_vec());
    }
}
