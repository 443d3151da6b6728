//! Dispatch loop behaviour: command ordering, error classification and teardown.

mod common;

use common::{jan_5, Rig};
use scope_daq::acquisition::EngineState;
use scope_daq::config::AcquisitionSettings;
use scope_daq::dispatch::DispatchLoop;
use scope_daq::display::{DisplayEvent, RecordingDisplay};
use scope_daq::error::ScopeError;
use scope_daq::hardware::mock::CameraCall;
use scope_daq::messages::{work_queue, CommandSender, ScopeCommand};
use scope_daq::session::{Session, SessionEvent};
use scope_daq::surface::ControlSurface;
use std::cell::Cell;
use std::time::Duration;
use tracing_test::traced_test;

/// Surface that stays open for a fixed number of ticks and records what it is shown.
struct ScriptedSurface {
    ticks_left: Cell<usize>,
    events: Vec<SessionEvent>,
    errors: Vec<String>,
}

impl ScriptedSurface {
    fn open_for(ticks: usize) -> Self {
        Self {
            ticks_left: Cell::new(ticks),
            events: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl ControlSurface for ScriptedSurface {
    fn is_open(&self) -> bool {
        let left = self.ticks_left.get();
        if left == 0 {
            return false;
        }
        self.ticks_left.set(left - 1);
        true
    }

    fn notify(&mut self, event: &SessionEvent) {
        self.events.push(event.clone());
    }

    fn report_error(&mut self, error: &ScopeError) {
        self.errors.push(error.to_string());
    }
}

struct Harness {
    rig: Rig,
    display: RecordingDisplay,
    commands: CommandSender,
    session: Session,
}

fn harness(settings: AcquisitionSettings) -> Harness {
    let rig = Rig::new();
    let display = RecordingDisplay::new();
    let (commands, queue) = work_queue();
    let session = Session::new(
        rig.engine(),
        settings,
        "",
        queue,
        Box::new(display.clone()),
    )
    .with_date(jan_5());
    Harness {
        rig,
        display,
        commands,
        session,
    }
}

fn post(commands: &CommandSender, batch: &[ScopeCommand]) {
    for command in batch {
        commands.send(command.clone()).unwrap();
    }
}

fn dispatch() -> DispatchLoop {
    DispatchLoop::new(Duration::ZERO)
}

#[tokio::test]
async fn test_streaming_renders_one_frame_per_tick() {
    let mut h = harness(AcquisitionSettings::default());
    post(&h.commands, &[ScopeCommand::ConnectCamera, ScopeCommand::StartStream]);
    let mut surface = ScriptedSurface::open_for(5);

    dispatch().run(&mut h.session, &mut surface).await.unwrap();

    // Tick one connects and starts, the next four each render a frame.
    assert_eq!(h.display.frames_rendered(), 4);
    assert!(surface.errors.is_empty());
    assert_eq!(h.display.events().last(), Some(&DisplayEvent::Clear));
    assert_eq!(h.session.engine().state(), EngineState::Idle);
    assert!(!h.rig.camera.is_acquiring());
}

#[tokio::test]
#[traced_test]
async fn test_error_while_idle_is_reported_and_loop_continues() {
    let mut h = harness(AcquisitionSettings::default());
    post(
        &h.commands,
        &[ScopeCommand::CaptureSingleShot, ScopeCommand::ReadPosition],
    );
    let mut surface = ScriptedSurface::open_for(3);

    dispatch().run(&mut h.session, &mut surface).await.unwrap();

    assert_eq!(surface.errors.len(), 1);
    assert!(surface.errors[0].contains("Stream"), "got {:?}", surface.errors);
    assert!(surface
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::Position(_))));
    assert!(h.rig.sink.writes().is_empty());
    assert!(logs_contain("command failed while not streaming"));
}

#[tokio::test]
async fn test_camera_fault_while_streaming_terminates_loop() {
    let mut h = harness(AcquisitionSettings::default());
    post(&h.commands, &[ScopeCommand::ConnectCamera, ScopeCommand::StartStream]);
    h.rig.camera.fail_after(1);
    let mut surface = ScriptedSurface::open_for(100);

    let result = dispatch().run(&mut h.session, &mut surface).await;

    assert!(matches!(result, Err(ScopeError::Instrument(_))));
    assert!(surface.ticks_left.get() > 90, "loop should stop early");
    assert!(surface.errors.is_empty());
    assert_eq!(h.display.frames_rendered(), 1);
    assert_eq!(h.session.engine().state(), EngineState::Idle);
    assert_eq!(h.rig.camera.count(&CameraCall::EndAcquisition), 1);
    assert!(h.session.display_cache().is_empty());
}

#[tokio::test]
async fn test_fault_after_stop_is_tolerated() {
    let mut h = harness(AcquisitionSettings::default());
    post(
        &h.commands,
        &[
            ScopeCommand::ConnectCamera,
            ScopeCommand::StartStream,
            ScopeCommand::StopStream,
            ScopeCommand::CaptureFourColor,
            ScopeCommand::SetNumImages(3),
        ],
    );
    let mut surface = ScriptedSurface::open_for(3);

    dispatch().run(&mut h.session, &mut surface).await.unwrap();

    assert_eq!(surface.errors.len(), 1);
    assert_eq!(h.session.settings().num_images, 3);
    assert!(h.rig.leds.commands().is_empty());
}

#[tokio::test]
async fn test_commands_execute_in_submission_order() {
    let mut h = harness(AcquisitionSettings::default());
    post(
        &h.commands,
        &[
            ScopeCommand::SetZStep(2.0),
            ScopeCommand::SetZRadius(3),
            ScopeCommand::SetZStep(0.5),
        ],
    );
    let mut surface = ScriptedSurface::open_for(1);

    dispatch().run(&mut h.session, &mut surface).await.unwrap();

    let spans: Vec<f64> = surface
        .events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::DefocusSpan(span) => Some(*span),
            _ => None,
        })
        .collect();
    // Default radius is 1.
    assert_eq!(spans, vec![6.0, 14.0, 3.5]);
    assert_eq!(h.session.settings().z_step_um, 0.5);
}

#[tokio::test]
async fn test_capture_advances_starting_counter() {
    let settings = AcquisitionSettings {
        num_images: 12,
        num_to_average: 1,
        starting_counter: 4,
        ..AcquisitionSettings::default()
    };
    let mut h = harness(settings);
    post(
        &h.commands,
        &[
            ScopeCommand::ConnectCamera,
            ScopeCommand::StartStream,
            ScopeCommand::CaptureSingleShot,
        ],
    );
    let mut surface = ScriptedSurface::open_for(2);

    dispatch().run(&mut h.session, &mut surface).await.unwrap();

    assert_eq!(h.session.settings().starting_counter, 6);
    assert!(surface.events.contains(&SessionEvent::StartingCounter(6)));
    assert!(surface
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::RunFinished(s) if s.frames_saved == 12)));
}

#[tokio::test]
async fn test_closed_surface_discards_queued_work() {
    let mut h = harness(AcquisitionSettings::default());
    post(&h.commands, &[ScopeCommand::ConnectCamera, ScopeCommand::StartStream]);
    let mut surface = ScriptedSurface::open_for(0);

    dispatch().run(&mut h.session, &mut surface).await.unwrap();

    assert!(h.rig.camera.calls().is_empty());
    assert_eq!(h.display.events(), vec![DisplayEvent::Clear]);
}
