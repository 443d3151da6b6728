//! Session state for one control-surface lifetime.
//!
//! A [`Session`] owns the acquisition engine, the operator's acquisition settings, the
//! display cache and the consumer half of the work queue. It is created when the control
//! surface opens and torn down by [`Session::teardown`] when the dispatch loop exits.
//! Every mutation of session state happens in [`Session::execute`], called from the
//! dispatch loop.

use crate::acquisition::sequence::{clamp_radius, clamp_step, CaptureRequest, DefocusPlan, DefocusRequest, FourColorRequest};
use crate::acquisition::{AcquisitionEngine, RunSummary};
use crate::config::AcquisitionSettings;
use crate::core::StagePosition;
use crate::data::naming;
use crate::display::{DisplayCache, DisplaySink};
use crate::error::AppResult;
use crate::messages::{ScopeCommand, WorkQueue};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

/// Something the operator should see, emitted by the session and forwarded to the
/// control surface after each command.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Position(StagePosition),
    FrameRate(f64),
    /// Full z range of a defocus sweep with the current step and radius (µm)
    DefocusSpan(f64),
    RunFinished(RunSummary),
    StartingCounter(u32),
}

pub struct Session {
    engine: AcquisitionEngine,
    settings: AcquisitionSettings,
    camera_identifier: String,
    queue: WorkQueue,
    display: Box<dyn DisplaySink>,
    cache: DisplayCache,
    date: Option<NaiveDate>,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(
        engine: AcquisitionEngine,
        settings: AcquisitionSettings,
        camera_identifier: impl Into<String>,
        queue: WorkQueue,
        display: Box<dyn DisplaySink>,
    ) -> Self {
        Self {
            engine,
            settings,
            camera_identifier: camera_identifier.into(),
            queue,
            display,
            cache: DisplayCache::new(),
            date: None,
            events: Vec::new(),
        }
    }

    /// Pins the date substituted into file names instead of using today's.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn engine(&self) -> &AcquisitionEngine {
        &self.engine
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    pub fn is_streaming(&self) -> bool {
        self.engine.is_streaming()
    }

    pub fn display_cache(&self) -> &DisplayCache {
        &self.cache
    }

    /// Events produced since the last call.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn next_command(&mut self) -> Option<ScopeCommand> {
        self.queue.try_next()
    }

    /// Pulls one frame and renders it. Incomplete frames are dropped.
    pub async fn refresh_stream(&mut self) -> AppResult<()> {
        if let Some(frame) = self.engine.pull_stream_frame().await? {
            self.cache.present(self.display.as_mut(), &frame);
        }
        Ok(())
    }

    /// Applies one command.
    pub async fn execute(&mut self, command: ScopeCommand) -> AppResult<()> {
        debug!(?command, "executing");
        match command {
            ScopeCommand::ConnectCamera => {
                let identifier = self.camera_identifier.clone();
                self.engine.connect_camera(&identifier).await?;
            }
            ScopeCommand::StartStream => self.engine.start_stream().await?,
            ScopeCommand::StopStream => self.engine.stop_stream().await?,

            ScopeCommand::SetExposure(value) => {
                self.engine.set_exposure(value).await?;
            }
            ScopeCommand::SetGain(value) => {
                self.engine.set_gain(value).await?;
            }
            ScopeCommand::SetFrameRate(value) => {
                let effective = self.engine.set_frame_rate(value).await?;
                self.events.push(SessionEvent::FrameRate(effective));
            }

            ScopeCommand::InitializeStage => self.engine.initialize_stage().await?,
            ScopeCommand::Jog(direction) => {
                self.engine
                    .jog(direction, self.settings.xy_step_um, self.settings.z_step_um)
                    .await?;
            }
            ScopeCommand::SetXyStep(step) => {
                self.settings.xy_step_um = clamp_step(step);
                info!(xy_step_um = self.settings.xy_step_um, "xy step set");
            }
            ScopeCommand::SetZStep(step) => {
                self.settings.z_step_um = clamp_step(step);
                info!(z_step_um = self.settings.z_step_um, "z step set");
                self.report_defocus_span();
            }
            ScopeCommand::SetZRadius(radius) => {
                self.settings.z_radius = clamp_radius(radius);
                info!(z_radius = self.settings.z_radius, "defocus radius set");
                self.report_defocus_span();
            }
            ScopeCommand::ReadPosition => {
                let position = self.engine.current_position().await?;
                info!(x = position.x, y = position.y, z = position.z, "stage position");
                self.events.push(SessionEvent::Position(position));
            }

            ScopeCommand::SetColor(color) => self.engine.set_color(color).await?,

            ScopeCommand::SetNumImages(n) => self.settings.num_images = n,
            ScopeCommand::SetNumToAverage(n) => self.settings.num_to_average = n,
            ScopeCommand::SetInterval(secs) => self.settings.interval_secs = secs,
            ScopeCommand::SetDirectory(dir) => self.settings.directory = dir,
            ScopeCommand::SetNameTemplate(template) => self.settings.name_template = template,
            ScopeCommand::SetStartingCounter(n) => self.settings.starting_counter = n,

            ScopeCommand::CaptureSingleShot => {
                let request = self.capture_request();
                let summary = self.engine.run_single_shot(&request).await?;
                self.finish_run(summary);
            }
            ScopeCommand::CaptureDefocus => {
                let request = DefocusRequest {
                    capture: self.capture_request(),
                    z_step_um: self.settings.z_step_um,
                    radius: self.settings.z_radius,
                };
                let summary = self.engine.run_defocus(&request).await?;
                self.finish_run(summary);
            }
            ScopeCommand::CaptureFourColor => {
                let request = FourColorRequest {
                    capture: self.capture_request(),
                };
                let summary = self.engine.run_four_color(&request).await?;
                self.finish_run(summary);
            }
        }
        Ok(())
    }

    /// Snapshot of the settings for a run about to start.
    fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            num_frames: self.settings.num_images,
            num_to_average: self.settings.num_to_average,
            interval_secs: self.settings.interval_secs,
            directory: self.settings.directory.clone(),
            name_template: self.settings.name_template.clone(),
            starting_counter: self.settings.starting_counter,
            date: self.date.unwrap_or_else(naming::today),
        }
    }

    fn finish_run(&mut self, summary: RunSummary) {
        if let Some(next) = summary.next_counter {
            if next != self.settings.starting_counter {
                self.settings.starting_counter = next;
                self.events.push(SessionEvent::StartingCounter(next));
            }
        }
        self.events.push(SessionEvent::RunFinished(summary));
    }

    fn report_defocus_span(&mut self) {
        let span = DefocusPlan::new(self.settings.z_step_um, self.settings.z_radius).span();
        info!(span_um = span, "defocus interval");
        self.events.push(SessionEvent::DefocusSpan(span));
    }

    /// Resets the session: drops queued work, forces the engine idle and clears the
    /// display.
    pub async fn teardown(&mut self) {
        let dropped = self.queue.reset();
        if dropped > 0 {
            warn!(dropped, "discarded queued commands");
        }
        self.engine.shutdown().await;
        self.cache.clear(self.display.as_mut());
        self.events.clear();
        info!("session torn down");
    }
}
