//! Shared fixtures: a simulated rig whose device handles stay inspectable after the
//! engine takes ownership of clones.

#![allow(dead_code)]

use chrono::NaiveDate;
use scope_daq::acquisition::sequence::CaptureRequest;
use scope_daq::acquisition::{AcquisitionEngine, EngineSettings};
use scope_daq::core::Bounds;
use scope_daq::data::{ImageSink, RecordingSink};
use scope_daq::hardware::mock::{MockCamera, MockIllumination, MockStage};
use std::path::PathBuf;
use std::time::Duration;

pub struct Rig {
    pub camera: MockCamera,
    pub stage: MockStage,
    pub leds: MockIllumination,
    pub sink: RecordingSink,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_stage(MockStage::new())
    }

    pub fn with_stage(stage: MockStage) -> Self {
        Self {
            camera: MockCamera::new(4, 3, 12)
                .with_bounds(Bounds::new(10.0, 30_000.0), Bounds::new(1.0, 60.0)),
            stage,
            leds: MockIllumination::new(),
            sink: RecordingSink::new(),
        }
    }

    pub fn engine(&self) -> AcquisitionEngine {
        self.engine_with_sink(Box::new(self.sink.clone()))
    }

    pub fn engine_with_sink(&self, sink: Box<dyn ImageSink>) -> AcquisitionEngine {
        AcquisitionEngine::new(
            Box::new(self.camera.clone()),
            Box::new(self.stage.clone()),
            Box::new(self.leds.clone()),
            sink,
            EngineSettings {
                settle: Duration::ZERO,
                ..EngineSettings::default()
            },
        )
    }

    /// Engine with the camera connected and streaming.
    pub async fn streaming_engine(&self) -> AcquisitionEngine {
        let mut engine = self.engine();
        engine.connect_camera("").await.expect("camera connects");
        engine.start_stream().await.expect("stream starts");
        self.camera.clear_calls();
        engine
    }
}

pub fn jan_5() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 5).expect("valid date")
}

pub fn request(num_frames: u32) -> CaptureRequest {
    CaptureRequest {
        num_frames,
        num_to_average: 1,
        interval_secs: 0.0,
        directory: PathBuf::from("out"),
        name_template: "test_{date}".to_string(),
        starting_counter: 0,
        date: jan_5(),
    }
}
