//! CLI entry point for scope_daq.
//!
//! Starts a session against the simulated rig (or the serial LED controller when built
//! with `instrument_serial` and enabled in the configuration) and reads controls from
//! stdin, one `<event> [value]` per line. Type `help` for the list of controls and
//! `quit` to end the session.
//!
//! ```bash
//! scope_daq --config config/scope.toml --log-format compact
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use scope_daq::acquisition::AcquisitionEngine;
use scope_daq::config::{ScopeConfig, DEFAULT_CONFIG_PATH};
use scope_daq::data::TiffSink;
use scope_daq::dispatch::DispatchLoop;
use scope_daq::display::LogDisplay;
use scope_daq::hardware::mock::{MockCamera, MockIllumination, MockStage};
use scope_daq::hardware::serial_led::SerialIllumination;
use scope_daq::hardware::Illumination;
use scope_daq::logging;
use scope_daq::messages::work_queue;
use scope_daq::session::Session;
use scope_daq::surface::TerminalSurface;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "scope_daq")]
#[command(about = "Microscope acquisition controller", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Override the configured log format (pretty, compact, json)
    #[arg(long)]
    log_format: Option<String>,

    /// Camera serial number or name; empty selects the first camera found
    #[arg(long)]
    camera: Option<String>,

    /// Serial port of the LED controller; enables the serial controller
    #[arg(long)]
    led_port: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let result = runtime.block_on(run(cli));
    // Stdin reads sit on the blocking pool and never finish on their own.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ScopeConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.application.log_format = format;
    }
    if let Some(camera) = cli.camera {
        config.camera.identifier = camera;
    }
    if let Some(port) = cli.led_port {
        config.illumination.port = port;
        config.illumination.enabled = true;
    }
    config.validate().context("Invalid configuration")?;
    logging::init_from_config(&config).context("Failed to initialize logging")?;

    info!(name = %config.application.name, config = %cli.config.display(), "starting");

    let engine = AcquisitionEngine::new(
        Box::new(simulated_camera(&config)),
        Box::new(
            MockStage::new().with_timing(
                Duration::from_millis(config.stage.simulated_move_ms),
                config.move_timeout(),
            ),
        ),
        illumination(&config),
        Box::new(TiffSink::new()),
        config.engine_settings(),
    );

    let (commands, queue) = work_queue();
    let mut surface = TerminalSurface::spawn(BufReader::new(tokio::io::stdin()), commands);
    let mut session = Session::new(
        engine,
        config.acquisition.clone(),
        config.camera.identifier.clone(),
        queue,
        Box::new(LogDisplay::new()),
    );

    info!("type `help` for the list of controls, `quit` to exit");
    DispatchLoop::new(config.tick_pause())
        .run(&mut session, &mut surface)
        .await
        .context("Session ended with an error")?;

    info!("session closed");
    Ok(())
}

fn simulated_camera(config: &ScopeConfig) -> MockCamera {
    let camera = &config.camera;
    let device = if camera.identifier.is_empty() {
        "sim-0".to_string()
    } else {
        camera.identifier.clone()
    };
    MockCamera::with_devices(
        vec![device],
        camera.sensor_width,
        camera.sensor_height,
        camera.bits_per_pixel,
    )
    .with_bounds(camera.exposure_bounds, camera.frame_rate_bounds)
}

fn illumination(config: &ScopeConfig) -> Box<dyn Illumination> {
    let settings = &config.illumination;
    if settings.enabled {
        if cfg!(feature = "instrument_serial") {
            return Box::new(SerialIllumination::new(
                settings.port.clone(),
                settings.baud_rate,
            ));
        }
        warn!(
            port = %settings.port,
            "serial LED controller requested but instrument_serial is not enabled; using simulated LEDs"
        );
    }
    Box::new(MockIllumination::new())
}
