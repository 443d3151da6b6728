//! Serial LED controller.
//!
//! The controller firmware switches LEDs on receipt of a single ASCII byte
//! (`r`, `y`, `g`, `b`, or `c` for all off). Nothing is read back.
//!
//! Serial I/O goes through the `serialport` crate on Tokio's blocking pool and is only
//! compiled with the `instrument_serial` feature; without it, `connect` reports
//! `FeatureNotEnabled`.

use crate::error::{AppResult, ScopeError};
use crate::hardware::Illumination;
use async_trait::async_trait;
use tracing::{debug, info};

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::sync::Arc;
#[cfg(feature = "instrument_serial")]
use std::time::Duration;
#[cfg(feature = "instrument_serial")]
use tokio::sync::Mutex;

/// Default line speed of the LED controller.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// LED controller attached to a serial port.
pub struct SerialIllumination {
    /// Port name (e.g., "/dev/ttyACM0", "COM5")
    port_name: String,

    baud_rate: u32,

    #[cfg(feature = "instrument_serial")]
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
}

impl SerialIllumination {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[async_trait]
impl Illumination for SerialIllumination {
    async fn connect(&mut self) -> AppResult<()> {
        #[cfg(feature = "instrument_serial")]
        {
            if self.port.is_some() {
                return Ok(());
            }
            let port = serialport::new(&self.port_name, self.baud_rate)
                .timeout(Duration::from_millis(100))
                .open()
                .map_err(|e| {
                    ScopeError::Instrument(format!(
                        "Failed to open serial port '{}' at {} baud: {}",
                        self.port_name, self.baud_rate, e
                    ))
                })?;
            self.port = Some(Arc::new(Mutex::new(port)));
            info!(port = %self.port_name, baud = self.baud_rate, "LED controller connected");
            Ok(())
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            debug!(port = %self.port_name, "serial support not compiled in");
            Err(ScopeError::FeatureNotEnabled("instrument_serial".to_string()))
        }
    }

    async fn send_color_command(&mut self, command: u8) -> AppResult<()> {
        #[cfg(feature = "instrument_serial")]
        {
            let port = self
                .port
                .as_ref()
                .ok_or(ScopeError::NotConnected("LED controller"))?
                .clone();

            tokio::task::spawn_blocking(move || -> AppResult<()> {
                use std::io::Write;

                let mut guard = port.blocking_lock();
                guard.write_all(&[command])?;
                guard.flush()?;
                Ok(())
            })
            .await
            .map_err(|e| ScopeError::Instrument(format!("Serial I/O task panicked: {}", e)))??;

            debug!(command = %char::from(command), "sent LED command");
            Ok(())
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = command;
            info!(port = %self.port_name, "dropping LED command, serial support not compiled in");
            Err(ScopeError::FeatureNotEnabled("instrument_serial".to_string()))
        }
    }
}
