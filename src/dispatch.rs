//! Event dispatch loop.
//!
//! Each tick, while the control surface is open:
//! 1. if streaming, pull one frame and render it
//! 2. drain the work queue in FIFO order until it is empty
//! 3. yield briefly so the surface's input task can run
//!
//! A failing tick ends the loop while the stream is running. Once streaming is off, the
//! failure is reported to the operator and the loop carries on. On exit the session is
//! torn down: queued work is dropped, the stream is forced idle and the display cleared.

use crate::error::AppResult;
use crate::session::Session;
use crate::surface::ControlSurface;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default pause at the end of a tick.
pub const DEFAULT_TICK_PAUSE: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug)]
pub struct DispatchLoop {
    tick_pause: Duration,
}

impl Default for DispatchLoop {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_PAUSE)
    }
}

impl DispatchLoop {
    pub fn new(tick_pause: Duration) -> Self {
        Self { tick_pause }
    }

    /// Runs until the surface closes or an unrecoverable fault occurs.
    ///
    /// The session is torn down in both cases; the fault, if any, is returned.
    pub async fn run(&self, session: &mut Session, surface: &mut dyn ControlSurface) -> AppResult<()> {
        info!(tick_pause = ?self.tick_pause, "dispatch loop started");
        let mut ticks: u64 = 0;

        let outcome = loop {
            if !surface.is_open() {
                info!(ticks, "control surface closed");
                break Ok(());
            }

            if let Err(e) = Self::tick(session, surface).await {
                if session.is_streaming() {
                    error!(error = %e, ticks, "dispatch loop terminated");
                    break Err(e);
                }
                warn!(error = %e, "command failed while not streaming");
                surface.report_error(&e);
            }

            ticks += 1;
            self.pause().await;
        };

        session.teardown().await;
        outcome
    }

    async fn tick(session: &mut Session, surface: &mut dyn ControlSurface) -> AppResult<()> {
        if session.is_streaming() {
            session.refresh_stream().await?;
        }

        while let Some(command) = session.next_command() {
            let result = session.execute(command).await;
            for event in session.take_events() {
                surface.notify(&event);
            }
            result?;
        }
        Ok(())
    }

    async fn pause(&self) {
        if self.tick_pause.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.tick_pause).await;
        }
    }
}
