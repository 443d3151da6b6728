//! Commands posted by the control surface and the queue that carries them.
//!
//! The control surface turns operator input into [`ScopeCommand`]s and posts them on a
//! [`CommandSender`]. The dispatch loop drains the matching [`WorkQueue`] once per tick in
//! FIFO order; it is the only consumer, and the only writer of session state.

use crate::acquisition::JogDirection;
use crate::core::Color;
use crate::error::{AppResult, ScopeError};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Work item for the session.
#[derive(Clone, Debug, PartialEq)]
pub enum ScopeCommand {
    /// Find the camera, put it under manual control and connect the LEDs
    ConnectCamera,
    StartStream,
    StopStream,

    SetExposure(f64),
    SetGain(f64),
    SetFrameRate(f64),

    /// Home the stage and drive it to the home position
    InitializeStage,
    Jog(JogDirection),
    SetXyStep(f64),
    SetZStep(f64),
    /// Defocus radius, in z steps on each side of focus
    SetZRadius(u32),
    /// Refresh the "current position" readout
    ReadPosition,

    SetColor(Color),

    SetNumImages(u32),
    SetNumToAverage(u32),
    SetInterval(f64),
    SetDirectory(PathBuf),
    SetNameTemplate(String),
    SetStartingCounter(u32),

    CaptureSingleShot,
    CaptureDefocus,
    CaptureFourColor,
}

/// Creates the producer and consumer halves of a session's work queue.
pub fn work_queue() -> (CommandSender, WorkQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, WorkQueue { rx })
}

/// Producer half, held by the control surface.
#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<ScopeCommand>,
}

impl CommandSender {
    pub fn send(&self, command: ScopeCommand) -> AppResult<()> {
        self.tx.send(command).map_err(|_| ScopeError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the session.
#[derive(Debug)]
pub struct WorkQueue {
    rx: mpsc::UnboundedReceiver<ScopeCommand>,
}

impl WorkQueue {
    /// Next queued command, without waiting.
    pub fn try_next(&mut self) -> Option<ScopeCommand> {
        self.rx.try_recv().ok()
    }

    /// Discards everything queued. Returns how many items were dropped.
    pub fn reset(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}
