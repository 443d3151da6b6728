//! Control surfaces.
//!
//! A control surface is the operator's side of a session: it posts commands on the work
//! queue and receives session events and errors from the dispatch loop. The dispatch loop
//! runs for as long as the surface reports itself open.
//!
//! [`TerminalSurface`] reads one `<event> [value]` line per control submission from an
//! async reader (stdin in the binary) on its own task and closes on `quit` or end of
//! input.

use crate::controls;
use crate::error::ScopeError;
use crate::messages::CommandSender;
use crate::session::SessionEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Operator-facing side of a session.
pub trait ControlSurface {
    /// The dispatch loop stops once this returns false.
    fn is_open(&self) -> bool;

    /// Shows an event produced by the session.
    fn notify(&mut self, event: &SessionEvent);

    /// Shows an error that was reported instead of ending the session.
    fn report_error(&mut self, error: &ScopeError);
}

/// Line-oriented surface fed by an async reader.
pub struct TerminalSurface {
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl TerminalSurface {
    /// Spawns the input task. Must be called from within a Tokio runtime.
    pub fn spawn<R>(input: R, commands: CommandSender) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let open = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&open);
        let reader = tokio::spawn(async move {
            read_commands(input, commands).await;
            flag.store(false, Ordering::SeqCst);
            debug!("terminal surface closed");
        });
        Self { open, reader }
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_commands<R>(input: R, commands: CommandSender)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read control input");
                break;
            }
        };
        let trimmed = line.trim();
        match trimmed {
            "" => continue,
            "quit" | "exit" => break,
            "help" => {
                info!("controls:\n{}", controls::help_text());
                continue;
            }
            _ => {}
        }

        match controls::parse_line(trimmed) {
            Ok(command) => {
                if commands.send(command).is_err() {
                    break;
                }
            }
            Err(ScopeError::InvalidInput { field, value }) => {
                debug!(%field, %value, "ignoring invalid input");
            }
            Err(e) => warn!(error = %e, "unrecognized control"),
        }
    }
}

impl ControlSurface for TerminalSurface {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn notify(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Position(p) => {
                info!(x = p.x, y = p.y, z = p.z, "current position (um)")
            }
            SessionEvent::FrameRate(fps) => info!(fps, "camera frame rate"),
            SessionEvent::DefocusSpan(span) => info!(span_um = span, "defocus interval (um)"),
            SessionEvent::RunFinished(summary) => info!(
                frames = summary.frames_saved,
                files = summary.paths.len(),
                "acquisition finished"
            ),
            SessionEvent::StartingCounter(n) => info!(counter = n, "counter advanced"),
        }
    }

    fn report_error(&mut self, error: &ScopeError) {
        error!(error = %error, "command failed");
    }
}
