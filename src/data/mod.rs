//! Naming and persistence of captured frames.
//!
//! - [`naming`]: file names derived from the operator's template, the date, a rollover
//!   counter and sequence coordinates
//! - [`tiff_writer`]: the TIFF-backed [`ImageSink`]
//!
//! [`RecordingSink`] keeps writes in memory and is what the integration tests hand to the
//! acquisition engine.

pub mod naming;
pub mod tiff_writer;

use crate::core::Frame;
use crate::error::AppResult;
use std::path::{Path, PathBuf};

pub use naming::{FileNamer, RolloverCounter};
pub use tiff_writer::TiffSink;

/// Destination for captured frames.
///
/// `append` adds a page when `path` already exists; callers must not assume that a
/// repeated name overwrites.
pub trait ImageSink: Send {
    /// Writes `frame` as a single-page image, replacing any existing file.
    fn write(&mut self, path: &Path, frame: &Frame) -> AppResult<()>;

    /// Appends `frame` as a new page of the multi-page image at `path`.
    fn append(&mut self, path: &Path, frame: &Frame) -> AppResult<()>;
}

impl<S: ImageSink + ?Sized> ImageSink for Box<S> {
    fn write(&mut self, path: &Path, frame: &Frame) -> AppResult<()> {
        (**self).write(path, frame)
    }

    fn append(&mut self, path: &Path, frame: &Frame) -> AppResult<()> {
        (**self).append(path, frame)
    }
}

/// How a frame reached a [`RecordingSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    Write,
    Append,
}

/// One write observed by a [`RecordingSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedWrite {
    pub path: PathBuf,
    pub kind: WriteKind,
    pub frame: Frame,
}

/// In-memory sink.
///
/// Clones share the same log, so a caller can keep one handle while the engine owns
/// another.
#[derive(Clone, Default)]
pub struct RecordingSink {
    writes: std::sync::Arc<std::sync::Mutex<Vec<RecordedWrite>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.log().clone()
    }

    /// Distinct paths in the order they were first written.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for write in self.log().iter() {
            if !paths.contains(&write.path) {
                paths.push(write.path.clone());
            }
        }
        paths
    }

    /// Number of pages recorded for `path`.
    pub fn pages(&self, path: &Path) -> usize {
        self.log().iter().filter(|w| w.path == path).count()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<RecordedWrite>> {
        self.writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, path: &Path, kind: WriteKind, frame: &Frame) {
        self.log().push(RecordedWrite {
            path: path.to_path_buf(),
            kind,
            frame: frame.clone(),
        });
    }
}

impl ImageSink for RecordingSink {
    fn write(&mut self, path: &Path, frame: &Frame) -> AppResult<()> {
        self.record(path, WriteKind::Write, frame);
        Ok(())
    }

    fn append(&mut self, path: &Path, frame: &Frame) -> AppResult<()> {
        self.record(path, WriteKind::Append, frame);
        Ok(())
    }
}
