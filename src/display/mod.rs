//! Display boundary.
//!
//! The dispatch loop hands every streamed frame to a [`DisplayCache`], which decides
//! whether the image and histogram plots need a full replot or an in-place update and
//! forwards them to a [`DisplaySink`]. Only the most recent frame's geometry and maximum
//! value are retained between ticks.

use crate::core::Frame;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Number of histogram bins.
pub const HISTOGRAM_BINS: usize = 100;

/// Whether a plot must be rebuilt or can be updated in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Replot,
    Update,
}

/// Pixel-value histogram over `[0, max_value]`.
///
/// Bins are half-open except the last, which also holds `max_value`. Values above
/// `max_value` are not counted.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    pub counts: Vec<u64>,
    pub max_value: u32,
}

impl Histogram {
    pub fn compute(pixels: &[u16], max_value: u32, bins: usize) -> Self {
        let bins = bins.max(1);
        let mut counts = vec![0u64; bins];
        for &pixel in pixels {
            let value = u32::from(pixel);
            if value > max_value {
                continue;
            }
            let index = if max_value == 0 {
                0
            } else {
                ((u64::from(value) * bins as u64) / u64::from(max_value)) as usize
            };
            counts[index.min(bins - 1)] += 1;
        }
        Self { counts, max_value }
    }

    pub fn of_frame(frame: &Frame) -> Self {
        Self::compute(&frame.pixels, frame.max_value(), HISTOGRAM_BINS)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Receives image and histogram updates.
pub trait DisplaySink: Send {
    fn render_frame(&mut self, frame: &Frame, max_value: u32, mode: RenderMode);
    fn render_histogram(&mut self, histogram: &Histogram, mode: RenderMode);
    /// Drops every plot.
    fn clear(&mut self);
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn render_frame(&mut self, frame: &Frame, max_value: u32, mode: RenderMode) {
        (**self).render_frame(frame, max_value, mode);
    }

    fn render_histogram(&mut self, histogram: &Histogram, mode: RenderMode) {
        (**self).render_histogram(histogram, mode);
    }

    fn clear(&mut self) {
        (**self).clear();
    }
}

/// Remembers what was last plotted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayCache {
    image: Option<((u32, u32), u32)>,
    histogram_max: Option<u32>,
}

impl DisplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders `frame` and its histogram, replotting only what changed.
    pub fn present(&mut self, sink: &mut dyn DisplaySink, frame: &Frame) {
        let max_value = frame.max_value();
        let key = (frame.dimensions(), max_value);

        let image_mode = if self.image == Some(key) {
            RenderMode::Update
        } else {
            self.image = Some(key);
            RenderMode::Replot
        };
        sink.render_frame(frame, max_value, image_mode);

        let histogram_mode = if self.histogram_max == Some(max_value) {
            RenderMode::Update
        } else {
            self.histogram_max = Some(max_value);
            RenderMode::Replot
        };
        sink.render_histogram(&Histogram::of_frame(frame), histogram_mode);
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.histogram_max.is_none()
    }

    /// Forgets the cached plots and clears the sink.
    pub fn clear(&mut self, sink: &mut dyn DisplaySink) {
        *self = Self::default();
        sink.clear();
    }
}

/// Summarizes frames through `tracing`.
///
/// Replots are logged at info level, in-place updates at debug.
#[derive(Debug, Default)]
pub struct LogDisplay {
    frames: u64,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySink for LogDisplay {
    fn render_frame(&mut self, frame: &Frame, max_value: u32, mode: RenderMode) {
        self.frames += 1;
        let peak = frame.pixels.iter().copied().max().unwrap_or(0);
        match mode {
            RenderMode::Replot => info!(
                width = frame.width,
                height = frame.height,
                max_value,
                peak,
                "image replotted"
            ),
            RenderMode::Update => debug!(frame = self.frames, peak, "image updated"),
        }
    }

    fn render_histogram(&mut self, histogram: &Histogram, mode: RenderMode) {
        let (mode_bin, _) = histogram
            .counts
            .iter()
            .enumerate()
            .max_by_key(|(_, count)| **count)
            .unwrap_or((0, &0));
        match mode {
            RenderMode::Replot => info!(
                bins = histogram.counts.len(),
                max_value = histogram.max_value,
                "histogram replotted"
            ),
            RenderMode::Update => debug!(mode_bin, total = histogram.total(), "histogram updated"),
        }
    }

    fn clear(&mut self) {
        debug!(frames = self.frames, "display cleared");
        self.frames = 0;
    }
}

/// Display event captured by a [`RecordingDisplay`].
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayEvent {
    Frame {
        dimensions: (u32, u32),
        max_value: u32,
        mode: RenderMode,
    },
    Histogram {
        max_value: u32,
        mode: RenderMode,
    },
    Clear,
}

/// Sink that records events; clones share the log.
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    events: Arc<Mutex<Vec<DisplayEvent>>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.log().clone()
    }

    pub fn frames_rendered(&self) -> usize {
        self.log()
            .iter()
            .filter(|e| matches!(e, DisplayEvent::Frame { .. }))
            .count()
    }

    fn log(&self) -> MutexGuard<'_, Vec<DisplayEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplaySink for RecordingDisplay {
    fn render_frame(&mut self, frame: &Frame, max_value: u32, mode: RenderMode) {
        self.log().push(DisplayEvent::Frame {
            dimensions: frame.dimensions(),
            max_value,
            mode,
        });
    }

    fn render_histogram(&mut self, histogram: &Histogram, mode: RenderMode) {
        self.log().push(DisplayEvent::Histogram {
            max_value: histogram.max_value,
            mode,
        });
    }

    fn clear(&mut self) {
        self.log().push(DisplayEvent::Clear);
    }
}
