//! Frame averaging.

use crate::core::Frame;
use crate::error::{AppResult, ScopeError};

/// Number of raw frames to average for one acquisition step.
///
/// A non-zero interval takes priority over the explicit count: the camera is sampled for
/// the whole interval, i.e. `floor(frame_rate * interval)` frames. The result is never
/// below one.
pub fn frames_to_average(explicit: u32, interval_secs: f64, frame_rate_fps: f64) -> u32 {
    if interval_secs > 0.0 {
        let derived = (frame_rate_fps * interval_secs).floor();
        if derived.is_finite() && derived >= 1.0 {
            return derived.min(f64::from(u32::MAX)) as u32;
        }
        return 1;
    }
    explicit.max(1)
}

/// Running per-pixel sum of complete frames sharing one geometry.
#[derive(Debug)]
pub struct FrameAccumulator {
    width: u32,
    height: u32,
    bits_per_pixel: u8,
    sums: Vec<u64>,
    count: u32,
}

impl FrameAccumulator {
    pub fn new(width: u32, height: u32, bits_per_pixel: u8) -> Self {
        Self {
            width,
            height,
            bits_per_pixel,
            sums: vec![0; width as usize * height as usize],
            count: 0,
        }
    }

    /// Adds a frame. Frames that do not match the geometry are rejected with
    /// `IncompleteFrame` and leave the accumulator untouched.
    pub fn add(&mut self, frame: &Frame) -> AppResult<()> {
        if frame.dimensions() != (self.width, self.height) || !frame.is_complete() {
            return Err(ScopeError::IncompleteFrame {
                expected: self.sums.len(),
                actual: frame.pixels.len(),
            });
        }
        for (sum, &pixel) in self.sums.iter_mut().zip(&frame.pixels) {
            *sum += u64::from(pixel);
        }
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Truncated per-pixel mean, or `None` if nothing was accumulated.
    pub fn finish(self) -> Option<Frame> {
        if self.count == 0 {
            return None;
        }
        let n = u64::from(self.count);
        let pixels = self
            .sums
            .into_iter()
            .map(|sum| (sum / n).min(u64::from(u16::MAX)) as u16)
            .collect();
        Some(Frame::new(self.width, self.height, pixels, self.bits_per_pixel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_overrides_explicit_count() {
        assert_eq!(frames_to_average(5, 2.0, 30.0), 60);
        assert_eq!(frames_to_average(5, 0.0, 30.0), 5);
        assert_eq!(frames_to_average(5, 0.5, 29.97), 14);
    }

    #[test]
    fn count_never_drops_below_one() {
        assert_eq!(frames_to_average(0, 0.0, 30.0), 1);
        assert_eq!(frames_to_average(5, 0.01, 30.0), 1);
    }

    #[test]
    fn mean_is_truncated() {
        let mut acc = FrameAccumulator::new(2, 1, 12);
        acc.add(&Frame::new(2, 1, vec![1, 10], 12)).unwrap();
        acc.add(&Frame::new(2, 1, vec![2, 11], 12)).unwrap();
        let frame = acc.finish().unwrap();
        assert_eq!(frame.pixels, vec![1, 10]);
        assert_eq!(frame.bits_per_pixel, 12);
    }

    #[test]
    fn mismatched_frame_is_not_counted() {
        let mut acc = FrameAccumulator::new(2, 2, 8);
        let err = acc.add(&Frame::new(2, 2, vec![1, 2, 3], 8)).unwrap_err();
        assert!(err.is_incomplete_frame());
        assert_eq!(acc.count(), 0);
        assert!(acc.finish().is_none());
    }
}
