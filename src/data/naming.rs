//! Output file naming.
//!
//! A name template such as `"test_{date}"` is expanded with the calendar date, sanitized
//! for the filesystem and joined onto the destination directory to form a *base path*.
//! Each acquisition mode then appends its own suffix:
//!
//! | Mode        | Suffix                     | Example                      |
//! |-------------|----------------------------|------------------------------|
//! | single-shot | `_<N>`                     | `test_2024-01-05_3.tiff`     |
//! | defocus     | `_time_%05d_z_%03d`        | `..._time_00002_z_001.tiff`  |
//! | four-color  | `_<stem>_<N>`              | `test_2024-01-05_g_0.tiff`   |
//!
//! `N` comes from a [`RolloverCounter`], which moves on to the next number after a fixed
//! count of frames has been appended to the current file.

use crate::core::Color;
use chrono::NaiveDate;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Placeholder replaced with the current date.
pub const DATE_PLACEHOLDER: &str = "{date}";

/// Frames appended to one numbered file before the counter rolls over.
pub const FRAMES_PER_FILE: u32 = 10;

const EXTENSION: &str = ".tiff";

/// Replaces characters that are unsafe in file names.
///
/// Spaces and periods become underscores, colons are dropped.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|&c| c != ':')
        .map(|c| match c {
            ' ' | '.' => '_',
            other => other,
        })
        .collect()
}

/// Substitutes the date into `template` and sanitizes the result.
pub fn expand_template(template: &str, date: NaiveDate) -> String {
    let stamped = template.replace(DATE_PLACEHOLDER, &date.format("%Y-%m-%d").to_string());
    sanitize(&stamped)
}

/// Today's date in local time.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Builds the output paths for one capture run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileNamer {
    base: PathBuf,
}

impl FileNamer {
    /// Expands `template` for `date` and joins it onto `directory`.
    ///
    /// The directory is used verbatim.
    pub fn new(directory: impl AsRef<Path>, template: &str, date: NaiveDate) -> Self {
        Self {
            base: directory.as_ref().join(expand_template(template, date)),
        }
    }

    /// Sanitized base path, before any suffix or extension.
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn single_shot(&self, counter: u32) -> PathBuf {
        self.with_suffix(&format!("_{counter}"))
    }

    /// Defocus step file. `time_index` counts from 0, `z_index` from 1.
    pub fn defocus(&self, time_index: u32, z_index: u32) -> PathBuf {
        self.with_suffix(&format!("_time_{time_index:05}_z_{z_index:03}"))
    }

    pub fn four_color(&self, color: Color, counter: u32) -> PathBuf {
        self.with_suffix(&format!("_{}_{counter}", color.file_stem()))
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.base.as_os_str());
        name.push(suffix);
        name.push(EXTENSION);
        PathBuf::from(name)
    }
}

/// File-number counter that advances every `period` frames.
///
/// One counter is shared by every color of a four-color run, so the suffix moves on
/// after ten frames in total rather than ten frames of each color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RolloverCounter {
    value: u32,
    frames_in_file: u32,
    period: u32,
}

impl RolloverCounter {
    pub fn new(start: u32) -> Self {
        Self::with_period(start, FRAMES_PER_FILE)
    }

    pub fn with_period(start: u32, period: u32) -> Self {
        Self {
            value: start,
            frames_in_file: 0,
            period: period.max(1),
        }
    }

    /// Number to use for the next frame.
    pub fn current(&self) -> u32 {
        self.value
    }

    /// Records one frame written under [`current`](Self::current).
    pub fn record_frame(&mut self) {
        self.frames_in_file += 1;
        if self.frames_in_file >= self.period {
            self.value = self.value.saturating_add(1);
            self.frames_in_file = 0;
        }
    }

    /// First number not yet used by any written frame.
    pub fn next_unused(&self) -> u32 {
        if self.frames_in_file == 0 {
            self.value
        } else {
            self.value.saturating_add(1)
        }
    }
}
