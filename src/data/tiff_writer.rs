//! TIFF export for captured frames.
//!
//! Single frames are encoded through `image`'s TIFF codec as 16-bit grayscale. Pages are
//! appended with the lower-level `tiff` crate: the existing pages are decoded, and the file
//! is rewritten with the new frame as its last page.
//!
//! ```rust,ignore
//! let mut sink = TiffSink::new();
//! sink.write(Path::new("step_time_00000_z_001.tiff"), &frame)?;
//! sink.append(Path::new("cells_0.tiff"), &frame)?;
//! ```

use crate::core::Frame;
use crate::data::ImageSink;
use crate::error::{AppResult, ScopeError};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

/// A decoded 16-bit page.
struct Page {
    width: u32,
    height: u32,
    pixels: Vec<u16>,
}

/// Filesystem-backed [`ImageSink`] writing 16-bit grayscale TIFF.
///
/// Missing parent directories are created on first write.
#[derive(Debug, Default, Clone)]
pub struct TiffSink;

impl TiffSink {
    pub fn new() -> Self {
        Self
    }

    /// Reads every page of a multi-page TIFF as 16-bit pixels.
    ///
    /// 8-bit pages are widened.
    pub fn read_pages(path: &Path) -> AppResult<Vec<Frame>> {
        Ok(read_existing(path)?
            .into_iter()
            .map(|p| Frame::new(p.width, p.height, p.pixels, 16))
            .collect())
    }
}

fn validate(frame: &Frame) -> AppResult<()> {
    if !frame.is_complete() {
        return Err(ScopeError::IncompleteFrame {
            expected: frame.expected_len(),
            actual: frame.pixels.len(),
        });
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn read_existing(path: &Path) -> AppResult<Vec<Page>> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let mut pages = Vec::new();
    loop {
        let (width, height) = decoder.dimensions()?;
        let pixels = match decoder.read_image()? {
            DecodingResult::U16(data) => data,
            DecodingResult::U8(data) => data.into_iter().map(u16::from).collect(),
            _ => {
                return Err(ScopeError::Instrument(format!(
                    "{} holds pages that are not 8- or 16-bit grayscale",
                    path.display()
                )))
            }
        };
        pages.push(Page {
            width,
            height,
            pixels,
        });
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    Ok(pages)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

impl ImageSink for TiffSink {
    fn write(&mut self, path: &Path, frame: &Frame) -> AppResult<()> {
        validate(frame)?;
        ensure_parent(path)?;

        let bytes: Vec<u8> = frame.pixels.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let writer = BufWriter::new(File::create(path)?);
        image::codecs::tiff::TiffEncoder::new(writer).encode(
            &bytes,
            frame.width,
            frame.height,
            image::ExtendedColorType::L16,
        )?;

        tracing::debug!(
            path = ?path,
            dimensions = format!("{}x{}", frame.width, frame.height),
            bit_depth = frame.bits_per_pixel,
            "Wrote TIFF"
        );
        Ok(())
    }

    fn append(&mut self, path: &Path, frame: &Frame) -> AppResult<()> {
        validate(frame)?;
        ensure_parent(path)?;

        let mut pages = if path.exists() {
            read_existing(path)?
        } else {
            Vec::new()
        };
        pages.push(Page {
            width: frame.width,
            height: frame.height,
            pixels: frame.pixels.clone(),
        });

        let staging = staging_path(path);
        {
            let mut encoder = TiffEncoder::new(BufWriter::new(File::create(&staging)?))?;
            for page in &pages {
                encoder.write_image::<colortype::Gray16>(page.width, page.height, &page.pixels)?;
            }
        }
        fs::rename(&staging, path)?;

        tracing::debug!(path = ?path, pages = pages.len(), "Appended TIFF page");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32, offset: u16) -> Frame {
        let pixels = (0..width * height).map(|i| i as u16 * 16 + offset).collect();
        Frame::new(width, height, pixels, 12)
    }

    #[test]
    fn test_write_single_page() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("single.tiff");

        TiffSink::new().write(&path, &gradient(8, 4, 0)).unwrap();

        let pages = TiffSink::read_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].pixels, gradient(8, 4, 0).pixels);
    }

    #[test]
    fn test_append_adds_pages_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack_0.tiff");
        let mut sink = TiffSink::new();

        for offset in 0..3 {
            sink.append(&path, &gradient(6, 5, offset)).unwrap();
        }

        let pages = TiffSink::read_pages(&path).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].pixels, gradient(6, 5, 2).pixels);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("z.tiff");
        let mut sink = TiffSink::new();

        sink.append(&path, &gradient(4, 4, 0)).unwrap();
        sink.append(&path, &gradient(4, 4, 1)).unwrap();
        sink.write(&path, &gradient(4, 4, 9)).unwrap();

        let pages = TiffSink::read_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].pixels[0], 9);
    }

    #[test]
    fn test_incomplete_frame_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.tiff");

        let mut frame = gradient(4, 4, 0);
        frame.pixels.truncate(5);

        let err = TiffSink::new().write(&path, &frame).unwrap_err();
        assert!(err.is_incomplete_frame());
        assert!(!path.exists());
    }
}
