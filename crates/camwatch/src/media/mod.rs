//! Device, encoder, decoder and preview abstractions.
//!
//! The recorder, player and plate reader only ever talk to these traits.
//! The [`ffmpeg`] module provides the real implementations; tests plug in
//! in-memory ones.

pub mod ffmpeg;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::RgbImage;
use tracing::debug;

use crate::error::Result;

/// A decoded 8-bit RGB frame.
pub type Frame = RgbImage;

/// Something that yields frames one at a time.
///
/// `Ok(None)` means the stream ended normally; `Err` means the device or
/// file failed mid-stream. Callers that do not care about the difference
/// can treat both as "stop reading".
pub trait FrameSource: Send {
    /// Read the next frame, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device or decoder fails.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        (**self).read_frame()
    }
}

/// Opens capture devices by index.
pub trait CameraBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Open device `index`. The returned source owns the device until dropped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceUnavailable`] if the device cannot be
    /// opened or delivers no frames.
    fn open(&self, index: usize) -> Result<Box<dyn FrameSource>>;
}

/// Fixed output geometry and rate of an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: u32,
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 20,
        }
    }
}

/// Writes frames into a video file.
pub trait VideoEncoder: Send {
    /// Append one frame. Frames must match the encoder's format.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encoder`] if the frame cannot be written.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encoder`] if the file cannot be finalised.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Creates encoders for output files.
pub trait EncoderFactory: Send + Sync {
    /// Start a new video file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encoder`] if the encoder cannot be started.
    fn create(&self, path: &Path, format: VideoFormat) -> Result<Box<dyn VideoEncoder>>;
}

/// Stream properties of an opened video file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// Frames per second reported by the container.
    pub fps: f64,
    /// Total number of frames, 0 when unknown.
    pub total_frames: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

/// A seekable decoded video.
pub trait VideoSource: FrameSource {
    /// Stream properties.
    fn info(&self) -> VideoInfo;

    /// Index of the next frame `read_frame` will return.
    fn position(&self) -> u64;

    /// Move so that the next frame read is `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decoder`] if the decoder cannot reposition.
    fn seek(&mut self, frame: u64) -> Result<()>;
}

/// Opens video files for playback.
pub trait VideoOpener: Send + Sync {
    /// Open `path` positioned at its first frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decoder`] if the file cannot be opened.
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>>;
}

/// Where live frames are shown.
pub trait Preview: Send + Sync {
    /// Display `frame` in the view called `label`.
    fn show(&self, label: &str, frame: &Frame);

    /// The view called `label` will receive no more frames.
    fn close(&self, _label: &str) {}
}

/// A preview that discards frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPreview;

impl Preview for NullPreview {
    fn show(&self, _label: &str, _frame: &Frame) {}
}

/// A preview that keeps the latest frame of each view as a PNG file.
///
/// Only every `every`-th frame is written.
#[derive(Debug)]
pub struct SnapshotPreview {
    dir: PathBuf,
    every: u64,
    counters: Mutex<HashMap<String, u64>>,
}

impl SnapshotPreview {
    /// Write snapshots into `dir`, one file per view.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            dir: dir.into(),
            every: every.max(1),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// The file that holds the latest frame of `label`.
    #[must_use]
    pub fn snapshot_path(&self, label: &str) -> PathBuf {
        let stem: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        self.dir.join(format!("{stem}.png"))
    }

    fn due(&self, label: &str) -> bool {
        let Ok(mut counters) = self.counters.lock() else {
            return false;
        };
        let count = counters.entry(label.to_string()).or_insert(0);
        let due = *count % self.every == 0;
        *count += 1;
        due
    }
}

impl Preview for SnapshotPreview {
    fn show(&self, label: &str, frame: &Frame) {
        if !self.due(label) {
            return;
        }
        if let Err(err) = std::fs::create_dir_all(&self.dir) {
            debug!("Preview directory {} unavailable: {err}", self.dir.display());
            return;
        }
        let path = self.snapshot_path(label);
        if let Err(err) = frame.save(&path) {
            debug!("Failed to write preview {}: {err}", path.display());
        }
    }

    fn close(&self, label: &str) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.remove(label);
        }
    }
}
