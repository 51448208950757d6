//! Number plate extraction and recognition.
//!
//! [`PlateExtractor`] finds the largest outlined region of a frame and
//! crops it. [`PlateReader`] runs a [`TextRecognizer`] over the crop and
//! keeps the most recent non-empty result in a single text file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use image::imageops;
use image::ImageFormat;
use imageproc::contours::{find_contours, Contour};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PlateConfig;
use crate::error::{Error, Result};
use crate::media::{Frame, FrameSource};

/// Crops the most prominent outlined region out of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateExtractor {
    blur_sigma: f32,
    canny_low: f32,
    canny_high: f32,
}

impl Default for PlateExtractor {
    fn default() -> Self {
        Self::from_config(&PlateConfig::default())
    }
}

impl PlateExtractor {
    /// Build from the `[plate]` configuration.
    #[must_use]
    pub fn from_config(config: &PlateConfig) -> Self {
        Self {
            blur_sigma: config.blur_sigma,
            canny_low: config.canny_low,
            canny_high: config.canny_high,
        }
    }

    /// Grayscale, blur, detect edges, take the outer contour enclosing the
    /// largest area and crop its bounding box out of `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoContours`] if the frame has no edges.
    pub fn extract(&self, frame: &Frame) -> Result<Frame> {
        let gray = imageops::grayscale(frame);
        let blurred = gaussian_blur_f32(&gray, self.blur_sigma);
        let edges = canny(&blurred, self.canny_low, self.canny_high);

        let largest = find_contours::<i32>(&edges)
            .into_iter()
            .filter(|contour| contour.parent.is_none() && !contour.points.is_empty())
            .max_by_key(contour_area2)
            .ok_or(Error::NoContours)?;

        let (x, y, width, height) = bounding_box(&largest);
        Ok(imageops::crop_imm(frame, x, y, width, height).to_image())
    }
}

/// Twice the area enclosed by the contour polygon (shoelace formula).
fn contour_area2(contour: &Contour<i32>) -> i64 {
    let points = &contour.points;
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    twice.abs()
}

fn bounding_box(contour: &Contour<i32>) -> (u32, u32, u32, u32) {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
    for point in &contour.points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    let x = u32::try_from(min_x).unwrap_or(0);
    let y = u32::try_from(min_y).unwrap_or(0);
    let width = u32::try_from(max_x - min_x + 1).unwrap_or(1);
    let height = u32::try_from(max_y - min_y + 1).unwrap_or(1);
    (x, y, width, height)
}

/// Turns an image of text into a string.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text in `image`. Whitespace is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognizer`] if recognition fails.
    async fn recognize(&self, image: &Frame) -> Result<String>;
}

/// Recognizes text with the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    page_segmentation_mode: u8,
}

impl TesseractRecognizer {
    /// Build from the `[plate]` configuration.
    #[must_use]
    pub fn from_config(config: &PlateConfig) -> Self {
        Self {
            binary: config.tesseract.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &Frame) -> Result<String> {
        let mut png = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "--psm"])
            .arg(self.page_segmentation_mode.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| Error::recognizer(format!("failed to launch tesseract: {err}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .await
                .map_err(|err| Error::recognizer(format!("failed to send image: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| Error::recognizer(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::recognizer(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Extracts plates from frames and records the recognized text.
pub struct PlateReader {
    extractor: PlateExtractor,
    recognizer: Arc<dyn TextRecognizer>,
    output: PathBuf,
}

impl std::fmt::Debug for PlateReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlateReader")
            .field("extractor", &self.extractor)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl PlateReader {
    /// Create a reader writing recognized text to `output`.
    #[must_use]
    pub fn new(
        extractor: PlateExtractor,
        recognizer: Arc<dyn TextRecognizer>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            extractor,
            recognizer,
            output: output.into(),
        }
    }

    /// The file holding the latest recognized text.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Extract and recognize the plate in `frame`.
    ///
    /// Non-empty text replaces the contents of the output file and is
    /// returned; empty text leaves the file alone and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoContours`] if no plate candidate is found, the
    /// recognizer's error, or an I/O error writing the output file.
    pub async fn read(&self, frame: &Frame) -> Result<Option<String>> {
        let plate = self.extractor.extract(frame)?;
        let raw = self.recognizer.recognize(&plate).await?;
        let text = raw.trim();
        if text.is_empty() {
            return Ok(None);
        }

        if let Some(parent) = self.output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&self.output, text).await?;
        info!("Number plate text: {text}");
        Ok(Some(text.to_string()))
    }

    /// Read every frame of `source` until it ends or `token` is cancelled.
    /// Frames without a plate candidate are skipped. Returns the last
    /// recognized text.
    ///
    /// Frames are read on the blocking thread pool. A read still pending
    /// at cancellation is abandoned and `source` is dropped once it returns.
    ///
    /// # Errors
    ///
    /// Returns the first source, recognizer or I/O error.
    pub async fn scan<S>(&self, mut source: S, token: &CancellationToken) -> Result<Option<String>>
    where
        S: FrameSource + 'static,
    {
        let mut last = None;
        let mut frames = 0_u64;
        while !token.is_cancelled() {
            let reading = tokio::task::spawn_blocking(move || {
                let read = source.read_frame();
                (source, read)
            });
            let (returned, read) = tokio::select! {
                () = token.cancelled() => break,
                joined = reading => joined
                    .map_err(|err| Error::internal(format!("frame reader failed: {err}")))?,
            };
            source = returned;
            let Some(frame) = read? else {
                break;
            };
            frames += 1;
            match self.read(&frame).await {
                Ok(Some(text)) => last = Some(text),
                Ok(None) => {}
                Err(Error::NoContours) => debug!(frame = frames, "No contours found, skipping"),
                Err(err) => return Err(err),
            }
        }
        debug!("Scanned {frames} frames");
        Ok(last)
    }
}

/// Load an image file as a frame.
///
/// # Errors
///
/// Returns [`Error::Image`] if the file cannot be read or decoded.
pub fn load_frame(path: &Path) -> Result<Frame> {
    Ok(image::open(path)?.to_rgb8())
}
