//! Multi-camera recording.
//!
//! [`RecordingSupervisor`] owns at most one recording session. A session is
//! one OS thread per camera that opened successfully; each thread owns its
//! device and encoder exclusively and shares nothing with its siblings
//! except a cancellation token derived from the session's token.
//!
//! Stopping is cooperative: the session token is cancelled, every thread
//! notices between two frame reads, releases its handles and returns a
//! [`UnitReport`]. `stop` returns only after every thread has been joined.

pub mod layout;
pub mod overlay;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};

use crate::error::{Error, Result};
use crate::media::{CameraBackend, EncoderFactory, FrameSource, Preview, VideoFormat};

/// How a camera's unit of work ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Stopped on request.
    Stopped,
    /// The device reported the end of its stream.
    DeviceEnded,
    /// Reading from the device failed.
    DeviceLost(String),
    /// Output could not be set up or written.
    Failed(String),
}

impl UnitOutcome {
    /// Whether the unit ended because something went wrong.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::DeviceLost(_) | Self::Failed(_))
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::DeviceEnded => write!(f, "device stopped delivering frames"),
            Self::DeviceLost(reason) => write!(f, "device lost: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Summary of one camera's recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// One-based camera number.
    pub camera: usize,
    /// The recording file, if one was started.
    pub output: Option<PathBuf>,
    /// Frames handed to the encoder.
    pub frames_written: u64,
    /// Why the unit ended.
    pub outcome: UnitOutcome,
}

/// Which cameras a start request brought up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    /// One-based numbers of the cameras now recording.
    pub started: Vec<usize>,
    /// One-based numbers of the cameras that could not be opened, with the reason.
    pub skipped: Vec<(usize, String)>,
}

impl StartReport {
    /// Whether no camera is recording.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
    }
}

/// Live status of one camera in the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitStatus {
    /// One-based camera number.
    pub camera: usize,
    /// Whether its thread is still running.
    pub running: bool,
}

struct CameraUnit {
    camera: usize,
    handle: JoinHandle<UnitReport>,
}

impl fmt::Debug for CameraUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraUnit")
            .field("camera", &self.camera)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

/// The set of camera threads started by one `start` call.
#[derive(Debug)]
pub struct RecordingSession {
    token: CancellationToken,
    units: Vec<CameraUnit>,
    output_root: PathBuf,
    started_at: DateTime<Local>,
}

impl RecordingSession {
    /// Where recordings of this session are written.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// When the session started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Per-camera running state.
    #[must_use]
    pub fn status(&self) -> Vec<UnitStatus> {
        self.units
            .iter()
            .map(|unit| UnitStatus {
                camera: unit.camera,
                running: !unit.handle.is_finished(),
            })
            .collect()
    }

    /// Cancel every unit and wait for all of them to release their handles.
    #[must_use]
    pub fn stop(self) -> Vec<UnitReport> {
        self.token.cancel();
        self.units
            .into_iter()
            .map(|unit| match unit.handle.join() {
                Ok(report) => report,
                Err(_) => {
                    error!(camera = unit.camera, "Camera thread panicked");
                    UnitReport {
                        camera: unit.camera,
                        output: None,
                        frames_written: 0,
                        outcome: UnitOutcome::Failed("thread panicked".to_string()),
                    }
                }
            })
            .collect()
    }
}

/// Starts and stops recording sessions.
pub struct RecordingSupervisor {
    backend: Arc<dyn CameraBackend>,
    encoders: Arc<dyn EncoderFactory>,
    preview: Arc<dyn Preview>,
    format: VideoFormat,
    active: Option<RecordingSession>,
}

impl fmt::Debug for RecordingSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSupervisor")
            .field("backend", &self.backend.name())
            .field("format", &self.format)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl RecordingSupervisor {
    /// Create a supervisor recording at `format` through the given backends.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        encoders: Arc<dyn EncoderFactory>,
        preview: Arc<dyn Preview>,
        format: VideoFormat,
    ) -> Self {
        Self {
            backend,
            encoders,
            preview,
            format,
            active: None,
        }
    }

    /// Whether a session is active.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// The active session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&RecordingSession> {
        self.active.as_ref()
    }

    /// Per-camera status of the active session; empty when idle.
    #[must_use]
    pub fn status(&self) -> Vec<UnitStatus> {
        self.active
            .as_ref()
            .map(RecordingSession::status)
            .unwrap_or_default()
    }

    /// Start recording from devices `0..device_count` into `output_root`.
    ///
    /// Any active session is stopped first. Devices that fail to open are
    /// skipped; if none opens the returned report is empty and no session
    /// is active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `device_count` is zero.
    pub fn start(&mut self, output_root: &Path, device_count: usize) -> Result<StartReport> {
        if device_count == 0 {
            return Err(Error::invalid_argument(
                "device_count",
                "at least one camera must be requested",
            ));
        }

        let previous = self.stop();
        if !previous.is_empty() {
            info!("Stopped previous session ({} cameras)", previous.len());
        }

        let token = CancellationToken::new();
        let mut report = StartReport::default();
        let mut units = Vec::new();

        for index in 0..device_count {
            let camera = index + 1;
            let source = match self.backend.open(index) {
                Ok(source) => source,
                Err(err) => {
                    debug!(camera, "Camera not available, skipping: {err}");
                    report.skipped.push((camera, err.to_string()));
                    continue;
                }
            };

            let unit = UnitContext {
                camera,
                source,
                encoders: Arc::clone(&self.encoders),
                preview: Arc::clone(&self.preview),
                format: self.format,
                output_root: output_root.to_path_buf(),
                token: token.child_token(),
            };
            match thread::Builder::new()
                .name(format!("camera-{camera}"))
                .spawn(move || unit.run())
            {
                Ok(handle) => {
                    units.push(CameraUnit { camera, handle });
                    report.started.push(camera);
                }
                Err(err) => {
                    error!(camera, "Failed to spawn camera thread: {err}");
                    report.skipped.push((camera, err.to_string()));
                }
            }
        }

        if units.is_empty() {
            warn!("No cameras available");
            return Ok(report);
        }

        info!(
            "Recording {} camera(s) into {}",
            units.len(),
            output_root.display()
        );
        self.active = Some(RecordingSession {
            token,
            units,
            output_root: output_root.to_path_buf(),
            started_at: Local::now(),
        });
        Ok(report)
    }

    /// Stop the active session, blocking until every camera has released
    /// its handles. Returns the per-camera reports; empty when idle.
    pub fn stop(&mut self) -> Vec<UnitReport> {
        match self.active.take() {
            Some(session) => {
                let reports = session.stop();
                info!("Recording stopped ({} cameras)", reports.len());
                reports
            }
            None => Vec::new(),
        }
    }
}

impl Drop for RecordingSupervisor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Everything one camera thread owns.
struct UnitContext {
    camera: usize,
    source: Box<dyn FrameSource>,
    encoders: Arc<dyn EncoderFactory>,
    preview: Arc<dyn Preview>,
    format: VideoFormat,
    output_root: PathBuf,
    token: CancellationToken,
}

impl UnitContext {
    fn run(self) -> UnitReport {
        let span = info_span!("camera", camera = self.camera);
        let _guard = span.enter();

        let Self {
            camera,
            mut source,
            encoders,
            preview,
            format,
            output_root,
            token,
        } = self;
        let label = format!("Camera {camera}");
        let started = Local::now();
        let clock = Instant::now();

        let failed = |output: Option<PathBuf>, err: &Error| {
            error!("{err}");
            UnitReport {
                camera,
                output,
                frames_written: 0,
                outcome: UnitOutcome::Failed(err.to_string()),
            }
        };

        let path = match layout::prepare_output(&output_root, &started, camera) {
            Ok(path) => path,
            Err(err) => return failed(None, &err),
        };
        let mut encoder = match encoders.create(&path, format) {
            Ok(encoder) => encoder,
            Err(err) => return failed(Some(path), &err),
        };
        info!("Recording to {}", path.display());

        let mut frames_written = 0_u64;
        let mut outcome = loop {
            if token.is_cancelled() {
                break UnitOutcome::Stopped;
            }
            match source.read_frame() {
                Ok(Some(raw)) => {
                    let mut frame = overlay::prepare(&raw, format);
                    overlay::stamp(&mut frame, &Local::now(), clock.elapsed().as_secs());
                    if let Err(err) = encoder.write_frame(&frame) {
                        error!("{err}");
                        break UnitOutcome::Failed(err.to_string());
                    }
                    frames_written += 1;
                    preview.show(&label, &frame);
                }
                Ok(None) => {
                    info!("Camera stopped delivering frames");
                    break UnitOutcome::DeviceEnded;
                }
                Err(err) => {
                    warn!("Failed to capture frame: {err}");
                    break UnitOutcome::DeviceLost(err.to_string());
                }
            }
        };

        drop(source);
        if let Err(err) = encoder.finish() {
            error!("{err}");
            if !outcome.is_failure() {
                outcome = UnitOutcome::Failed(err.to_string());
            }
        }
        preview.close(&label);
        debug!("Released camera after {frames_written} frames ({outcome})");

        UnitReport {
            camera,
            output: Some(path),
            frames_written,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_outcome_display() {
        assert_eq!(UnitOutcome::Stopped.to_string(), "stopped");
        assert!(UnitOutcome::DeviceLost("unplugged".to_string())
            .to_string()
            .contains("unplugged"));
        assert!(UnitOutcome::Failed("disk full".to_string())
            .to_string()
            .contains("disk full"));
    }

    #[test]
    fn test_unit_outcome_is_failure() {
        assert!(!UnitOutcome::Stopped.is_failure());
        assert!(!UnitOutcome::DeviceEnded.is_failure());
        assert!(UnitOutcome::DeviceLost(String::new()).is_failure());
        assert!(UnitOutcome::Failed(String::new()).is_failure());
    }

    #[test]
    fn test_start_report_is_empty() {
        let mut report = StartReport::default();
        assert!(report.is_empty());
        report.skipped.push((1, "busy".to_string()));
        assert!(report.is_empty());
        report.started.push(2);
        assert!(!report.is_empty());
    }
}
