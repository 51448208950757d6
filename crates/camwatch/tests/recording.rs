//! Recording supervisor behaviour against in-memory cameras and encoders.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;

use camwatch::media::{
    CameraBackend, EncoderFactory, Frame, FrameSource, NullPreview, VideoEncoder, VideoFormat,
};
use camwatch::recording::layout;
use camwatch::{Error, RecordingSupervisor, Result, UnitOutcome};

#[derive(Debug, Default)]
struct Handles {
    sources: AtomicUsize,
    encoders: AtomicUsize,
    peak_sources: AtomicUsize,
    wrong_size: AtomicUsize,
}

impl Handles {
    fn live_sources(&self) -> usize {
        self.sources.load(Ordering::SeqCst)
    }

    fn live_encoders(&self) -> usize {
        self.encoders.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Endless,
    EndsAfter(u64),
    FailsAfter(u64),
}

struct FakeSource {
    behaviour: Behaviour,
    read: u64,
    handles: Arc<Handles>,
}

impl FrameSource for FakeSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        thread::sleep(Duration::from_millis(2));
        match self.behaviour {
            Behaviour::EndsAfter(n) if self.read >= n => return Ok(None),
            Behaviour::FailsAfter(n) if self.read >= n => {
                return Err(Error::device_unavailable(0, "unplugged"))
            }
            _ => {}
        }
        self.read += 1;
        Ok(Some(Frame::new(320, 240)))
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.handles.sources.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeBackend {
    devices: Vec<(usize, Behaviour)>,
    handles: Arc<Handles>,
}

impl CameraBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn open(&self, index: usize) -> Result<Box<dyn FrameSource>> {
        let behaviour = self
            .devices
            .iter()
            .find(|(device, _)| *device == index)
            .map(|(_, behaviour)| *behaviour)
            .ok_or_else(|| Error::device_unavailable(index, "no such device"))?;
        let live = self.handles.sources.fetch_add(1, Ordering::SeqCst) + 1;
        self.handles.peak_sources.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeSource {
            behaviour,
            read: 0,
            handles: Arc::clone(&self.handles),
        }))
    }
}

struct FakeEncoder {
    format: VideoFormat,
    handles: Arc<Handles>,
}

impl VideoEncoder for FakeEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.format.width, self.format.height) {
            self.handles.wrong_size.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl Drop for FakeEncoder {
    fn drop(&mut self) {
        self.handles.encoders.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeEncoders {
    failing_camera: Option<usize>,
    handles: Arc<Handles>,
}

impl EncoderFactory for FakeEncoders {
    fn create(&self, path: &Path, format: VideoFormat) -> Result<Box<dyn VideoEncoder>> {
        if let Some(camera) = self.failing_camera {
            let prefix = format!("camera{camera}_");
            let name = path.file_name().unwrap().to_string_lossy();
            if name.starts_with(&prefix) {
                return Err(Error::encoder(path, "codec unavailable"));
            }
        }
        std::fs::write(path, b"")?;
        self.handles.encoders.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEncoder {
            format,
            handles: Arc::clone(&self.handles),
        }))
    }
}

fn supervisor(
    devices: &[(usize, Behaviour)],
    failing_camera: Option<usize>,
) -> (RecordingSupervisor, Arc<Handles>) {
    let handles = Arc::new(Handles::default());
    let supervisor = RecordingSupervisor::new(
        Arc::new(FakeBackend {
            devices: devices.to_vec(),
            handles: Arc::clone(&handles),
        }),
        Arc::new(FakeEncoders {
            failing_camera,
            handles: Arc::clone(&handles),
        }),
        Arc::new(NullPreview),
        VideoFormat::default(),
    );
    (supervisor, handles)
}

fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn recordings(root: &Path, camera: usize) -> Vec<PathBuf> {
    let dir = layout::camera_dir(root, &Local::now(), camera);
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "avi"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn test_records_only_available_devices() {
    let root = tempfile::tempdir().unwrap();
    let (mut supervisor, handles) =
        supervisor(&[(0, Behaviour::Endless), (2, Behaviour::Endless)], None);

    let report = supervisor.start(root.path(), 4).unwrap();
    assert_eq!(report.started, vec![1, 3]);
    let skipped: HashSet<usize> = report.skipped.iter().map(|(camera, _)| *camera).collect();
    assert_eq!(skipped, HashSet::from([2, 4]));
    assert!(supervisor.is_recording());

    wait_until(|| handles.live_encoders() == 2);
    let reports = supervisor.stop();

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.outcome, UnitOutcome::Stopped);
        assert!(report.output.as_ref().unwrap().exists());
    }
    assert_eq!(recordings(root.path(), 1).len(), 1);
    assert_eq!(recordings(root.path(), 3).len(), 1);
    assert!(recordings(root.path(), 2).is_empty());
    assert!(recordings(root.path(), 4).is_empty());
}

#[test]
fn test_stop_releases_every_handle() {
    let root = tempfile::tempdir().unwrap();
    let devices: Vec<_> = (0..3).map(|index| (index, Behaviour::Endless)).collect();
    let (mut supervisor, handles) = supervisor(&devices, None);

    supervisor.start(root.path(), 3).unwrap();
    wait_until(|| handles.live_encoders() == 3);
    assert_eq!(handles.live_sources(), 3);

    let reports = supervisor.stop();
    assert_eq!(reports.len(), 3);
    assert_eq!(handles.live_sources(), 0);
    assert_eq!(handles.live_encoders(), 0);
    assert!(!supervisor.is_recording());
    assert!(supervisor.stop().is_empty());
}

#[test]
fn test_restart_stops_previous_session_first() {
    let root = tempfile::tempdir().unwrap();
    let devices: Vec<_> = (0..2).map(|index| (index, Behaviour::Endless)).collect();
    let (mut supervisor, handles) = supervisor(&devices, None);

    supervisor.start(root.path(), 2).unwrap();
    wait_until(|| handles.live_encoders() == 2);
    supervisor.start(root.path(), 2).unwrap();
    wait_until(|| handles.live_encoders() == 2);

    assert_eq!(handles.live_sources(), 2);
    assert_eq!(handles.peak_sources.load(Ordering::SeqCst), 2);
    assert_eq!(supervisor.stop().len(), 2);
}

#[test]
fn test_frames_are_resized_to_recording_format() {
    let root = tempfile::tempdir().unwrap();
    let (mut supervisor, handles) = supervisor(&[(0, Behaviour::EndsAfter(5))], None);

    supervisor.start(root.path(), 1).unwrap();
    wait_until(|| supervisor.status().iter().all(|unit| !unit.running));
    let reports = supervisor.stop();

    assert_eq!(reports[0].frames_written, 5);
    assert_eq!(handles.wrong_size.load(Ordering::SeqCst), 0);
}

#[test]
fn test_device_end_only_stops_its_own_unit() {
    let root = tempfile::tempdir().unwrap();
    let (mut supervisor, handles) = supervisor(
        &[(0, Behaviour::EndsAfter(3)), (1, Behaviour::Endless)],
        None,
    );

    supervisor.start(root.path(), 2).unwrap();
    wait_until(|| {
        let status = supervisor.status();
        !status[0].running && status[1].running
    });
    assert_eq!(handles.live_sources(), 1);

    let reports = supervisor.stop();
    assert_eq!(reports[0].outcome, UnitOutcome::DeviceEnded);
    assert_eq!(reports[0].frames_written, 3);
    assert_eq!(reports[1].outcome, UnitOutcome::Stopped);
}

#[test]
fn test_device_failure_is_reported_as_lost() {
    let root = tempfile::tempdir().unwrap();
    let (mut supervisor, handles) = supervisor(
        &[(0, Behaviour::Endless), (1, Behaviour::FailsAfter(2))],
        None,
    );

    supervisor.start(root.path(), 2).unwrap();
    wait_until(|| handles.live_sources() == 1);

    let reports = supervisor.stop();
    assert_eq!(reports[0].outcome, UnitOutcome::Stopped);
    assert!(matches!(reports[1].outcome, UnitOutcome::DeviceLost(_)));
    assert_eq!(reports[1].frames_written, 2);
}

#[test]
fn test_encoder_failure_ends_only_that_unit() {
    let root = tempfile::tempdir().unwrap();
    let (mut supervisor, handles) = supervisor(
        &[(0, Behaviour::Endless), (1, Behaviour::Endless)],
        Some(2),
    );

    supervisor.start(root.path(), 2).unwrap();
    wait_until(|| handles.live_sources() == 1 && handles.live_encoders() == 1);

    let reports = supervisor.stop();
    assert_eq!(reports[0].outcome, UnitOutcome::Stopped);
    assert!(matches!(reports[1].outcome, UnitOutcome::Failed(_)));
    assert_eq!(reports[1].frames_written, 0);
    assert!(recordings(root.path(), 2).is_empty());
}

#[test]
fn test_unwritable_root_fails_units() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-folder");
    std::fs::write(&blocker, "x").unwrap();
    let (mut supervisor, handles) = supervisor(&[(0, Behaviour::Endless)], None);

    supervisor.start(&blocker, 1).unwrap();
    wait_until(|| handles.live_sources() == 0);

    let reports = supervisor.stop();
    assert!(matches!(reports[0].outcome, UnitOutcome::Failed(_)));
    assert_eq!(reports[0].output, None);
}

#[test]
fn test_no_devices_is_not_an_error() {
    let root = tempfile::tempdir().unwrap();
    let (mut supervisor, _) = supervisor(&[], None);

    let report = supervisor.start(root.path(), 4).unwrap();
    assert!(report.is_empty());
    assert_eq!(report.skipped.len(), 4);
    assert!(!supervisor.is_recording());
}

#[test]
fn test_zero_device_count_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let (mut supervisor, _) = supervisor(&[(0, Behaviour::Endless)], None);

    let err = supervisor.start(root.path(), 0).unwrap_err();
    assert!(err.is_input_error());
}

#[test]
fn test_dropping_supervisor_releases_handles() {
    let root = tempfile::tempdir().unwrap();
    let (mut supervisor, handles) = supervisor(&[(0, Behaviour::Endless)], None);

    supervisor.start(root.path(), 1).unwrap();
    wait_until(|| handles.live_encoders() == 1);
    drop(supervisor);

    assert_eq!(handles.live_sources(), 0);
    assert_eq!(handles.live_encoders(), 0);
}
