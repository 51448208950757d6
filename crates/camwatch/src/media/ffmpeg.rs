//! ffmpeg-backed capture, encoding and decoding.
//!
//! Every stream is a child process exchanging raw RGB24 frames over a pipe:
//! capture devices and video files are decoded by `ffmpeg ... -f rawvideo -`,
//! recordings are encoded by feeding `ffmpeg -f rawvideo -i -`. Stream
//! properties come from `ffprobe` JSON output.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    CameraBackend, EncoderFactory, Frame, FrameSource, VideoEncoder, VideoFormat, VideoInfo,
    VideoOpener, VideoSource,
};
use crate::config::{CameraConfig, Config};
use crate::error::{Error, Result};

/// A child process writing raw RGB24 frames of a fixed size to stdout.
struct RawFramePipe {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl RawFramePipe {
    fn spawn(mut command: Command, width: u32, height: u32) -> std::io::Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::new(ErrorKind::BrokenPipe, "no stdout pipe"))?;
        Ok(Self {
            child,
            stdout,
            width,
            height,
        })
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// `Ok(None)` once the process closes its output.
    fn read_frame(&mut self) -> std::io::Result<Option<Frame>> {
        let mut buf = vec![0_u8; self.frame_len()];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        }
        Frame::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidData, "short frame buffer"))
    }

    /// Reap the process once its output has closed. `Some` describes a
    /// failed exit.
    fn exit_failure(&mut self) -> Option<String> {
        match self.child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(format!("ffmpeg exited with {status}")),
            Err(err) => Some(format!("could not reap ffmpeg: {err}")),
        }
    }
}

impl Drop for RawFramePipe {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn size_arg(width: u32, height: u32) -> String {
    format!("{width}x{height}")
}

fn quiet_ffmpeg(ffmpeg: &Path) -> Command {
    let mut command = Command::new(ffmpeg);
    command.args(["-hide_banner", "-nostdin", "-loglevel", "error"]);
    command
}

/// Capture devices read through an ffmpeg input device (`v4l2`,
/// `avfoundation`, `dshow`).
#[derive(Debug, Clone)]
pub struct FfmpegCamera {
    camera: CameraConfig,
    format: VideoFormat,
}

impl FfmpegCamera {
    /// Build from the `[camera]` and `[recording]` configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            camera: config.camera.clone(),
            format: config.video_format(),
        }
    }
}

impl CameraBackend for FfmpegCamera {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open(&self, index: usize) -> Result<Box<dyn FrameSource>> {
        let device = self.camera.device_name(index);
        let size = size_arg(self.format.width, self.format.height);
        let mut command = quiet_ffmpeg(&self.camera.ffmpeg);
        command
            .args(["-f", &self.camera.input_format, "-i", &device])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s", &size, "-"]);

        debug!("Opening camera {index} via {} {device}", self.camera.input_format);
        let mut pipe = RawFramePipe::spawn(command, self.format.width, self.format.height)
            .map_err(|err| {
                Error::device_unavailable(
                    index,
                    format!("failed to launch {}: {err}", self.camera.ffmpeg.display()),
                )
            })?;

        // A device only counts as available once it has produced a frame.
        match pipe.read_frame() {
            Ok(Some(first)) => Ok(Box::new(CameraStream {
                index,
                pipe,
                pending: Some(first),
            })),
            Ok(None) => Err(Error::device_unavailable(
                index,
                pipe.exit_failure()
                    .unwrap_or_else(|| "device produced no frames".to_string()),
            )),
            Err(err) => Err(Error::device_unavailable(index, err.to_string())),
        }
    }
}

/// An open capture device.
struct CameraStream {
    index: usize,
    pipe: RawFramePipe,
    pending: Option<Frame>,
}

impl FrameSource for CameraStream {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        match self.pipe.read_frame() {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => match self.pipe.exit_failure() {
                Some(reason) => Err(Error::device_unavailable(self.index, reason)),
                None => Ok(None),
            },
            Err(err) => Err(Error::device_unavailable(self.index, err.to_string())),
        }
    }
}

/// Encoders writing XVID/MPEG-4 AVI files through ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    ffmpeg: PathBuf,
}

impl FfmpegEncoderFactory {
    /// Use the given ffmpeg executable.
    #[must_use]
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn create(&self, path: &Path, format: VideoFormat) -> Result<Box<dyn VideoEncoder>> {
        let size = size_arg(format.width, format.height);
        let rate = format.fps.to_string();
        let mut command = quiet_ffmpeg(&self.ffmpeg);
        command
            .args(["-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &size, "-r", &rate, "-i", "-"])
            .args(["-c:v", "mpeg4", "-vtag", "XVID", "-q:v", "5"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = command
            .spawn()
            .map_err(|err| Error::encoder(path, format!("failed to launch ffmpeg: {err}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::encoder(path, "no stdin pipe"))?;

        debug!("Encoder started for {}", path.display());
        Ok(Box::new(FfmpegEncoder {
            path: path.to_path_buf(),
            format,
            child: Some(child),
            stdin: Some(stdin),
        }))
    }
}

struct FfmpegEncoder {
    path: PathBuf,
    format: VideoFormat,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl VideoEncoder for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.format.width, self.format.height) {
            return Err(Error::encoder(
                &self.path,
                format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.format.width,
                    self.format.height
                ),
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::encoder(&self.path, "encoder already finished"))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|err| Error::encoder(&self.path, err.to_string()))
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|err| Error::encoder(&self.path, err.to_string()))?;
        if status.success() {
            debug!("Encoder finished {}", self.path.display());
            Ok(())
        } else {
            Err(Error::encoder(&self.path, format!("ffmpeg exited with {status}")))
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.wait() {
                warn!("Encoder for {} did not exit cleanly: {err}", self.path.display());
            }
        }
    }
}

/// Video files decoded through ffmpeg and probed with ffprobe.
#[derive(Debug, Clone)]
pub struct FfmpegVideoOpener {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    fallback_fps: f64,
}

impl FfmpegVideoOpener {
    /// Build from the `[camera]` and `[playback]` configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg: config.camera.ffmpeg.clone(),
            ffprobe: config.playback.ffprobe.clone(),
            fallback_fps: config.playback.fallback_fps,
        }
    }

    fn probe(&self, path: &Path) -> Result<VideoInfo> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0", "-count_packets"])
            .args([
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,nb_read_packets",
            ])
            .args(["-of", "json"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| Error::decoder(path, format!("failed to launch ffprobe: {err}")))?;
        if !output.status.success() {
            return Err(Error::decoder(
                path,
                format!("could not open video file ({})", output.status),
            ));
        }
        let json = String::from_utf8_lossy(&output.stdout);
        parse_probe(&json, self.fallback_fps).map_err(|message| Error::decoder(path, message))
    }
}

impl VideoOpener for FfmpegVideoOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>> {
        let info = self.probe(path)?;
        debug!(
            "Opened {} ({}x{}, {:.2} fps, {} frames)",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.total_frames
        );
        let mut video = FfmpegVideo {
            path: path.to_path_buf(),
            ffmpeg: self.ffmpeg.clone(),
            info,
            pipe: None,
            position: 0,
        };
        video.restart()?;
        Ok(Box::new(video))
    }
}

struct FfmpegVideo {
    path: PathBuf,
    ffmpeg: PathBuf,
    info: VideoInfo,
    pipe: Option<RawFramePipe>,
    position: u64,
}

impl FfmpegVideo {
    /// Start a decoder at the current position.
    fn restart(&mut self) -> Result<()> {
        self.pipe = None;
        #[allow(clippy::cast_precision_loss)]
        let start = self.position as f64 / self.info.fps;
        let mut command = quiet_ffmpeg(&self.ffmpeg);
        if self.position > 0 {
            command.args(["-ss", &format!("{start:.3}")]);
        }
        command
            .arg("-i")
            .arg(&self.path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"]);
        let pipe = RawFramePipe::spawn(command, self.info.width, self.info.height)
            .map_err(|err| Error::decoder(&self.path, format!("failed to launch ffmpeg: {err}")))?;
        self.pipe = Some(pipe);
        Ok(())
    }
}

impl FrameSource for FfmpegVideo {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.pipe.is_none() {
            self.restart()?;
        }
        let Some(pipe) = self.pipe.as_mut() else {
            return Ok(None);
        };
        match pipe.read_frame() {
            Ok(Some(frame)) => {
                self.position += 1;
                Ok(Some(frame))
            }
            Ok(None) => match pipe.exit_failure() {
                Some(reason) => Err(Error::decoder(&self.path, reason)),
                None => Ok(None),
            },
            Err(err) => Err(Error::decoder(&self.path, err.to_string())),
        }
    }
}

impl VideoSource for FfmpegVideo {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        self.position = frame;
        self.restart()
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

/// Parse `ffprobe -of json` output for the first video stream.
///
/// A missing or zero frame rate falls back to `fallback_fps`; a missing
/// frame count becomes 0.
///
/// # Errors
///
/// Returns a description of the problem if the output has no usable
/// video stream.
pub fn parse_probe(json: &str, fallback_fps: f64) -> std::result::Result<VideoInfo, String> {
    let output: ProbeOutput =
        serde_json::from_str(json).map_err(|err| format!("unreadable ffprobe output: {err}"))?;
    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;
    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err("video stream has no frame size".to_string());
    };
    if width == 0 || height == 0 {
        return Err(format!("invalid frame size {width}x{height}"));
    }

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(fallback_fps);
    let total_frames = stream
        .nb_read_packets
        .as_deref()
        .or(stream.nb_frames.as_deref())
        .and_then(|count| count.parse().ok())
        .unwrap_or(0);

    Ok(VideoInfo {
        fps,
        total_frames,
        width,
        height,
    })
}

/// Parse an ffprobe rational such as `30000/1001`. Zero rates are `None`.
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    let value = num / den;
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert_eq!(parse_rate("25"), Some(25.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("0/1"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe() {
        let json = r#"{
            "programs": [],
            "streams": [{
                "width": 640,
                "height": 480,
                "r_frame_rate": "20/1",
                "avg_frame_rate": "20/1",
                "nb_frames": "400",
                "nb_read_packets": "401"
            }]
        }"#;
        let info = parse_probe(json, 30.0).unwrap();
        assert_eq!(info.width, 640);
        assert_eq!(info.height, 480);
        assert!((info.fps - 20.0).abs() < f64::EPSILON);
        assert_eq!(info.total_frames, 401);
    }

    #[test]
    fn test_parse_probe_falls_back() {
        let json = r#"{"streams": [{"width": 320, "height": 240, "avg_frame_rate": "0/0"}]}"#;
        let info = parse_probe(json, 30.0).unwrap();
        assert!((info.fps - 30.0).abs() < f64::EPSILON);
        assert_eq!(info.total_frames, 0);
    }

    #[test]
    fn test_parse_probe_without_stream() {
        assert!(parse_probe(r#"{"streams": []}"#, 30.0).is_err());
        assert!(parse_probe("{}", 30.0).is_err());
        assert!(parse_probe("garbage", 30.0).is_err());
    }

    #[test]
    fn test_parse_probe_without_size() {
        let json = r#"{"streams": [{"avg_frame_rate": "25/1"}]}"#;
        assert!(parse_probe(json, 30.0).is_err());
    }


    #[test]
    fn test_missing_ffmpeg_reports_unavailable_device() {
        let mut config = Config::default();
        config.camera.ffmpeg = PathBuf::from("/nonexistent/ffmpeg-binary");
        let camera = FfmpegCamera::from_config(&config);

        match camera.open(0) {
            Err(Error::DeviceUnavailable { index, .. }) => assert_eq!(index, 0),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a camera without ffmpeg"),
        }
    }

    #[test]
    fn test_missing_ffprobe_reports_decoder_error() {
        let mut config = Config::default();
        config.playback.ffprobe = PathBuf::from("/nonexistent/ffprobe-binary");
        let opener = FfmpegVideoOpener::from_config(&config);

        assert!(matches!(
            opener.open(Path::new("/tmp/video.avi")),
            Err(Error::Decoder { .. })
        ));
    }

    /// One 2x2 RGB24 frame with every byte set to `byte`.
    #[cfg(unix)]
    fn frame_bytes(byte: char) -> String {
        byte.to_string().repeat(12)
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn scripted_camera(dir: &Path, body: &str) -> FfmpegCamera {
        let mut config = Config::default();
        config.camera.ffmpeg = script(dir, "ffmpeg", body);
        config.recording.width = 2;
        config.recording.height = 2;
        FfmpegCamera::from_config(&config)
    }

    #[cfg(unix)]
    fn scripted_opener(dir: &Path, ffmpeg_body: &str) -> FfmpegVideoOpener {
        let streams = r#"{"streams":[{"width":2,"height":2,"avg_frame_rate":"10/1","nb_read_packets":"3"}]}"#;
        let mut config = Config::default();
        config.camera.ffmpeg = script(dir, "ffmpeg", ffmpeg_body);
        config.playback.ffprobe = script(dir, "ffprobe", &format!("printf '%s' '{streams}'"));
        FfmpegVideoOpener::from_config(&config)
    }

    #[cfg(unix)]
    fn first_byte(frame: &Frame) -> u8 {
        frame.as_raw()[0]
    }

    #[cfg(unix)]
    #[test]
    fn test_camera_replays_first_frame_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("printf '{}{}'", frame_bytes('A'), frame_bytes('B'));
        let mut stream = scripted_camera(dir.path(), &body).open(0).unwrap();

        assert_eq!(first_byte(&stream.read_frame().unwrap().unwrap()), b'A');
        assert_eq!(first_byte(&stream.read_frame().unwrap().unwrap()), b'B');
        assert!(stream.read_frame().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_camera_crash_is_a_device_failure() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("printf '{}'\nexit 1", frame_bytes('A'));
        let camera = scripted_camera(dir.path(), &body);

        for _ in 0..10 {
            let mut stream = camera.open(3).unwrap();
            assert!(stream.read_frame().unwrap().is_some());
            match stream.read_frame() {
                Err(Error::DeviceUnavailable { index, message }) => {
                    assert_eq!(index, 3);
                    assert!(message.contains("exited"), "{message}");
                }
                Err(other) => panic!("unexpected error: {other}"),
                Ok(frame) => panic!("crash reported as {:?}", frame.map(|f| f.dimensions())),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_camera_without_frames_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let camera = scripted_camera(dir.path(), "exit 1");

        match camera.open(1) {
            Err(Error::DeviceUnavailable { index, message }) => {
                assert_eq!(index, 1);
                assert!(message.contains("exited"), "{message}");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a camera that produced nothing"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_video_seek_restarts_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "for arg in \"$@\"; do\n  if [ \"$arg\" = \"-ss\" ]; then printf '{}'; exit 0; fi\ndone\nprintf '{}{}'",
            frame_bytes('S'),
            frame_bytes('A'),
            frame_bytes('B')
        );
        let mut video = scripted_opener(dir.path(), &body)
            .open(&dir.path().join("clip.avi"))
            .unwrap();
        assert_eq!(video.info().total_frames, 3);

        assert_eq!(first_byte(&video.read_frame().unwrap().unwrap()), b'A');
        assert_eq!(video.position(), 1);

        video.seek(2).unwrap();
        assert_eq!(video.position(), 2);
        assert_eq!(first_byte(&video.read_frame().unwrap().unwrap()), b'S');
        assert_eq!(video.position(), 3);
        assert!(video.read_frame().unwrap().is_none());

        video.seek(0).unwrap();
        assert_eq!(first_byte(&video.read_frame().unwrap().unwrap()), b'A');
    }

    #[cfg(unix)]
    #[test]
    fn test_video_decoder_crash_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("printf '{}'\nexit 1", frame_bytes('A'));

        let opener = scripted_opener(dir.path(), &body);

        for _ in 0..10 {
            let mut video = opener.open(&dir.path().join("clip.avi")).unwrap();
            assert!(video.read_frame().unwrap().is_some());
            assert!(matches!(video.read_frame(), Err(Error::Decoder { .. })));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_video_clean_exit_is_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("printf '{}'", frame_bytes('A'));
        let mut video = scripted_opener(dir.path(), &body)
            .open(&dir.path().join("clip.avi"))
            .unwrap();

        assert!(video.read_frame().unwrap().is_some());
        assert!(video.read_frame().unwrap().is_none());
    }
}
