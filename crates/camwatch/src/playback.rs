//! Recorded video playback.
//!
//! [`PlaybackController`] is a synchronous state machine: every [`tick`]
//! decodes at most one frame and says how long to wait before the next one.
//! [`run`] drives it on the tokio runtime until the video ends or the
//! caller cancels.
//!
//! [`tick`]: PlaybackController::tick

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use image::imageops::{self, FilterType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::media::{Frame, Preview, VideoInfo, VideoOpener, VideoSource};

/// File extensions picked up as siblings for next/previous.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi"];

/// Playback speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    /// 0.25x
    Quarter,
    /// 0.5x
    Half,
    /// 1x
    #[default]
    Normal,
    /// 1.5x
    OneAndHalf,
    /// 2x
    Double,
}

impl Speed {
    /// Every supported speed, slowest first.
    pub const ALL: [Self; 5] = [
        Self::Quarter,
        Self::Half,
        Self::Normal,
        Self::OneAndHalf,
        Self::Double,
    ];

    /// The multiplier applied to the source frame rate.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Self::Quarter => 0.25,
            Self::Half => 0.5,
            Self::Normal => 1.0,
            Self::OneAndHalf => 1.5,
            Self::Double => 2.0,
        }
    }

    /// The speed with exactly this multiplier.
    #[must_use]
    pub fn from_factor(factor: f64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|speed| (speed.factor() - factor).abs() < f64::EPSILON)
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.factor())
    }
}

impl FromStr for Speed {
    type Err = Error;

    /// Accepts `1.5`, `1.5x` or `1.5X`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let number = trimmed
            .strip_suffix(['x', 'X'])
            .unwrap_or(trimmed);
        number
            .parse::<f64>()
            .ok()
            .and_then(Self::from_factor)
            .ok_or_else(|| {
                Error::invalid_argument("speed", format!("{s} is not one of 0.25, 0.5, 1, 1.5, 2"))
            })
    }
}

/// Frame magnification between 1x and 2x.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom(f64);

impl Zoom {
    /// No magnification.
    pub const MIN: f64 = 1.0;
    /// Double size.
    pub const MAX: f64 = 2.0;

    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `factor` is outside `[1.0, 2.0]`.
    pub fn new(factor: f64) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&factor) {
            Ok(Self(factor))
        } else {
            Err(Error::invalid_argument(
                "zoom",
                format!("{factor} is outside {}..={}", Self::MIN, Self::MAX),
            ))
        }
    }

    /// Map a 0..=100 slider value onto 1.0..=2.0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `percent` exceeds 100.
    pub fn from_percent(percent: u32) -> Result<Self> {
        Self::new(1.0 + f64::from(percent) / 100.0)
    }

    /// The magnification factor.
    #[must_use]
    pub fn factor(self) -> f64 {
        self.0
    }

    /// Whether frames are shown at their native size.
    #[must_use]
    pub fn is_identity(self) -> bool {
        (self.0 - 1.0).abs() < f64::EPSILON
    }

    /// Scale `frame` by this zoom.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn apply(self, frame: Frame) -> Frame {
        if self.is_identity() {
            return frame;
        }
        let width = (f64::from(frame.width()) * self.0).round() as u32;
        let height = (f64::from(frame.height()) * self.0).round() as u32;
        imageops::resize(&frame, width, height, FilterType::Triangle)
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

/// Where the player is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Frames are being decoded.
    Playing,
    /// Decoding is suspended; the position is kept.
    Paused,
    /// The last frame has been shown and the decoder released.
    Ended,
    /// Nothing is loaded.
    Stopped,
}

/// Which way a seek moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    /// Towards the start.
    Back,
    /// Towards the end.
    Forward,
}

impl FromStr for SeekDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "back" | "backward" | "left" => Ok(Self::Back),
            "forward" | "right" => Ok(Self::Forward),
            _ => Err(Error::invalid_argument(
                "seek",
                format!("{s} is not back or forward"),
            )),
        }
    }
}

/// Result of one [`PlaybackController::tick`].
#[derive(Debug)]
pub enum Tick {
    /// Show `frame`, then wait `delay` before the next tick.
    Frame {
        /// The decoded, zoomed frame.
        frame: Frame,
        /// Time until the next frame is due.
        delay: Duration,
    },
    /// The video just ended.
    Ended,
    /// Not playing; nothing decoded.
    Idle,
}

/// Milliseconds between frames at `fps` played at `speed`, rounded.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn frame_delay(fps: f64, speed: Speed) -> Duration {
    let rate = fps * speed.factor();
    if !rate.is_finite() || rate <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_millis((1000.0 / rate).round() as u64)
}

/// The frame a seek from `current` lands on: `round(fps * seek_seconds)`
/// frames away, clamped to `[0, total_frames - 1]`. An unknown length
/// (`total_frames == 0`) only clamps at the start.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn seek_target(
    current: u64,
    fps: f64,
    seek_seconds: u32,
    total_frames: u64,
    direction: SeekDirection,
) -> u64 {
    let offset = (fps * f64::from(seek_seconds)).round().max(0.0) as u64;
    let target = match direction {
        SeekDirection::Back => current.saturating_sub(offset),
        SeekDirection::Forward => current.saturating_add(offset),
    };
    match total_frames.checked_sub(1) {
        Some(last) => target.min(last),
        None => target,
    }
}

/// The `.mp4` and `.avi` files next to `path`, sorted by name.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be read.
pub fn sibling_videos(path: &Path) -> Result<Vec<PathBuf>> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut videos: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|candidate| candidate.is_file() && is_video(candidate))
        .collect();
    videos.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(videos)
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Plays one video at a time out of a folder of recordings.
pub struct PlaybackController {
    opener: Arc<dyn VideoOpener>,
    seek_seconds: u32,
    fallback_fps: f64,
    current: Option<PathBuf>,
    video: Option<Box<dyn VideoSource>>,
    info: Option<VideoInfo>,
    playlist: Vec<PathBuf>,
    state: PlaybackState,
    speed: Speed,
    zoom: Zoom,
}

impl fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("current", &self.current)
            .field("info", &self.info)
            .field("state", &self.state)
            .field("speed", &self.speed)
            .field("zoom", &self.zoom)
            .field("playlist", &self.playlist.len())
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    /// Create an idle controller.
    #[must_use]
    pub fn new(opener: Arc<dyn VideoOpener>, seek_seconds: u32, fallback_fps: f64) -> Self {
        Self {
            opener,
            seek_seconds,
            fallback_fps,
            current: None,
            video: None,
            info: None,
            playlist: Vec::new(),
            state: PlaybackState::Stopped,
            speed: Speed::default(),
            zoom: Zoom::default(),
        }
    }

    /// Create an idle controller from the `[playback]` configuration.
    #[must_use]
    pub fn from_config(opener: Arc<dyn VideoOpener>, config: &PlaybackConfig) -> Self {
        Self::new(opener, config.seek_seconds, config.fallback_fps)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Current speed.
    #[must_use]
    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Current zoom.
    #[must_use]
    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    /// The loaded video, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Videos reachable with next/previous.
    #[must_use]
    pub fn playlist(&self) -> &[PathBuf] {
        &self.playlist
    }

    /// Index of the next frame to decode; `None` when no decoder is open.
    #[must_use]
    pub fn position(&self) -> Option<u64> {
        self.video.as_ref().map(|video| video.position())
    }

    /// The frame rate used for timing and seeking.
    #[must_use]
    pub fn fps(&self) -> f64 {
        match self.info {
            Some(info) if info.fps.is_finite() && info.fps > 0.0 => info.fps,
            _ => self.fallback_fps,
        }
    }

    /// Load `path` and start playing it, replacing any current video.
    ///
    /// A folder that cannot be listed leaves the current video playing. A
    /// file that cannot be opened leaves the player `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the folder cannot be listed and
    /// [`Error::Decoder`] if the file cannot be opened.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        let playlist = sibling_videos(path)?;
        self.stop();
        let video = self.opener.open(path)?;

        info!("Playing {}", path.display());
        self.info = Some(video.info());
        self.video = Some(video);
        self.current = Some(path.to_path_buf());
        self.playlist = playlist;
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Decode the next frame if playing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decoder`] if decoding fails; the player is then
    /// `Ended` with its decoder released.
    pub fn tick(&mut self) -> Result<Tick> {
        if self.state != PlaybackState::Playing {
            return Ok(Tick::Idle);
        }
        let Some(video) = self.video.as_mut() else {
            self.state = PlaybackState::Ended;
            return Ok(Tick::Ended);
        };
        let zoom = self.zoom;
        let read = video.read_frame().map(|frame| frame.map(|frame| zoom.apply(frame)));
        self.settle(read)
    }

    /// [`tick`](Self::tick) with decoding and zooming run on the blocking
    /// thread pool.
    ///
    /// # Errors
    ///
    /// As [`tick`](Self::tick), plus [`Error::Internal`] if the decoding
    /// task panics.
    pub async fn tick_blocking(&mut self) -> Result<Tick> {
        if self.state != PlaybackState::Playing {
            return Ok(Tick::Idle);
        }
        let Some(mut video) = self.video.take() else {
            self.state = PlaybackState::Ended;
            return Ok(Tick::Ended);
        };
        let zoom = self.zoom;
        let decoded = tokio::task::spawn_blocking(move || {
            let read = video.read_frame().map(|frame| frame.map(|frame| zoom.apply(frame)));
            (video, read)
        })
        .await;

        match decoded {
            Ok((video, read)) => {
                self.video = Some(video);
                self.settle(read)
            }
            Err(err) => {
                self.finish();
                Err(Error::internal(format!("decoding task failed: {err}")))
            }
        }
    }

    /// Turn a decoder read into a tick, releasing the decoder when the
    /// video is over.
    fn settle(&mut self, read: Result<Option<Frame>>) -> Result<Tick> {
        match read {
            Ok(Some(frame)) => Ok(Tick::Frame {
                frame,
                delay: frame_delay(self.fps(), self.speed),
            }),
            Ok(None) => {
                debug!("End of video");
                self.finish();
                Ok(Tick::Ended)
            }
            Err(err) => {
                self.finish();
                Err(err)
            }
        }
    }

    fn finish(&mut self) {
        self.video = None;
        self.state = PlaybackState::Ended;
    }

    /// Pause when playing, resume when paused. Other states are unchanged.
    pub fn toggle_pause(&mut self) -> PlaybackState {
        self.state = match self.state {
            PlaybackState::Playing => PlaybackState::Paused,
            PlaybackState::Paused => PlaybackState::Playing,
            other => other,
        };
        self.state
    }

    /// Restart the current video from its first frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if nothing has been loaded, or
    /// the decoder error if the video cannot be reopened.
    pub fn replay(&mut self) -> Result<()> {
        match self.video.as_mut() {
            Some(video) => video.seek(0)?,
            None => {
                let path = self
                    .current
                    .clone()
                    .ok_or_else(|| Error::invalid_argument("video", "no video has been opened"))?;
                let video = self.opener.open(&path)?;
                self.info = Some(video.info());
                self.video = Some(video);
            }
        }
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Jump `seek_seconds` back or forward. Returns the new position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if no decoder is open, or the
    /// decoder error if it cannot reposition.
    pub fn seek(&mut self, direction: SeekDirection) -> Result<u64> {
        let fps = self.fps();
        let seek_seconds = self.seek_seconds;
        let video = self
            .video
            .as_mut()
            .ok_or_else(|| Error::invalid_argument("seek", "no video is loaded"))?;
        let target = seek_target(
            video.position(),
            fps,
            seek_seconds,
            video.info().total_frames,
            direction,
        );
        video.seek(target)?;
        debug!("Seeked {direction:?} to frame {target}");
        Ok(target)
    }

    /// Seek back for a click in the left half of a `width`-wide view,
    /// forward for the right half.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a zero width, otherwise as
    /// [`seek`](Self::seek).
    pub fn seek_at(&mut self, x: u32, width: u32) -> Result<u64> {
        if width == 0 {
            return Err(Error::invalid_argument("width", "view width must be positive"));
        }
        let direction = if u64::from(x) * 2 < u64::from(width) {
            SeekDirection::Back
        } else {
            SeekDirection::Forward
        };
        self.seek(direction)
    }

    /// Change the playback speed; takes effect on the next tick.
    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
    }

    /// Change the zoom; takes effect on the next tick.
    pub fn set_zoom(&mut self, zoom: Zoom) {
        self.zoom = zoom;
    }

    /// Open the next sibling video, wrapping to the first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if there is no playlist, or the
    /// error from [`open`](Self::open).
    pub fn next(&mut self) -> Result<PathBuf> {
        self.step(1)
    }

    /// Open the previous sibling video, wrapping to the last.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if there is no playlist, or the
    /// error from [`open`](Self::open).
    pub fn previous(&mut self) -> Result<PathBuf> {
        self.step(-1)
    }

    fn step(&mut self, offset: isize) -> Result<PathBuf> {
        let len = self.playlist.len();
        if len == 0 {
            return Err(Error::invalid_argument("video", "no videos in this folder"));
        }
        let index = self
            .current
            .as_ref()
            .and_then(|current| self.playlist.iter().position(|path| path == current));
        let target = match index {
            #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
            Some(index) => (index as isize + offset).rem_euclid(len as isize) as usize,
            None => 0,
        };
        let path = self.playlist[target].clone();
        self.open(&path)?;
        Ok(path)
    }

    /// Release the decoder and unload the video.
    pub fn stop(&mut self) {
        self.video = None;
        self.current = None;
        self.info = None;
        self.state = PlaybackState::Stopped;
    }
}

/// Play until the video ends, the player stops playing, or `token` is
/// cancelled. Returns the number of frames shown.
///
/// # Errors
///
/// Returns the decoder error that ended playback, if any.
pub async fn run(
    controller: &mut PlaybackController,
    preview: &dyn Preview,
    token: &CancellationToken,
) -> Result<u64> {
    let label = controller
        .current()
        .and_then(Path::file_name)
        .map_or_else(|| "Playback".to_string(), |name| name.to_string_lossy().into_owned());
    let mut shown = 0_u64;

    let outcome = loop {
        if token.is_cancelled() {
            break Ok(());
        }
        match controller.tick_blocking().await {
            Ok(Tick::Frame { frame, delay }) => {
                preview.show(&label, &frame);
                shown += 1;
                tokio::select! {
                    () = token.cancelled() => break Ok(()),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Ok(Tick::Ended | Tick::Idle) => break Ok(()),
            Err(err) => break Err(err),
        }
    };

    preview.close(&label);
    outcome.map(|()| shown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeVideo {
        info: VideoInfo,
        position: u64,
    }

    impl crate::media::FrameSource for FakeVideo {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if self.position >= self.info.total_frames {
                return Ok(None);
            }
            self.position += 1;
            Ok(Some(Frame::new(self.info.width, self.info.height)))
        }
    }

    impl VideoSource for FakeVideo {
        fn info(&self) -> VideoInfo {
            self.info
        }

        fn position(&self) -> u64 {
            self.position
        }

        fn seek(&mut self, frame: u64) -> Result<()> {
            self.position = frame;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeOpener {
        opened: Mutex<Vec<PathBuf>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl VideoOpener for FakeOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::decoder(path, "could not open video file"));
            }
            self.opened.lock().unwrap().push(path.to_path_buf());
            Ok(Box::new(FakeVideo {
                info: VideoInfo {
                    fps: 30.0,
                    total_frames: 900,
                    width: 4,
                    height: 2,
                },
                position: 0,
            }))
        }
    }

    fn folder(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        dir
    }

    fn controller() -> (PlaybackController, Arc<FakeOpener>) {
        let opener = Arc::new(FakeOpener::default());
        (PlaybackController::new(opener.clone(), 10, 30.0), opener)
    }

    #[test]
    fn test_frame_delay() {
        assert_eq!(frame_delay(30.0, Speed::Normal), Duration::from_millis(33));
        assert_eq!(frame_delay(30.0, Speed::Double), Duration::from_millis(17));
        assert_eq!(frame_delay(20.0, Speed::Quarter), Duration::from_millis(200));
        assert_eq!(frame_delay(0.0, Speed::Normal), Duration::ZERO);
    }

    #[test]
    fn test_double_speed_halves_delay() {
        for fps in [10.0, 20.0, 25.0, 50.0] {
            let normal = frame_delay(fps, Speed::Normal).as_millis();
            let double = frame_delay(fps, Speed::Double).as_millis();
            assert_eq!(normal, double * 2, "fps {fps}");
        }
    }

    #[test]
    fn test_seek_target_clamps() {
        assert_eq!(seek_target(5, 30.0, 10, 900, SeekDirection::Back), 0);
        assert_eq!(seek_target(400, 30.0, 10, 900, SeekDirection::Back), 100);
        assert_eq!(seek_target(400, 30.0, 10, 900, SeekDirection::Forward), 700);
        assert_eq!(seek_target(800, 30.0, 10, 900, SeekDirection::Forward), 899);
        assert_eq!(seek_target(800, 29.97, 10, 0, SeekDirection::Forward), 1100);
    }

    #[test]
    fn test_speed_parsing() {
        assert_eq!("1.5x".parse::<Speed>().unwrap(), Speed::OneAndHalf);
        assert_eq!("0.25".parse::<Speed>().unwrap(), Speed::Quarter);
        assert_eq!("2X".parse::<Speed>().unwrap(), Speed::Double);
        assert!("3x".parse::<Speed>().is_err());
        assert!("fast".parse::<Speed>().is_err());
        assert_eq!(Speed::Half.to_string(), "0.5x");
    }

    #[test]
    fn test_zoom_from_percent() {
        assert!(Zoom::from_percent(0).unwrap().is_identity());
        assert!((Zoom::from_percent(50).unwrap().factor() - 1.5).abs() < f64::EPSILON);
        assert!((Zoom::from_percent(100).unwrap().factor() - 2.0).abs() < f64::EPSILON);
        assert!(Zoom::from_percent(101).is_err());
        assert!(Zoom::new(0.5).is_err());
    }

    #[test]
    fn test_zoom_scales_both_dimensions() {
        let frame = Zoom::new(1.5).unwrap().apply(Frame::new(100, 40));
        assert_eq!(frame.dimensions(), (150, 60));
    }

    #[test]
    fn test_seek_direction_parsing() {
        assert_eq!("back".parse::<SeekDirection>().unwrap(), SeekDirection::Back);
        assert_eq!("Forward".parse::<SeekDirection>().unwrap(), SeekDirection::Forward);
        assert!("up".parse::<SeekDirection>().is_err());
    }

    #[test]
    fn test_sibling_videos_sorted_and_filtered() {
        let dir = folder(&["b.avi", "a.mp4", "notes.txt", "c.AVI"]);
        let videos = sibling_videos(&dir.path().join("a.mp4")).unwrap();
        let names: Vec<_> = videos
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.mp4", "b.avi", "c.AVI"]);
    }

    #[test]
    fn test_tick_plays_until_end() {
        let dir = folder(&["a.avi"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);

        let mut frames = 0;
        loop {
            match player.tick().unwrap() {
                Tick::Frame { delay, .. } => {
                    assert_eq!(delay, Duration::from_millis(33));
                    frames += 1;
                }
                Tick::Ended => break,
                Tick::Idle => panic!("idle while playing"),
            }
        }
        assert_eq!(frames, 900);
        assert_eq!(player.state(), PlaybackState::Ended);
        assert_eq!(player.position(), None);
        assert!(matches!(player.tick().unwrap(), Tick::Idle));
    }

    #[test]
    fn test_pause_and_resume() {
        let dir = folder(&["a.avi"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();

        assert_eq!(player.toggle_pause(), PlaybackState::Paused);
        assert!(matches!(player.tick().unwrap(), Tick::Idle));
        assert_eq!(player.position(), Some(0));
        assert_eq!(player.toggle_pause(), PlaybackState::Playing);
        assert!(matches!(player.tick().unwrap(), Tick::Frame { .. }));
    }

    #[test]
    fn test_replay_after_end_reopens() {
        let dir = folder(&["a.avi"]);
        let (mut player, opener) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        while !matches!(player.tick().unwrap(), Tick::Ended) {}

        player.replay().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.position(), Some(0));
        assert_eq!(opener.opened.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_replay_without_video_fails() {
        let (mut player, _) = controller();
        assert!(player.replay().is_err());
    }

    #[test]
    fn test_seek_at_halves() {
        let dir = folder(&["a.avi"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        for _ in 0..5 {
            player.tick().unwrap();
        }

        assert_eq!(player.seek_at(100, 640).unwrap(), 0);
        assert_eq!(player.seek_at(400, 640).unwrap(), 300);
        assert!(player.seek_at(0, 0).is_err());
    }

    #[test]
    fn test_seek_at_odd_width_midpoint() {
        let dir = folder(&["a.avi"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        player.seek(SeekDirection::Forward).unwrap();
        for _ in 0..100 {
            player.tick().unwrap();
        }
        assert_eq!(player.position(), Some(400));

        // 320.0 < 320.5: still the left half of a 641-pixel view.
        assert_eq!(player.seek_at(320, 641).unwrap(), 100);
        assert_eq!(player.seek_at(321, 641).unwrap(), 400);
        assert_eq!(player.seek_at(0, 1).unwrap(), 100);
    }

    #[test]
    fn test_open_unlistable_folder_keeps_current_video() {
        let dir = folder(&["a.avi"]);
        let (mut player, opener) = controller();
        let current = dir.path().join("a.avi");
        player.open(&current).unwrap();
        player.tick().unwrap();

        let missing = dir.path().join("gone").join("b.avi");
        assert!(matches!(player.open(&missing), Err(Error::Io(_))));

        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.current(), Some(current.as_path()));
        assert_eq!(player.position(), Some(1));
        assert_eq!(opener.opened.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_open_leaves_player_stopped() {
        let dir = folder(&["a.avi", "b.avi"]);
        let (mut player, opener) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        opener.fail.store(true, std::sync::atomic::Ordering::SeqCst);

        assert!(player.open(&dir.path().join("b.avi")).is_err());
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(player.current().is_none());
        assert!(player.position().is_none());
    }

    #[test]
    fn test_zoomed_ticks() {
        let dir = folder(&["a.avi"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        player.set_zoom(Zoom::new(2.0).unwrap());

        let Tick::Frame { frame, .. } = player.tick().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.dimensions(), (8, 4));
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let dir = folder(&["a.avi", "b.avi", "c.mp4"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("c.mp4")).unwrap();

        assert_eq!(player.next().unwrap(), dir.path().join("a.avi"));
        assert_eq!(player.previous().unwrap(), dir.path().join("c.mp4"));
        assert_eq!(player.previous().unwrap(), dir.path().join("b.avi"));
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_stop_unloads() {
        let dir = folder(&["a.avi"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        player.stop();

        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(player.current().is_none());
        assert!(player.seek(SeekDirection::Forward).is_err());
    }

    #[tokio::test]
    async fn test_tick_blocking_keeps_the_decoder() {
        let dir = folder(&["a.avi"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        player.set_zoom(Zoom::new(2.0).unwrap());

        let Tick::Frame { frame, delay } = player.tick_blocking().await.unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.dimensions(), (8, 4));
        assert_eq!(delay, Duration::from_millis(33));
        assert_eq!(player.position(), Some(1));

        player.toggle_pause();
        assert!(matches!(player.tick_blocking().await.unwrap(), Tick::Idle));
        assert_eq!(player.position(), Some(1));
    }

    #[tokio::test]
    async fn test_run_plays_to_the_end() {
        crate::logging::init_test_logging();
        let dir = folder(&["a.avi"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        player.set_speed(Speed::Double);
        for _ in 0..3 {
            player.seek(SeekDirection::Forward).unwrap();
        }
        assert_eq!(player.position(), Some(899));

        let shown = run(&mut player, &crate::media::NullPreview, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(shown, 1);
        assert_eq!(player.state(), PlaybackState::Ended);
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let dir = folder(&["a.avi"]);
        let (mut player, _) = controller();
        player.open(&dir.path().join("a.avi")).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let shown = run(&mut player, &crate::media::NullPreview, &token)
            .await
            .unwrap();
        assert_eq!(shown, 0);
        assert_eq!(player.state(), PlaybackState::Playing);
    }
}
