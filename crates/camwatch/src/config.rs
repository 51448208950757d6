//! Configuration management for camwatch.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::media::VideoFormat;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "camwatch";

/// Placeholder substituted with the device index in `camera.device_template`.
pub const DEVICE_INDEX_PLACEHOLDER: &str = "{index}";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CAMWATCH_`, sections split by `__`)
/// 2. TOML config file at `~/.config/camwatch/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where user records, images and plate output live.
    pub paths: PathsConfig,
    /// Recording output parameters.
    pub recording: RecordingConfig,
    /// Capture device access.
    pub camera: CameraConfig,
    /// Playback behaviour.
    pub playback: PlaybackConfig,
    /// Plate extraction and recognition.
    pub plate: PlateConfig,
}

/// Filesystem layout.
///
/// Unset paths resolve under the data directory at runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base data directory.
    /// Defaults to `~/.local/share/camwatch`
    pub data_dir: Option<PathBuf>,
    /// Directory holding one JSON record per user.
    pub users_dir: Option<PathBuf>,
    /// Base directory for imported reference images.
    pub images_dir: Option<PathBuf>,
    /// File overwritten with the latest recognized plate text.
    pub plate_output: Option<PathBuf>,
}

/// Recording output parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Number of device indices to try when starting a session.
    pub device_count: usize,
    /// Output frame width in pixels.
    pub width: u32,
    /// Output frame height in pixels.
    pub height: u32,
    /// Output frame rate.
    pub fps: u32,
}

/// Capture device access through ffmpeg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// The ffmpeg executable.
    pub ffmpeg: PathBuf,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`).
    pub input_format: String,
    /// Device name with `{index}` standing for the zero-based device index.
    pub device_template: String,
}

impl CameraConfig {
    /// The device template with `{index}` replaced by `index`.
    #[must_use]
    pub fn device_name(&self, index: usize) -> String {
        self.device_template
            .replace(DEVICE_INDEX_PLACEHOLDER, &index.to_string())
    }
}

/// Playback behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// The ffprobe executable.
    pub ffprobe: PathBuf,
    /// Seconds skipped by a single seek.
    pub seek_seconds: u32,
    /// Frame rate assumed when the container does not report one.
    pub fallback_fps: f64,
}

/// Plate extraction and recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateConfig {
    /// The tesseract executable.
    pub tesseract: PathBuf,
    /// Tesseract page segmentation mode.
    pub page_segmentation_mode: u8,
    /// Gaussian blur sigma.
    pub blur_sigma: f32,
    /// Canny low threshold.
    pub canny_low: f32,
    /// Canny high threshold.
    pub canny_high: f32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            device_count: 4,
            width: 640,
            height: 480,
            fps: 20,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        let (input_format, device_template) = default_camera_input();
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            input_format: input_format.to_string(),
            device_template: device_template.to_string(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
            seek_seconds: 10,
            fallback_fps: 30.0,
        }
    }
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            tesseract: PathBuf::from("tesseract"),
            page_segmentation_mode: 6,
            // Sigma of a 5x5 Gaussian kernel.
            blur_sigma: 1.1,
            canny_low: 100.0,
            canny_high: 200.0,
        }
    }
}

/// Platform-specific ffmpeg input format and device naming.
fn default_camera_input() -> (&'static str, &'static str) {
    if cfg!(target_os = "macos") {
        ("avfoundation", "{index}")
    } else if cfg!(target_os = "windows") {
        ("dshow", "video={index}")
    } else {
        ("v4l2", "/dev/video{index}")
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CAMWATCH_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let rec = &self.recording;
        if rec.device_count == 0 {
            return Err(invalid("recording.device_count must be greater than 0"));
        }
        if rec.width == 0 || rec.height == 0 {
            return Err(invalid(format!(
                "recording frame size must be non-zero, got {}x{}",
                rec.width, rec.height
            )));
        }
        if rec.fps == 0 {
            return Err(invalid("recording.fps must be greater than 0"));
        }

        if !self.camera.device_template.contains(DEVICE_INDEX_PLACEHOLDER) {
            return Err(invalid(format!(
                "camera.device_template must contain {DEVICE_INDEX_PLACEHOLDER}: {}",
                self.camera.device_template
            )));
        }

        if self.playback.seek_seconds == 0 {
            return Err(invalid("playback.seek_seconds must be greater than 0"));
        }
        if self.playback.fallback_fps <= 0.0 || !self.playback.fallback_fps.is_finite() {
            return Err(invalid("playback.fallback_fps must be a positive number"));
        }

        let plate = &self.plate;
        if !(plate.blur_sigma.is_finite() && plate.blur_sigma > 0.0) {
            return Err(invalid("plate.blur_sigma must be greater than 0"));
        }
        if !(plate.canny_low.is_finite() && plate.canny_high.is_finite()) {
            return Err(invalid("plate canny thresholds must be finite numbers"));
        }
        if plate.canny_low > plate.canny_high {
            return Err(invalid(format!(
                "plate.canny_low ({}) cannot be greater than plate.canny_high ({})",
                plate.canny_low, plate.canny_high
            )));
        }

        Ok(())
    }

    /// Get the data directory, resolving defaults if not set.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the user records directory, resolving defaults if not set.
    #[must_use]
    pub fn users_dir(&self) -> PathBuf {
        self.paths
            .users_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("users"))
    }

    /// Get the reference images directory, resolving defaults if not set.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.paths
            .images_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("images"))
    }

    /// Get the plate output file, resolving defaults if not set.
    #[must_use]
    pub fn plate_output(&self) -> PathBuf {
        self.paths
            .plate_output
            .clone()
            .unwrap_or_else(|| self.data_dir().join("numberplate").join("number_plate.txt"))
    }

    /// Get the file holding the current login session.
    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        self.data_dir().join("session.json")
    }

    /// Get the output geometry and rate of recordings.
    #[must_use]
    pub fn video_format(&self) -> VideoFormat {
        VideoFormat {
            width: self.recording.width,
            height: self.recording.height,
            fps: self.recording.fps,
        }
    }

    /// Get the ffmpeg device name for a zero-based device index.
    #[must_use]
    pub fn device_name(&self, index: usize) -> String {
        self.camera.device_name(index)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
