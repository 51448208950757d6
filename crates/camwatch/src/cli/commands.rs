//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::playback::{SeekDirection, Speed};

/// Login command arguments.
#[derive(Debug, Args)]
pub struct LoginCommand {
    /// Your Gmail address
    pub email: String,
}

/// Permission form answers. Flags left out are refused.
#[derive(Debug, Args)]
pub struct PermissionsCommand {
    /// Allow access to camera
    #[arg(long)]
    pub camera: bool,

    /// Allow access to storage
    #[arg(long)]
    pub storage: bool,
}

/// Profile commands.
#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// Show your personal information
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Change your personal information
    Set {
        /// Full name
        #[arg(long)]
        name: Option<String>,

        /// Country code, e.g. "+91" or "India - +91"
        #[arg(long)]
        country_code: Option<String>,

        /// Contact number, digits only
        #[arg(long)]
        contact: Option<String>,

        /// Postal address
        #[arg(long)]
        address: Option<String>,
    },
}

/// Account commands.
#[derive(Debug, Subcommand)]
pub enum AccountCommand {
    /// Show or change the folder recordings are saved to
    SavePath {
        /// New recording folder
        path: Option<PathBuf>,
    },

    /// Delete your account and log out
    Delete {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Record command arguments.
#[derive(Debug, Args)]
pub struct RecordCommand {
    /// Number of camera devices to try (defaults to recording.device_count)
    #[arg(long, value_parser = parse_camera_count)]
    pub cameras: Option<usize>,

    /// Record into this folder and remember it as your save path
    #[arg(long, value_name = "DIR")]
    pub save_path: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Keep the latest frame of each camera as a PNG in this folder
    #[arg(long, value_name = "DIR")]
    pub preview_dir: Option<PathBuf>,
}

fn parse_camera_count(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("at least one camera is required".to_string()),
        Ok(count) => Ok(count),
        Err(err) => Err(err.to_string()),
    }
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// A .jpg, .jpeg or .png image
    pub file: PathBuf,

    /// Name to save the image under (the extension is kept)
    #[arg(short, long)]
    pub name: String,
}

/// Image library commands.
#[derive(Debug, Subcommand)]
pub enum ImagesCommand {
    /// List your imported images
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Check whether a file name exists in your folder
    Search {
        /// File name to look for, e.g. "alice.png"
        query: String,
    },
}

/// Play command arguments.
#[derive(Debug, Args)]
pub struct PlayCommand {
    /// The video to play
    pub file: PathBuf,

    /// Playback speed: 0.25x, 0.5x, 1x, 1.5x or 2x
    #[arg(long, default_value = "1x")]
    pub speed: Speed,

    /// Zoom in percent, 0 to 100
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=100))]
    pub zoom: u32,

    /// Seek before playing; repeat to seek further
    #[arg(long, value_enum)]
    pub seek: Vec<SeekArg>,

    /// Keep the latest frame as a PNG in this folder
    #[arg(long, value_name = "DIR")]
    pub preview_dir: Option<PathBuf>,
}

/// Seek direction argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeekArg {
    /// Ten seconds back
    Back,
    /// Ten seconds forward
    Forward,
}

impl From<SeekArg> for SeekDirection {
    fn from(arg: SeekArg) -> Self {
        match arg {
            SeekArg::Back => Self::Back,
            SeekArg::Forward => Self::Forward,
        }
    }
}

/// Where to read plates from. Exactly one source is required.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct PlateCommand {
    /// A still image
    #[arg(long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// A video file, scanned frame by frame
    #[arg(long, value_name = "FILE")]
    pub video: Option<PathBuf>,

    /// A camera device index, scanned until Ctrl-C
    #[arg(long, value_name = "INDEX")]
    pub device: Option<usize>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
