//! `camwatch` - multi-camera recording, playback and plate reading
//!
//! This library provides the core functionality behind the `camwatch` binary:
//! user accounts gated by camera and storage consent, concurrent recording
//! from several capture devices, playback of recorded files, number plate
//! extraction and a per-user reference image library.
//!
//! Devices, encoders, decoders and the OCR engine sit behind the traits in
//! [`media`] and [`plate`]; the shipped implementations drive the `ffmpeg`,
//! `ffprobe` and `tesseract` command-line tools.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod account;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod library;
pub mod logging;
pub mod media;
pub mod playback;
pub mod plate;
pub mod recording;

pub use account::{Consent, LoginOutcome, Session, UserRecord, UserStore};
pub use config::Config;
pub use context::AppContext;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use playback::{PlaybackController, Speed, Zoom};
pub use plate::{PlateExtractor, PlateReader};
pub use recording::{RecordingSupervisor, StartReport, UnitOutcome, UnitReport};
