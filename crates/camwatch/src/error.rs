//! Error types for camwatch.
//!
//! This module defines all error types used throughout the camwatch crate,
//! split into input-validation failures (the user can fix them by re-entering
//! something) and resource failures (a device, file or external tool let us
//! down). Neither class is fatal to the application.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for camwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Input Validation Errors ===
    /// The email address does not match the accepted format.
    #[error("please enter a valid email address: {email}")]
    InvalidEmail {
        /// The rejected input.
        email: String,
    },

    /// A contact number contained something other than digits.
    #[error("contact number must contain digits only: {contact}")]
    InvalidContact {
        /// The rejected input.
        contact: String,
    },

    /// A user-supplied argument is out of range or malformed.
    #[error("invalid {name}: {message}")]
    InvalidArgument {
        /// Name of the argument.
        name: &'static str,
        /// Description of what is wrong with it.
        message: String,
    },

    /// No user is currently logged in.
    #[error("no user is currently logged in")]
    NotLoggedIn,

    /// The user record belongs to a different email than the session.
    #[error("user record email {record} does not match the logged-in user {session}")]
    EmailMismatch {
        /// Email stored in the session.
        session: String,
        /// Email stored in the user record.
        record: String,
    },

    /// Camera and storage consent have not both been given.
    #[error("permission not granted for {email}: please allow both camera and storage access")]
    PermissionDenied {
        /// The user lacking permission.
        email: String,
    },

    /// The user has not chosen a folder for recordings.
    #[error("no save path configured for {email}")]
    SavePathMissing {
        /// The user lacking a save path.
        email: String,
    },

    /// The file is not one of the accepted image types.
    #[error("unsupported image {path}: expected a .jpg, .jpeg or .png file")]
    UnsupportedImage {
        /// The offending file.
        path: PathBuf,
    },

    /// Identical image content is already in the user's folder.
    #[error("image already imported as {existing}")]
    DuplicateImage {
        /// The file holding the identical content.
        existing: PathBuf,
    },

    // === Account Errors ===
    /// No record exists for the user.
    #[error("no user record for {email}")]
    UserNotFound {
        /// The missing user.
        email: String,
    },

    /// A user record exists but could not be parsed.
    #[error("malformed user record at {path}: {source}")]
    UserRecordMalformed {
        /// Path to the record.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The recording folder does not exist or cannot be written.
    #[error("save path {path} is unusable: {reason}")]
    SavePathUnavailable {
        /// The configured save path.
        path: PathBuf,
        /// Why it cannot be used.
        reason: String,
    },

    /// The user has no image folder yet.
    #[error("no image folder for {email}")]
    UserFolderMissing {
        /// The user whose folder is missing.
        email: String,
    },

    // === Media Errors ===
    /// A capture device could not be opened or stopped delivering frames.
    #[error("camera {index} unavailable: {message}")]
    DeviceUnavailable {
        /// Zero-based device index.
        index: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// The video encoder failed.
    #[error("encoder error for {path}: {message}")]
    Encoder {
        /// The output file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// The video decoder failed.
    #[error("decoder error for {path}: {message}")]
    Decoder {
        /// The input file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// Plate extraction found no contours in the frame.
    #[error("no contours found in frame")]
    NoContours,

    /// The text recognizer failed.
    #[error("text recognition failed: {0}")]
    Recognizer(String),

    /// Image decoding or encoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for camwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    /// Create a device unavailable error.
    #[must_use]
    pub fn device_unavailable(index: usize, message: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            index,
            message: message.into(),
        }
    }

    /// Create an encoder error.
    #[must_use]
    pub fn encoder(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Encoder {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a decoder error.
    #[must_use]
    pub fn decoder(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decoder {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a recognizer error.
    #[must_use]
    pub fn recognizer(message: impl Into<String>) -> Self {
        Self::Recognizer(message.into())
    }

    /// Check if this error was caused by user input rather than a resource.
    ///
    /// Input errors leave all state untouched; the user can simply retry
    /// with different input.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEmail { .. }
                | Self::InvalidContact { .. }
                | Self::InvalidArgument { .. }
                | Self::NotLoggedIn
                | Self::EmailMismatch { .. }
                | Self::PermissionDenied { .. }
                | Self::SavePathMissing { .. }
                | Self::UnsupportedImage { .. }
                | Self::DuplicateImage { .. }
        )
    }

    /// Check if this error means nobody is logged in.
    #[must_use]
    pub fn is_not_logged_in(&self) -> bool {
        matches!(self, Self::NotLoggedIn)
    }
}
