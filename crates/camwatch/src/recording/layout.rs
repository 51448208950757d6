//! Where recordings go on disk.
//!
//! `{root}/{DD_MM_YYYY}/Camera_{n}/camera{n}_{YYYYMMDD_HHMMSS}.avi`, with `n`
//! the one-based camera number.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeZone};

use crate::error::{Error, Result};

/// Day directory name format.
pub const DATE_DIR_FORMAT: &str = "%d_%m_%Y";

/// Timestamp format inside recording file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Recording file extension.
pub const VIDEO_EXTENSION: &str = "avi";

/// The day directory for `now`.
#[must_use]
pub fn date_dir<Tz: TimeZone>(root: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    root.join(now.format(DATE_DIR_FORMAT).to_string())
}

/// The directory for camera `camera` on the day of `now`.
#[must_use]
pub fn camera_dir<Tz: TimeZone>(root: &Path, now: &DateTime<Tz>, camera: usize) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    date_dir(root, now).join(format!("Camera_{camera}"))
}

/// The file name of a recording started at `now`.
#[must_use]
pub fn file_name<Tz: TimeZone>(now: &DateTime<Tz>, camera: usize) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "camera{camera}_{}.{VIDEO_EXTENSION}",
        now.format(FILE_TIMESTAMP_FORMAT)
    )
}

/// Create the day and camera directories for a recording started at `now`
/// and return the output file path. Safe to call repeatedly.
///
/// # Errors
///
/// Returns [`Error::DirectoryCreate`] if a directory cannot be created and
/// [`Error::SavePathUnavailable`] if one cannot be written to.
pub fn prepare_output<Tz: TimeZone>(root: &Path, now: &DateTime<Tz>, camera: usize) -> Result<PathBuf>
where
    Tz::Offset: std::fmt::Display,
{
    let day = date_dir(root, now);
    create_writable_dir(&day)?;
    let dir = camera_dir(root, now, camera);
    create_writable_dir(&dir)?;
    Ok(dir.join(file_name(now, camera)))
}

fn create_writable_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
        path: dir.to_path_buf(),
        source,
    })?;
    ensure_writable(dir)
}

/// Check that files can be created in `dir` by creating and removing one.
///
/// # Errors
///
/// Returns [`Error::SavePathUnavailable`] if `dir` is missing, not a
/// directory, or not writable.
pub fn ensure_writable(dir: &Path) -> Result<()> {
    static MARKER: AtomicU64 = AtomicU64::new(0);

    if !dir.is_dir() {
        return Err(Error::SavePathUnavailable {
            path: dir.to_path_buf(),
            reason: "does not exist or is not a directory".to_string(),
        });
    }
    let marker = dir.join(format!(
        ".camwatch-write-test-{}-{}",
        std::process::id(),
        MARKER.fetch_add(1, Ordering::Relaxed)
    ));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .map_err(|err| Error::SavePathUnavailable {
            path: dir.to_path_buf(),
            reason: format!("not writable: {err}"),
        })?;
    let _ = fs::remove_file(&marker);
    Ok(())
}
