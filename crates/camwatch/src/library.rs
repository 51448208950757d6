//! Per-user reference image library.
//!
//! Images live in `{images_dir}/{email}/{name}.{ext}`. Imports are decoded
//! and re-encoded, and rejected when the encoded content already exists in
//! the user's folder.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Accepted image file extensions.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One image in a user's folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    /// File name including the extension.
    pub name: String,
    /// Full path to the file.
    pub path: PathBuf,
    /// Hex BLAKE3 hash of the file content.
    pub content_hash: String,
}

/// Hex BLAKE3 hash of `bytes`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// The accepted lowercase extension of `path`, if any.
fn image_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Reference images grouped by user.
#[derive(Debug, Clone)]
pub struct ImageLibrary {
    root: PathBuf,
}

impl ImageLibrary {
    /// Create a library rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The folder holding `email`'s images.
    #[must_use]
    pub fn user_dir(&self, email: &str) -> PathBuf {
        self.root.join(email)
    }

    /// Copy the image at `source` into `email`'s folder as `name`, keeping
    /// the source extension. An existing file with the same name is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty or path-like name,
    /// [`Error::UnsupportedImage`] if `source` is not a jpg/jpeg/png file,
    /// [`Error::Image`] if it does not decode, and
    /// [`Error::DuplicateImage`] if identical content is already stored.
    pub fn import(&self, email: &str, source: &Path, name: &str) -> Result<ImageEntry> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_argument("name", "no image name entered"));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::invalid_argument(
                "name",
                format!("{name} must not contain path separators"),
            ));
        }
        let original_ext = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string);
        let (Some(ext), Some(original_ext)) = (image_extension(source), original_ext) else {
            return Err(Error::UnsupportedImage {
                path: source.to_path_buf(),
            });
        };

        let image = image::open(source)?;
        let format = ImageFormat::from_extension(&ext).ok_or_else(|| Error::UnsupportedImage {
            path: source.to_path_buf(),
        })?;
        let mut encoded = Vec::new();
        image.write_to(&mut Cursor::new(&mut encoded), format)?;
        let hash = content_hash(&encoded);

        let dir = self.user_dir(email);
        fs::create_dir_all(&dir).map_err(|source| Error::DirectoryCreate {
            path: dir.clone(),
            source,
        })?;
        if let Some(existing) = self.list(email)?.into_iter().find(|entry| entry.content_hash == hash) {
            return Err(Error::DuplicateImage {
                existing: existing.path,
            });
        }

        let file_name = format!("{name}.{original_ext}");
        let path = dir.join(&file_name);
        if path.exists() {
            warn!("Replacing {}", path.display());
        }
        fs::write(&path, &encoded)?;
        info!("Image '{name}' saved to {}", path.display());

        Ok(ImageEntry {
            name: file_name,
            path,
            content_hash: hash,
        })
    }

    /// Whether `query` names a file in `email`'s folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserFolderMissing`] if the user has no folder yet.
    pub fn search(&self, email: &str, query: &str) -> Result<bool> {
        let dir = self.user_dir(email);
        if !dir.is_dir() {
            return Err(Error::UserFolderMissing {
                email: email.to_string(),
            });
        }
        let query = query.trim();
        if query.is_empty() || query.contains(['/', '\\']) {
            return Ok(false);
        }
        Ok(dir.join(query).exists())
    }

    /// The images in `email`'s folder, sorted by name. A missing folder
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the folder or a file cannot be read.
    pub fn list(&self, email: &str) -> Result<Vec<ImageEntry>> {
        let dir = self.user_dir(email);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() || image_extension(&path).is_none() {
                continue;
            }
            let bytes = fs::read(&path)?;
            entries.push(ImageEntry {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                content_hash: content_hash(&bytes),
                path,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
