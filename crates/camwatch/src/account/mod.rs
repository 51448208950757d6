//! User accounts.
//!
//! Every user is a single JSON file named after their email address. The
//! record is created on first login, gains consent flags through the
//! permission gate, and picks up profile fields and a recording folder
//! over time. Fields this crate does not know about are carried through
//! untouched on rewrite.

pub mod permission;
pub mod profile;
pub mod session;

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use permission::{ConsentForm, PermissionOutcome};
pub use profile::ProfileUpdate;
pub use session::{LoginOutcome, Session, SessionStore};

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9_.+-]+@gmail+\.(com|org|net|edu|gov|co|info|biz|io|me)$";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"))
}

/// Check that `email` is an address we accept for login.
///
/// # Errors
///
/// Returns [`Error::InvalidEmail`] if the address does not match.
pub fn validate_email(email: &str) -> Result<()> {
    if email_regex().is_match(email) {
        Ok(())
    } else {
        Err(Error::InvalidEmail {
            email: email.to_string(),
        })
    }
}

/// A yes/no consent value, stored as the strings `"yes"` and `"no"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    /// Consent given.
    Yes,
    /// Consent withheld.
    #[default]
    No,
}

impl Consent {
    /// Whether consent was given.
    #[must_use]
    pub fn is_yes(self) -> bool {
        self == Self::Yes
    }
}

impl From<bool> for Consent {
    fn from(value: bool) -> Self {
        if value {
            Self::Yes
        } else {
            Self::No
        }
    }
}

impl fmt::Display for Consent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "yes"),
            Self::No => write!(f, "no"),
        }
    }
}

/// The persisted state of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// The login email; also the file name.
    pub email: String,

    /// `yes` only when both camera and storage consent were given.
    #[serde(default)]
    pub permission: Consent,

    /// Consent to camera access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_permission: Option<Consent>,

    /// Consent to storage access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_permission: Option<Consent>,

    /// Folder that receives recordings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<PathBuf>,

    /// Full name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Dialling prefix such as `+91`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,

    /// Contact number, digits only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,

    /// Postal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Fields written by other tools.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserRecord {
    /// A fresh record for a first login: permission not yet granted.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            permission: Consent::No,
            camera_permission: None,
            storage_permission: None,
            save_path: None,
            name: None,
            country_code: None,
            contact: None,
            address: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Whether the user may record.
    #[must_use]
    pub fn has_permission(&self) -> bool {
        self.permission.is_yes()
    }
}

/// Directory of user records, one `{email}.json` per user.
#[derive(Debug, Clone)]
pub struct UserStore {
    dir: PathBuf,
}

impl UserStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `email`.
    #[must_use]
    pub fn record_path(&self, email: &str) -> PathBuf {
        self.dir.join(format!("{email}.json"))
    }

    /// Whether a record exists for `email`.
    #[must_use]
    pub fn exists(&self, email: &str) -> bool {
        self.record_path(email).is_file()
    }

    /// Load the record for `email`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserNotFound`] if there is no record and
    /// [`Error::UserRecordMalformed`] if it cannot be parsed.
    pub fn load(&self, email: &str) -> Result<UserRecord> {
        let path = self.record_path(email);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Error::UserNotFound {
                    email: email.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&contents).map_err(|source| Error::UserRecordMalformed { path, source })
    }

    /// Write `record` to its file, replacing any previous contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file written.
    pub fn save(&self, record: &UserRecord) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
                path: self.dir.clone(),
                source,
            })?;
        }
        let path = self.record_path(&record.email);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)?;
        debug!("Saved user record {}", path.display());
        Ok(())
    }

    /// Create and persist a new record for `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn create(&self, email: &str) -> Result<UserRecord> {
        let record = UserRecord::new(email);
        self.save(&record)?;
        info!("Created user record for {email}");
        Ok(record)
    }

    /// Load, modify and save the record for `email` in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails, `edit` fails, or saving fails.
    pub fn update<F>(&self, email: &str, edit: F) -> Result<UserRecord>
    where
        F: FnOnce(&mut UserRecord) -> Result<()>,
    {
        let mut record = self.load(email)?;
        edit(&mut record)?;
        self.save(&record)?;
        Ok(record)
    }

    /// Remove the record for `email`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserNotFound`] if there is no record.
    pub fn delete(&self, email: &str) -> Result<()> {
        match fs::remove_file(self.record_path(email)) {
            Ok(()) => {
                info!("Deleted user record for {email}");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::UserNotFound {
                email: email.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}
