//! Login, logout and the persisted current session.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{validate_email, UserStore};
use crate::error::{Error, Result};

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The user's email.
    pub email: String,
    /// Path of the user's record.
    pub record_path: PathBuf,
    /// When the login happened.
    pub logged_in_at: DateTime<Utc>,
}

/// What the login step decided should happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Known user with permission granted.
    WelcomeBack,
    /// The permission form must be submitted before recording.
    NeedsPermission {
        /// Whether this login created the record.
        created: bool,
    },
}

impl LoginOutcome {
    /// Whether the permission form should be shown next.
    #[must_use]
    pub fn needs_permission(self) -> bool {
        matches!(self, Self::NeedsPermission { .. })
    }
}

impl UserStore {
    /// Log in as `email`, creating the record on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEmail`] without touching disk if the address
    /// is rejected, or an error if the record cannot be read or created.
    pub fn login(&self, email: &str) -> Result<(Session, LoginOutcome)> {
        validate_email(email)?;

        let outcome = if self.exists(email) {
            if self.load(email)?.has_permission() {
                LoginOutcome::WelcomeBack
            } else {
                LoginOutcome::NeedsPermission { created: false }
            }
        } else {
            self.create(email)?;
            LoginOutcome::NeedsPermission { created: true }
        };

        let session = Session {
            email: email.to_string(),
            record_path: self.record_path(email),
            logged_in_at: Utc::now(),
        };
        info!("Logged in as {email} ({outcome:?})");
        Ok((session, outcome))
    }
}

/// The file remembering who is logged in between invocations.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Create a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<Session>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// The current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] if there is none.
    pub fn current(&self) -> Result<Session> {
        self.load()?.ok_or(Error::NotLoggedIn)
    }

    /// Remember `session` as the current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        debug!("Session saved to {}", self.path.display());
        Ok(())
    }

    /// Forget the current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] if nobody was logged in.
    pub fn clear(&self) -> Result<Session> {
        let session = self.current()?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        info!("Logged out {}", session.email);
        Ok(session)
    }
}
