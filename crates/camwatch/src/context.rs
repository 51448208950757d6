//! Application state shared by every command.
//!
//! [`AppContext`] resolves configured paths into stores and answers "who is
//! logged in" for account, library and recording operations.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::account::{
    ConsentForm, LoginOutcome, PermissionOutcome, ProfileUpdate, Session, SessionStore, UserRecord,
    UserStore,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::library::{ImageEntry, ImageLibrary};
use crate::recording::layout::ensure_writable;

/// Configuration plus the stores it points at.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: Config,
    users: UserStore,
    sessions: SessionStore,
    library: ImageLibrary,
}

impl AppContext {
    /// Build the stores from `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let users = UserStore::new(config.users_dir());
        let sessions = SessionStore::new(config.session_file());
        let library = ImageLibrary::new(config.images_dir());
        Self {
            config,
            users,
            sessions,
            library,
        }
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// User records.
    #[must_use]
    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Reference images.
    #[must_use]
    pub fn library(&self) -> &ImageLibrary {
        &self.library
    }

    /// Log in as `email` and remember the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEmail`] for a rejected address, or an error
    /// if the record or session cannot be written.
    pub fn login(&self, email: &str) -> Result<(Session, LoginOutcome)> {
        let (session, outcome) = self.users.login(email.trim())?;
        self.sessions.save(&session)?;
        Ok((session, outcome))
    }

    /// Forget the current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] if nobody is logged in.
    pub fn logout(&self) -> Result<Session> {
        self.sessions.clear()
    }

    /// The current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] if nobody is logged in.
    pub fn current_session(&self) -> Result<Session> {
        self.sessions.current()
    }

    /// The current session and its user record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`], [`Error::UserNotFound`] or
    /// [`Error::EmailMismatch`] when the session does not lead to a
    /// matching record.
    pub fn current_user(&self) -> Result<(Session, UserRecord)> {
        let session = self.current_session()?;
        let record = self.users.load(&session.email)?;
        if record.email != session.email {
            return Err(Error::EmailMismatch {
                session: session.email,
                record: record.email,
            });
        }
        Ok((session, record))
    }

    /// Submit the permission form for the current user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] or a store error.
    pub fn submit_permissions(&self, form: ConsentForm) -> Result<PermissionOutcome> {
        let (session, _) = self.current_user()?;
        self.users.submit_permissions(&session.email, form)
    }

    /// Update the current user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`], [`Error::InvalidContact`] or a
    /// store error.
    pub fn update_profile(&self, update: &ProfileUpdate) -> Result<UserRecord> {
        let (session, _) = self.current_user()?;
        self.users.update_profile(&session.email, update)
    }

    /// Set the current user's recording folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] or a store error.
    pub fn set_save_path(&self, dir: &Path) -> Result<UserRecord> {
        let (session, _) = self.current_user()?;
        self.users.set_save_path(&session.email, dir)
    }

    /// Delete the current user's record and log out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] or a store error.
    pub fn delete_account(&self) -> Result<String> {
        let session = self.current_session()?;
        self.users.delete(&session.email)?;
        self.sessions.clear()?;
        info!("Account {} deleted", session.email);
        Ok(session.email)
    }

    /// Check everything recording needs and return the folder to record
    /// into.
    ///
    /// `save_path` replaces the stored folder and is persisted before the
    /// folder checks run.
    ///
    /// # Errors
    ///
    /// In order: [`Error::NotLoggedIn`], [`Error::EmailMismatch`],
    /// [`Error::PermissionDenied`], [`Error::SavePathMissing`] and
    /// [`Error::SavePathUnavailable`].
    pub fn recording_target(&self, save_path: Option<&Path>) -> Result<PathBuf> {
        let (session, mut record) = self.current_user()?;
        if !record.has_permission() {
            return Err(Error::PermissionDenied {
                email: session.email,
            });
        }
        if let Some(dir) = save_path {
            record = self.users.set_save_path(&session.email, dir)?;
        }
        let dir = record.save_path.ok_or(Error::SavePathMissing {
            email: session.email,
        })?;
        ensure_writable(&dir)?;
        debug!("Recording target {}", dir.display());
        Ok(dir)
    }

    /// Import an image into the current user's folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] or a library error.
    pub fn import_image(&self, source: &Path, name: &str) -> Result<ImageEntry> {
        let session = self.current_session()?;
        self.library.import(&session.email, source, name)
    }

    /// Whether `query` names an image in the current user's folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] or [`Error::UserFolderMissing`].
    pub fn search_images(&self, query: &str) -> Result<bool> {
        let session = self.current_session()?;
        self.library.search(&session.email, query)
    }

    /// The current user's images.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] or an I/O error.
    pub fn list_images(&self) -> Result<Vec<ImageEntry>> {
        let session = self.current_session()?;
        self.library.list(&session.email)
    }
}
