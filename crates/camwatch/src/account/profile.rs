//! Profile and account management on the user record.

use std::path::PathBuf;

use tracing::info;

use super::{UserRecord, UserStore};
use crate::error::{Error, Result};

/// Personal information edits. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// Full name.
    pub name: Option<String>,
    /// Country code, either bare (`+91`) or as a menu entry (`India - +91`).
    pub country_code: Option<String>,
    /// Contact number, digits only; empty clears it.
    pub contact: Option<String>,
    /// Postal address.
    pub address: Option<String>,
}

impl ProfileUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.country_code.is_none()
            && self.contact.is_none()
            && self.address.is_none()
    }

    /// Check the update without applying it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContact`] if the contact has non-digits.
    pub fn validate(&self) -> Result<()> {
        if let Some(contact) = &self.contact {
            validate_contact(contact)?;
        }
        Ok(())
    }

    /// Apply the update to `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails; `record` is untouched then.
    pub fn apply(&self, record: &mut UserRecord) -> Result<()> {
        self.validate()?;
        if let Some(name) = &self.name {
            record.name = Some(name.trim().to_string());
        }
        if let Some(code) = &self.country_code {
            record.country_code = Some(normalize_country_code(code));
        }
        if let Some(contact) = &self.contact {
            record.contact = Some(contact.clone());
        }
        if let Some(address) = &self.address {
            record.address = Some(address.trim().to_string());
        }
        Ok(())
    }
}

/// Contact numbers may only contain ASCII digits. Empty is allowed.
///
/// # Errors
///
/// Returns [`Error::InvalidContact`] for any other character.
pub fn validate_contact(contact: &str) -> Result<()> {
    if contact.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::InvalidContact {
            contact: contact.to_string(),
        })
    }
}

/// Reduce `"India - +91"` to `"+91"`; bare codes pass through trimmed.
#[must_use]
pub fn normalize_country_code(code: &str) -> String {
    code.rsplit(" - ").next().unwrap_or(code).trim().to_string()
}

impl UserStore {
    /// Apply a profile update to the record for `email`.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input or if the record cannot be
    /// loaded or saved.
    pub fn update_profile(&self, email: &str, update: &ProfileUpdate) -> Result<UserRecord> {
        let record = self.update(email, |record| update.apply(record))?;
        info!("Updated personal information for {email}");
        Ok(record)
    }

    /// Set the folder recordings are written to.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be loaded or saved.
    pub fn set_save_path(&self, email: &str, path: impl Into<PathBuf>) -> Result<UserRecord> {
        let path = path.into();
        let record = self.update(email, |record| {
            record.save_path = Some(path.clone());
            Ok(())
        })?;
        info!("Save path for {email} changed to {}", path.display());
        Ok(record)
    }
}
