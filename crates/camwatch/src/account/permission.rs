//! The consent gate in front of recording.
//!
//! A user answers two questions, camera access and storage access. Both
//! answers are stored, and the overall `permission` flag is `yes` only when
//! both are `yes`.

use tracing::{info, warn};

use super::{Consent, UserRecord, UserStore};
use crate::error::Result;

/// The two checkboxes of the permission form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsentForm {
    /// Allow access to camera.
    pub camera: bool,
    /// Allow access to storage.
    pub storage: bool,
}

/// Result of submitting the permission form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Both consents given; recording is allowed.
    Granted,
    /// At least one consent missing; recording stays blocked.
    Denied,
}

impl ConsentForm {
    /// Create a form with the given answers.
    #[must_use]
    pub fn new(camera: bool, storage: bool) -> Self {
        Self { camera, storage }
    }

    /// The overall permission implied by the two answers.
    #[must_use]
    pub fn permission(self) -> Consent {
        Consent::from(self.camera && self.storage)
    }

    /// Write the answers into `record`.
    pub fn apply(self, record: &mut UserRecord) -> PermissionOutcome {
        record.camera_permission = Some(Consent::from(self.camera));
        record.storage_permission = Some(Consent::from(self.storage));
        record.permission = self.permission();
        if record.permission.is_yes() {
            PermissionOutcome::Granted
        } else {
            PermissionOutcome::Denied
        }
    }
}

impl UserStore {
    /// Persist a permission form submission for `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be loaded or saved.
    pub fn submit_permissions(&self, email: &str, form: ConsentForm) -> Result<PermissionOutcome> {
        let mut outcome = PermissionOutcome::Denied;
        self.update(email, |record| {
            outcome = form.apply(record);
            Ok(())
        })?;
        match outcome {
            PermissionOutcome::Granted => info!("Permissions granted for {email}"),
            PermissionOutcome::Denied => warn!(
                "Permissions incomplete for {email} (camera: {}, storage: {})",
                Consent::from(form.camera),
                Consent::from(form.storage)
            ),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_requires_both_consents() {
        for camera in [false, true] {
            for storage in [false, true] {
                let mut record = UserRecord::new("a@gmail.com");
                let outcome = ConsentForm::new(camera, storage).apply(&mut record);

                let expected = camera && storage;
                assert_eq!(record.permission.is_yes(), expected);
                assert_eq!(outcome == PermissionOutcome::Granted, expected);
                assert_eq!(record.camera_permission, Some(Consent::from(camera)));
                assert_eq!(record.storage_permission, Some(Consent::from(storage)));
            }
        }
    }

    #[test]
    fn test_revoking_a_consent_clears_permission() {
        let mut record = UserRecord::new("a@gmail.com");
        ConsentForm::new(true, true).apply(&mut record);
        assert!(record.has_permission());

        ConsentForm::new(true, false).apply(&mut record);
        assert!(!record.has_permission());
    }

    #[test]
    fn test_submit_permissions_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path());
        store.create("a@gmail.com").unwrap();

        let outcome = store
            .submit_permissions("a@gmail.com", ConsentForm::new(true, true))
            .unwrap();
        assert_eq!(outcome, PermissionOutcome::Granted);

        let record = store.load("a@gmail.com").unwrap();
        assert!(record.has_permission());
        assert_eq!(record.storage_permission, Some(Consent::Yes));
    }

    #[test]
    fn test_submit_permissions_keeps_email() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path());
        store.create("a@gmail.com").unwrap();

        store
            .submit_permissions("a@gmail.com", ConsentForm::new(false, true))
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.record_path("a@gmail.com")).unwrap())
                .unwrap();
        assert_eq!(value["email"], "a@gmail.com");
        assert_eq!(value["permission"], "no");
        assert_eq!(value["camera_permission"], "no");
        assert_eq!(value["storage_permission"], "yes");
    }
}
