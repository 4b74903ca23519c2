use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::counters::SequenceStore;
use super::domain::{
    ImportId, ImportLicense, ImporterAccount, ImporterId, ObjectReference, Registration,
    RegistrationId,
};

/// Durable storage for registrations, imports and importer accounts.
///
/// Every `update_*` call is an optimistic write: it succeeds only when the record's `version`
/// matches the stored one, stores the record with `version + 1`, and returns what was stored.
/// A stale version yields [`RepositoryError::Conflict`].
pub trait LicensingStore: SequenceStore {
    fn insert_registration(&self, record: Registration) -> Result<Registration, RepositoryError>;
    /// Also rejects a second approved registration for the same importer and year with
    /// [`RepositoryError::Constraint`].
    fn update_registration(&self, record: Registration) -> Result<Registration, RepositoryError>;
    fn fetch_registration(
        &self,
        id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError>;
    fn registrations_for(
        &self,
        importer_id: &ImporterId,
        year: i32,
    ) -> Result<Vec<Registration>, RepositoryError>;

    fn insert_import(&self, record: ImportLicense) -> Result<ImportLicense, RepositoryError>;
    fn update_import(&self, record: ImportLicense) -> Result<ImportLicense, RepositoryError>;
    fn fetch_import(&self, id: &ImportId) -> Result<Option<ImportLicense>, RepositoryError>;
    fn imports_for(&self, importer_id: &ImporterId) -> Result<Vec<ImportLicense>, RepositoryError>;

    fn insert_account(&self, account: ImporterAccount) -> Result<ImporterAccount, RepositoryError>;
    fn fetch_account(
        &self,
        importer_id: &ImporterId,
    ) -> Result<Option<ImporterAccount>, RepositoryError>;
    fn update_account(&self, account: ImporterAccount) -> Result<ImporterAccount, RepositoryError>;

    /// Write the approved import and the debited account in one transaction. Both versions are
    /// checked before either write happens.
    fn commit_import_approval(
        &self,
        import: ImportLicense,
        account: ImporterAccount,
    ) -> Result<(ImportLicense, ImporterAccount), RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record changed since it was read")]
    Conflict,
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Renders certificate and license artifacts once a workflow reaches approval.
pub trait DocumentGenerator: Send + Sync {
    fn registration_certificate(
        &self,
        registration: &Registration,
    ) -> Result<ObjectReference, DocumentError>;
    fn import_license(&self, import: &ImportLicense) -> Result<ObjectReference, DocumentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document rendering failed: {0}")]
    Render(String),
}

/// Outbound email/message hook. Delivery is best-effort.
pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RegistrationSubmitted,
    RegistrationApproved,
    RegistrationRejected,
    ImportSubmitted,
    ImportArrived,
    InspectionScheduled,
    ImportApproved,
    ImportRejected,
}

impl NotificationKind {
    pub const fn template(self) -> &'static str {
        match self {
            Self::RegistrationSubmitted => "registration_submitted",
            Self::RegistrationApproved => "registration_approved",
            Self::RegistrationRejected => "registration_rejected",
            Self::ImportSubmitted => "import_submitted",
            Self::ImportArrived => "import_arrived",
            Self::InspectionScheduled => "inspection_scheduled",
            Self::ImportApproved => "import_approved",
            Self::ImportRejected => "import_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub importer_id: ImporterId,
    pub subject: String,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(kind: NotificationKind, importer_id: &ImporterId, subject: impl Into<String>) -> Self {
        Self {
            kind,
            importer_id: importer_id.clone(),
            subject: subject.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Stores signature images and supporting documents.
pub trait ObjectStorage: Send + Sync {
    fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<ObjectReference, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object storage unavailable: {0}")]
    Unavailable(String),
    #[error("object {0} rejected: empty payload")]
    Empty(String),
}

/// Send a notification, logging and discarding any delivery failure.
pub(crate) fn dispatch(sender: &dyn NotificationSender, notification: Notification) {
    let template = notification.kind.template();
    let subject = notification.subject.clone();
    if let Err(err) = sender.send(notification) {
        warn!(template, %subject, error = %err, "notification dropped");
    }
}
