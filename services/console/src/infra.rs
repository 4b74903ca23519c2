use chrono::NaiveDate;
use ods_licensing::error::AppError;
use ods_licensing::workflows::licensing::{
    DocumentError, DocumentGenerator, ImportLicense, Notification, NotificationError,
    NotificationSender, ObjectReference, ObjectStorage, RefrigerantCatalog, Registration,
    StorageError,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Hands notifications to a background task so workflow threads never wait on delivery.
pub(crate) struct ChannelNotifier {
    sender: UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub(crate) fn new() -> (Self, UnboundedReceiver<Notification>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSender for ChannelNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sender
            .send(notification)
            .map_err(|_| NotificationError::Transport("notification drain has stopped".to_string()))
    }
}

/// Log every queued notification until all senders are dropped. Yields the delivered messages.
pub(crate) fn spawn_notification_drain(
    mut receiver: UnboundedReceiver<Notification>,
) -> JoinHandle<Vec<Notification>> {
    tokio::spawn(async move {
        let mut delivered = Vec::new();
        while let Some(notification) = receiver.recv().await {
            info!(
                template = notification.kind.template(),
                importer = %notification.importer_id,
                subject = %notification.subject,
                "notification delivered"
            );
            delivered.push(notification);
        }
        delivered
    })
}

/// Stands in for the PDF renderer; returns where the document would be written.
#[derive(Default)]
pub(crate) struct LoggingDocumentGenerator;

impl DocumentGenerator for LoggingDocumentGenerator {
    fn registration_certificate(
        &self,
        registration: &Registration,
    ) -> Result<ObjectReference, DocumentError> {
        let key = format!(
            "certificates/{}/{}.pdf",
            registration.year,
            registration
                .certificate_number()
                .ok_or_else(|| DocumentError::Render("registration is not approved".to_string()))?
        );
        debug!(registration = %registration.id, %key, "certificate rendered");
        Ok(ObjectReference {
            key,
            content_type: "application/pdf".to_string(),
        })
    }

    fn import_license(&self, import: &ImportLicense) -> Result<ObjectReference, DocumentError> {
        let key = format!("licenses/{}/{}.pdf", import.year, import.import_number);
        debug!(import = %import.id, %key, "import license rendered");
        Ok(ObjectReference {
            key,
            content_type: "application/pdf".to_string(),
        })
    }
}

#[derive(Default)]
pub(crate) struct InMemoryObjectStorage {
    objects: Mutex<BTreeMap<String, (String, Vec<u8>)>>,
}

impl InMemoryObjectStorage {
    pub(crate) fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|guard| guard.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<ObjectReference, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty(key.to_string()));
        }
        let mut guard = self
            .objects
            .lock()
            .map_err(|_| StorageError::Unavailable("object store mutex poisoned".to_string()))?;
        guard.insert(key.to_string(), (content_type.to_string(), bytes.to_vec()));
        Ok(ObjectReference {
            key: key.to_string(),
            content_type: content_type.to_string(),
        })
    }
}

pub(crate) fn load_catalog(path: Option<&Path>) -> Result<RefrigerantCatalog, AppError> {
    match path {
        Some(path) => {
            let catalog = RefrigerantCatalog::from_csv_path(path)?;
            info!(path = %path.display(), refrigerants = catalog.len(), "catalog loaded");
            Ok(catalog)
        }
        None => Ok(RefrigerantCatalog::standard()),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
