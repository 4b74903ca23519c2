use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::workflows::licensing::clock::FixedClock;
use crate::workflows::licensing::domain::{
    ImportLicense, ImporterAccount, ImporterId, LineItemRequest, ObjectReference, Registration,
};
use crate::workflows::licensing::import::SignatureImage;
use crate::workflows::licensing::repository::{
    DocumentError, DocumentGenerator, LicensingStore, Notification, NotificationError,
    NotificationKind, NotificationSender, ObjectStorage, StorageError,
};
use crate::workflows::licensing::{
    Collaborators, EngineSettings, InMemoryLicensingStore, LicensingService, RefrigerantCatalog,
};

pub(super) const QUOTA: f64 = 100_000.0;

pub(super) fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Inside the December window that opens 2026.
pub(super) fn registration_day() -> DateTime<Utc> {
    at(2025, 12, 5)
}

pub(super) fn import_day() -> DateTime<Utc> {
    at(2026, 2, 10)
}

pub(super) fn importer() -> ImporterId {
    ImporterId("importer-cool-co".to_string())
}

pub(super) fn codes(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub(super) fn line_item(code: &str, quantity: u32, volume: f64, unit: &str) -> LineItemRequest {
    LineItemRequest {
        refrigerant_code: code.to_string(),
        quantity,
        volume,
        unit: unit.to_string(),
    }
}

pub(super) fn signature() -> SignatureImage {
    SignatureImage {
        content_type: "image/png".to_string(),
        bytes: vec![0x89, 0x50, 0x4e, 0x47],
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    events: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl MemoryNotifier {
    pub(super) fn kinds(&self) -> Vec<NotificationKind> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .iter()
            .map(|event| event.kind)
            .collect()
    }

    pub(super) fn last(&self) -> Option<Notification> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .last()
            .cloned()
    }

    pub(super) fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl NotificationSender for MemoryNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp relay down".to_string()));
        }
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryDocuments {
    fail: AtomicBool,
}

impl MemoryDocuments {
    pub(super) fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl DocumentGenerator for MemoryDocuments {
    fn registration_certificate(
        &self,
        registration: &Registration,
    ) -> Result<ObjectReference, DocumentError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DocumentError::Render("template missing".to_string()));
        }
        Ok(ObjectReference {
            key: format!("certificates/{}.pdf", registration.id),
            content_type: "application/pdf".to_string(),
        })
    }

    fn import_license(&self, import: &ImportLicense) -> Result<ObjectReference, DocumentError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DocumentError::Render("template missing".to_string()));
        }
        Ok(ObjectReference {
            key: format!("licenses/{}.pdf", import.id),
            content_type: "application/pdf".to_string(),
        })
    }
}

#[derive(Default)]
pub(super) struct MemoryObjects {
    keys: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MemoryObjects {
    pub(super) fn keys(&self) -> Vec<String> {
        self.keys.lock().expect("objects mutex poisoned").clone()
    }

    pub(super) fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl ObjectStorage for MemoryObjects {
    fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<ObjectReference, StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("bucket offline".to_string()));
        }
        if bytes.is_empty() {
            return Err(StorageError::Empty(key.to_string()));
        }
        self.keys
            .lock()
            .expect("objects mutex poisoned")
            .push(key.to_string());
        Ok(ObjectReference {
            key: key.to_string(),
            content_type: content_type.to_string(),
        })
    }
}

pub(super) struct Harness {
    pub(super) service: LicensingService<InMemoryLicensingStore>,
    pub(super) store: Arc<InMemoryLicensingStore>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) notifier: Arc<MemoryNotifier>,
    pub(super) documents: Arc<MemoryDocuments>,
    pub(super) objects: Arc<MemoryObjects>,
}

pub(super) fn harness() -> Harness {
    harness_with(EngineSettings {
        max_conflict_retries: 64,
        ..EngineSettings::default()
    })
}

pub(super) fn harness_with(settings: EngineSettings) -> Harness {
    let store = Arc::new(InMemoryLicensingStore::new());
    store
        .insert_account(ImporterAccount::new(importer(), QUOTA))
        .expect("account provisioned");

    let clock = Arc::new(FixedClock::new(registration_day()));
    let notifier = Arc::new(MemoryNotifier::default());
    let documents = Arc::new(MemoryDocuments::default());
    let objects = Arc::new(MemoryObjects::default());
    let collaborators = Collaborators {
        clock: clock.clone(),
        notifier: notifier.clone(),
        documents: documents.clone(),
        objects: objects.clone(),
    };

    let service = LicensingService::new(
        store.clone(),
        Arc::new(RefrigerantCatalog::standard()),
        collaborators,
        settings,
    );

    Harness {
        service,
        store,
        clock,
        notifier,
        documents,
        objects,
    }
}

impl Harness {
    /// Submit and approve a 2026 registration for R-134a and R-410A, then move the clock into 2026.
    pub(super) fn approved_registration(&self) -> Registration {
        let registrations = self.service.registrations();
        let submitted = registrations
            .submit(&importer(), 2026, &codes(&["R-134a", "R-410A"]), false)
            .expect("registration submitted");
        let approval = registrations
            .approve(&submitted.id, "officer.ramos")
            .expect("registration approved");
        self.clock.set(import_day());
        approval.registration
    }

    /// An import for 50 kg of R-134a that has arrived and has an inspection booked.
    pub(super) fn inspected_import(&self, registration: &Registration) -> ImportLicense {
        let imports = self.service.imports();
        let submitted = imports
            .submit(
                &importer(),
                &registration.id,
                vec![line_item("R-134a", 1, 50.0, "kg")],
            )
            .expect("import submitted");
        imports
            .mark_arrived(&submitted.id, Vec::new())
            .expect("arrived");
        imports
            .schedule_inspection(&submitted.id, at(2026, 2, 12))
            .expect("inspection scheduled")
    }

    pub(super) fn account(&self) -> ImporterAccount {
        self.store
            .fetch_account(&importer())
            .expect("fetch succeeds")
            .expect("account present")
    }
}
