//! Licensing workflow and quota accounting for ODS importers.
//!
//! A [`Registration`] authorises an importer to handle a set of refrigerants for one year. Once
//! approved, [`ImportLicense`] requests can be opened against it; approving an import recomputes
//! its CO2-equivalent total and debits the importer's quota in the same store transaction.
//! Certificate, license, importer and technician numbers come from [`SequenceAllocator`].
//!
//! Storage, rendering, notification and object storage are supplied through the traits in
//! [`repository`]; [`InMemoryLicensingStore`] is the reference store.

pub mod catalog;
pub mod clock;
pub mod co2;
pub mod counters;
pub mod domain;
pub mod error;
pub mod import;
pub mod ledger;
pub mod memory;
pub mod registration;
pub mod repository;
pub mod service;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogEntry, CatalogError, RefrigerantCatalog};
pub use clock::{Clock, FixedClock, SystemClock};
pub use co2::{round_co2, CalculationError, Co2Calculator, MassUnit, UnknownFactorPolicy};
pub use counters::{CounterName, CounterSeeds, SequenceAllocator, SequenceStore};
pub use domain::{
    ImportId, ImportLicense, ImportState, ImporterAccount, ImporterId, LineItem, LineItemRequest,
    ObjectReference, RefrigerantSelection, Registration, RegistrationId, RegistrationState,
    TransitionRecord,
};
pub use error::LicensingError;
pub use import::{ImportApproval, ImportLicenseWorkflow, SignatureImage};
pub use ledger::{apply_debit, DebitOutcome, QuotaLedger, QuotaPolicy};
pub use memory::InMemoryLicensingStore;
pub use registration::{RegistrationApproval, RegistrationWindow, RegistrationWorkflow};
pub use repository::{
    DocumentError, DocumentGenerator, LicensingStore, Notification, NotificationError,
    NotificationKind, NotificationSender, ObjectStorage, RepositoryError, StorageError,
};
pub use service::{Collaborators, EngineSettings, LicensingService};
