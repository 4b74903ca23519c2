use std::sync::Arc;

use super::catalog::RefrigerantCatalog;
use super::clock::Clock;
use super::co2::{Co2Calculator, UnknownFactorPolicy};
use super::counters::SequenceAllocator;
use super::import::ImportLicenseWorkflow;
use super::ledger::{QuotaLedger, QuotaPolicy};
use super::registration::{RegistrationWindow, RegistrationWorkflow};
use super::repository::{DocumentGenerator, LicensingStore, NotificationSender, ObjectStorage};

/// External collaborators shared by both workflows.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn NotificationSender>,
    pub documents: Arc<dyn DocumentGenerator>,
    pub objects: Arc<dyn ObjectStorage>,
}

/// Policy knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub window: RegistrationWindow,
    pub quota_policy: QuotaPolicy,
    pub unknown_factor_policy: UnknownFactorPolicy,
    /// Bound on optimistic-write retries for counters, debits and transitions.
    pub max_conflict_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            window: RegistrationWindow::default(),
            quota_policy: QuotaPolicy::default(),
            unknown_factor_policy: UnknownFactorPolicy::default(),
            max_conflict_retries: 8,
        }
    }
}

/// Service composing the workflows, the ledger and the counter allocator over one store.
pub struct LicensingService<S> {
    registrations: RegistrationWorkflow<S>,
    imports: ImportLicenseWorkflow<S>,
    ledger: QuotaLedger<S>,
    counters: SequenceAllocator<S>,
    catalog: Arc<RefrigerantCatalog>,
}

impl<S> LicensingService<S>
where
    S: LicensingStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        catalog: Arc<RefrigerantCatalog>,
        collaborators: Collaborators,
        settings: EngineSettings,
    ) -> Self {
        let attempts = settings.max_conflict_retries;
        let counters = SequenceAllocator::new(store.clone(), attempts);

        let registrations = RegistrationWorkflow::new(
            store.clone(),
            counters.clone(),
            catalog.clone(),
            collaborators.clone(),
            settings.window,
            attempts,
        );
        let imports = ImportLicenseWorkflow::new(
            store.clone(),
            counters.clone(),
            Co2Calculator::new(settings.unknown_factor_policy),
            collaborators,
            settings.quota_policy,
            attempts,
        );
        let ledger = QuotaLedger::new(store, counters.clone(), settings.quota_policy, attempts);

        Self {
            registrations,
            imports,
            ledger,
            counters,
            catalog,
        }
    }

    pub fn registrations(&self) -> &RegistrationWorkflow<S> {
        &self.registrations
    }

    pub fn imports(&self) -> &ImportLicenseWorkflow<S> {
        &self.imports
    }

    pub fn ledger(&self) -> &QuotaLedger<S> {
        &self.ledger
    }

    pub fn counters(&self) -> &SequenceAllocator<S> {
        &self.counters
    }

    pub fn catalog(&self) -> &RefrigerantCatalog {
        &self.catalog
    }
}
