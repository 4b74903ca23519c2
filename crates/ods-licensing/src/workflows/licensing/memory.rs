use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::counters::{CounterName, CounterSeeds, SequenceStore};
use super::domain::{
    ImportId, ImportLicense, ImporterAccount, ImporterId, Registration, RegistrationId,
};
use super::repository::{LicensingStore, RepositoryError};

/// Mutex-guarded reference store. A single lock makes every write, including the combined
/// approval commit, serializable.
#[derive(Debug, Default)]
pub struct InMemoryLicensingStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    registrations: HashMap<RegistrationId, Registration>,
    imports: HashMap<ImportId, ImportLicense>,
    accounts: HashMap<ImporterId, ImporterAccount>,
    counters: BTreeMap<CounterName, u64>,
}

impl InMemoryLicensingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seeds(seeds: CounterSeeds) -> Self {
        let counters = CounterName::ALL
            .iter()
            .map(|counter| (*counter, seeds.seed_for(*counter)))
            .collect();
        Self {
            state: Mutex::new(StoreState {
                counters,
                ..StoreState::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }
}

fn check_version(stored: u64, incoming: u64) -> Result<(), RepositoryError> {
    if stored == incoming {
        Ok(())
    } else {
        Err(RepositoryError::Conflict)
    }
}

impl StoreState {
    fn check_import(&self, record: &ImportLicense) -> Result<(), RepositoryError> {
        let stored = self
            .imports
            .get(&record.id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "import",
                id: record.id.to_string(),
            })?;
        check_version(stored.version, record.version)
    }

    fn check_account(&self, account: &ImporterAccount) -> Result<(), RepositoryError> {
        let stored =
            self.accounts
                .get(&account.importer_id)
                .ok_or_else(|| RepositoryError::NotFound {
                    entity: "importer account",
                    id: account.importer_id.to_string(),
                })?;
        check_version(stored.version, account.version)
    }

    fn check_importer_number(&self, account: &ImporterAccount) -> Result<(), RepositoryError> {
        let Some(number) = account.importer_number else {
            return Ok(());
        };
        let holder = self.accounts.values().find(|other| {
            other.importer_id != account.importer_id && other.importer_number == Some(number)
        });
        match holder {
            Some(other) => Err(RepositoryError::Constraint(format!(
                "importer number {number} is already assigned to {}",
                other.importer_id
            ))),
            None => Ok(()),
        }
    }
}

impl SequenceStore for InMemoryLicensingStore {
    fn current(&self, counter: CounterName) -> Result<u64, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.counters.get(&counter).copied().unwrap_or(0))
    }

    fn compare_and_swap(
        &self,
        counter: CounterName,
        expected: u64,
        next: u64,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let slot = guard.counters.entry(counter).or_insert(0);
        if *slot != expected {
            return Err(RepositoryError::Conflict);
        }
        *slot = next;
        Ok(())
    }
}

impl LicensingStore for InMemoryLicensingStore {
    fn insert_registration(&self, record: Registration) -> Result<Registration, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.registrations.contains_key(&record.id) {
            return Err(RepositoryError::Constraint(format!(
                "registration {} already exists",
                record.id
            )));
        }
        guard.registrations.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_registration(
        &self,
        mut record: Registration,
    ) -> Result<Registration, RepositoryError> {
        let mut guard = self.lock()?;
        let stored = guard
            .registrations
            .get(&record.id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "registration",
                id: record.id.to_string(),
            })?;
        check_version(stored.version, record.version)?;

        if record.state.is_approved() {
            let duplicate = guard.registrations.values().any(|other| {
                other.id != record.id
                    && other.importer_id == record.importer_id
                    && other.year == record.year
                    && other.state.is_approved()
            });
            if duplicate {
                return Err(RepositoryError::Constraint(format!(
                    "importer {} already holds an approved registration for {}",
                    record.importer_id, record.year
                )));
            }
        }

        record.version += 1;
        guard.registrations.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch_registration(
        &self,
        id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.registrations.get(id).cloned())
    }

    fn registrations_for(
        &self,
        importer_id: &ImporterId,
        year: i32,
    ) -> Result<Vec<Registration>, RepositoryError> {
        let guard = self.lock()?;
        let mut matches: Vec<Registration> = guard
            .registrations
            .values()
            .filter(|record| &record.importer_id == importer_id && record.year == year)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matches)
    }

    fn insert_import(&self, record: ImportLicense) -> Result<ImportLicense, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.imports.contains_key(&record.id) {
            return Err(RepositoryError::Constraint(format!(
                "import {} already exists",
                record.id
            )));
        }
        guard.imports.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_import(&self, mut record: ImportLicense) -> Result<ImportLicense, RepositoryError> {
        let mut guard = self.lock()?;
        guard.check_import(&record)?;
        record.version += 1;
        guard.imports.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch_import(&self, id: &ImportId) -> Result<Option<ImportLicense>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.imports.get(id).cloned())
    }

    fn imports_for(&self, importer_id: &ImporterId) -> Result<Vec<ImportLicense>, RepositoryError> {
        let guard = self.lock()?;
        let mut matches: Vec<ImportLicense> = guard
            .imports
            .values()
            .filter(|record| &record.importer_id == importer_id)
            .cloned()
            .collect();
        matches.sort_by_key(|record| record.import_number);
        Ok(matches)
    }

    fn insert_account(&self, account: ImporterAccount) -> Result<ImporterAccount, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.accounts.contains_key(&account.importer_id) {
            return Err(RepositoryError::Constraint(format!(
                "importer account {} already exists",
                account.importer_id
            )));
        }
        guard.check_importer_number(&account)?;
        guard
            .accounts
            .insert(account.importer_id.clone(), account.clone());
        Ok(account)
    }

    fn fetch_account(
        &self,
        importer_id: &ImporterId,
    ) -> Result<Option<ImporterAccount>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.accounts.get(importer_id).cloned())
    }

    fn update_account(
        &self,
        mut account: ImporterAccount,
    ) -> Result<ImporterAccount, RepositoryError> {
        let mut guard = self.lock()?;
        guard.check_account(&account)?;
        guard.check_importer_number(&account)?;
        account.version += 1;
        guard
            .accounts
            .insert(account.importer_id.clone(), account.clone());
        Ok(account)
    }

    fn commit_import_approval(
        &self,
        mut import: ImportLicense,
        mut account: ImporterAccount,
    ) -> Result<(ImportLicense, ImporterAccount), RepositoryError> {
        let mut guard = self.lock()?;
        guard.check_import(&import)?;
        guard.check_account(&account)?;
        guard.check_importer_number(&account)?;

        import.version += 1;
        account.version += 1;
        guard.imports.insert(import.id.clone(), import.clone());
        guard
            .accounts
            .insert(account.importer_id.clone(), account.clone());
        Ok((import, account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn importer() -> ImporterId {
        ImporterId("importer-1".to_string())
    }

    #[test]
    fn stale_account_write_conflicts() {
        let store = InMemoryLicensingStore::new();
        let account = store
            .insert_account(ImporterAccount::new(importer(), 1000.0))
            .expect("provisioned");

        let mut first = account.clone();
        first.cumulative_imports = 10.0;
        let stored = store.update_account(first).expect("first writer wins");
        assert_eq!(stored.version, 1);

        let mut second = account;
        second.cumulative_imports = 20.0;
        assert_eq!(store.update_account(second), Err(RepositoryError::Conflict));

        let current = store
            .fetch_account(&importer())
            .expect("fetch")
            .expect("present");
        assert_eq!(current.cumulative_imports, 10.0);
    }

    #[test]
    fn seeds_become_counter_start() {
        let store = InMemoryLicensingStore::with_seeds(CounterSeeds {
            registration_cert: 1000,
            ..CounterSeeds::default()
        });
        assert_eq!(store.current(CounterName::RegistrationCert).expect("reads"), 1000);
        assert_eq!(store.current(CounterName::ImportLicense).expect("reads"), 0);
        assert_eq!(
            store.compare_and_swap(CounterName::RegistrationCert, 999, 1000),
            Err(RepositoryError::Conflict)
        );
        store
            .compare_and_swap(CounterName::RegistrationCert, 1000, 1001)
            .expect("swaps");
    }

    #[test]
    fn duplicate_importer_number_is_rejected() {
        let store = InMemoryLicensingStore::new();
        let mut first = ImporterAccount::new(importer(), 0.0);
        first.importer_number = Some(7);
        store.insert_account(first).expect("provisioned");

        let mut second = ImporterAccount::new(ImporterId("importer-2".to_string()), 0.0);
        second.importer_number = Some(7);
        assert!(matches!(
            store.insert_account(second),
            Err(RepositoryError::Constraint(_))
        ));
    }

    #[test]
    fn update_cannot_take_another_accounts_importer_number() {
        let store = InMemoryLicensingStore::new();
        let mut holder = ImporterAccount::new(importer(), 0.0);
        holder.importer_number = Some(3);
        store.insert_account(holder).expect("provisioned");
        let mut other = store
            .insert_account(ImporterAccount::new(ImporterId("importer-2".to_string()), 0.0))
            .expect("provisioned");

        other.importer_number = Some(3);
        assert!(matches!(
            store.update_account(other.clone()),
            Err(RepositoryError::Constraint(_))
        ));

        other.importer_number = Some(4);
        let stored = store.update_account(other).expect("free number accepted");
        assert_eq!(stored.importer_number, Some(4));

        let mut holder = store
            .fetch_account(&importer())
            .expect("fetch")
            .expect("present");
        holder.cumulative_imports = 5.0;
        store
            .update_account(holder)
            .expect("keeping its own number is fine");
    }
}
