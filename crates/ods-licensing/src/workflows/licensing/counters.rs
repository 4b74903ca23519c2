use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::LicensingError;
use super::repository::RepositoryError;

/// The independent sequences used to mint human-facing numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CounterName {
    RegistrationCert,
    ImportLicense,
    ImporterNumber,
    TechnicianCert,
}

impl CounterName {
    pub const ALL: [Self; 4] = [
        Self::RegistrationCert,
        Self::ImportLicense,
        Self::ImporterNumber,
        Self::TechnicianCert,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::RegistrationCert => "registrationCert",
            Self::ImportLicense => "importLicense",
            Self::ImporterNumber => "importerNumber",
            Self::TechnicianCert => "technicianCert",
        }
    }
}

impl fmt::Display for CounterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Starting values; the first allocation returns `seed + 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSeeds {
    pub registration_cert: u64,
    pub import_license: u64,
    pub importer_number: u64,
    pub technician_cert: u64,
}

impl CounterSeeds {
    pub const fn seed_for(&self, counter: CounterName) -> u64 {
        match counter {
            CounterName::RegistrationCert => self.registration_cert,
            CounterName::ImportLicense => self.import_license,
            CounterName::ImporterNumber => self.importer_number,
            CounterName::TechnicianCert => self.technician_cert,
        }
    }
}

/// Counter rows in durable storage.
pub trait SequenceStore: Send + Sync {
    /// Last value handed out, or the seed when nothing has been allocated yet.
    fn current(&self, counter: CounterName) -> Result<u64, RepositoryError>;

    /// Replace `expected` with `next`. Fails with [`RepositoryError::Conflict`] when the stored
    /// value is no longer `expected`.
    fn compare_and_swap(
        &self,
        counter: CounterName,
        expected: u64,
        next: u64,
    ) -> Result<(), RepositoryError>;
}

/// Allocates strictly increasing values through a compare-and-swap loop on the counter row.
pub struct SequenceAllocator<S> {
    store: Arc<S>,
    max_attempts: u32,
}

impl<S> Clone for SequenceAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

impl<S> SequenceAllocator<S>
where
    S: SequenceStore,
{
    pub fn new(store: Arc<S>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn next(&self, counter: CounterName) -> Result<u64, LicensingError> {
        for attempt in 1..=self.max_attempts {
            let current = self.store.current(counter)?;
            let next = current.checked_add(1).ok_or_else(|| {
                LicensingError::Validation(format!("counter {counter} is exhausted"))
            })?;

            match self.store.compare_and_swap(counter, current, next) {
                Ok(()) => {
                    debug!(counter = counter.label(), value = next, "allocated sequence value");
                    return Ok(next);
                }
                Err(RepositoryError::Conflict) => {
                    debug!(counter = counter.label(), attempt, "counter moved, retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(
            counter = counter.label(),
            attempts = self.max_attempts,
            "counter allocation gave up under contention"
        );
        Err(LicensingError::ConcurrencyConflict(format!(
            "counter {counter} contended for {} attempts",
            self.max_attempts
        )))
    }

    pub fn peek(&self, counter: CounterName) -> Result<u64, LicensingError> {
        Ok(self.store.current(counter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakyCounters {
        values: Mutex<HashMap<CounterName, u64>>,
        conflicts_left: AtomicU32,
    }

    impl SequenceStore for FlakyCounters {
        fn current(&self, counter: CounterName) -> Result<u64, RepositoryError> {
            let guard = self.values.lock().expect("counter mutex poisoned");
            Ok(guard.get(&counter).copied().unwrap_or(0))
        }

        fn compare_and_swap(
            &self,
            counter: CounterName,
            expected: u64,
            next: u64,
        ) -> Result<(), RepositoryError> {
            if self.conflicts_left.load(Ordering::SeqCst) > 0 {
                self.conflicts_left.fetch_sub(1, Ordering::SeqCst);
                return Err(RepositoryError::Conflict);
            }
            let mut guard = self.values.lock().expect("counter mutex poisoned");
            let slot = guard.entry(counter).or_insert(0);
            if *slot != expected {
                return Err(RepositoryError::Conflict);
            }
            *slot = next;
            Ok(())
        }
    }

    #[test]
    fn retries_through_transient_conflicts() {
        let store = Arc::new(FlakyCounters::default());
        store.conflicts_left.store(2, Ordering::SeqCst);
        let allocator = SequenceAllocator::new(store, 3);

        assert_eq!(allocator.next(CounterName::TechnicianCert).expect("allocates"), 1);
        assert_eq!(allocator.next(CounterName::TechnicianCert).expect("allocates"), 2);
        assert_eq!(allocator.peek(CounterName::TechnicianCert).expect("reads"), 2);
    }

    #[test]
    fn surfaces_conflict_after_bounded_attempts() {
        let store = Arc::new(FlakyCounters::default());
        store.conflicts_left.store(10, Ordering::SeqCst);
        let allocator = SequenceAllocator::new(store, 3);

        let err = allocator
            .next(CounterName::ImportLicense)
            .expect_err("contention exhausts attempts");
        assert!(err.is_retryable());
    }

    #[test]
    fn counters_are_independent() {
        let store = Arc::new(FlakyCounters::default());
        let allocator = SequenceAllocator::new(store, 1);

        allocator.next(CounterName::ImportLicense).expect("allocates");
        allocator.next(CounterName::ImportLicense).expect("allocates");
        assert_eq!(allocator.next(CounterName::RegistrationCert).expect("allocates"), 1);
        assert_eq!(allocator.peek(CounterName::ImporterNumber).expect("reads"), 0);
    }

    #[test]
    fn seeds_map_to_counters() {
        let seeds = CounterSeeds {
            registration_cert: 1000,
            import_license: 2000,
            importer_number: 0,
            technician_cert: 7,
        };
        let seeded: Vec<u64> = CounterName::ALL
            .iter()
            .map(|counter| seeds.seed_for(*counter))
            .collect();
        assert_eq!(seeded, vec![1000, 2000, 0, 7]);
    }
}
