use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};

use crate::workflows::licensing::{CounterName, CounterSeeds, InMemoryLicensingStore, SequenceAllocator};

#[test]
fn concurrent_allocations_are_unique_and_dense() {
    let store = Arc::new(InMemoryLicensingStore::new());
    let allocator = SequenceAllocator::new(store, 128);
    let threads = 8;
    let per_thread = 10;
    let barrier = Barrier::new(threads);

    let numbers: Vec<u64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let allocator = &allocator;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    (0..per_thread)
                        .map(|_| {
                            allocator
                                .next(CounterName::ImportLicense)
                                .expect("allocation succeeds")
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("thread completes"))
            .collect()
    });

    let total = (threads * per_thread) as u64;
    let distinct: BTreeSet<u64> = numbers.iter().copied().collect();
    assert_eq!(distinct.len() as u64, total);
    assert_eq!(distinct.first().copied(), Some(1));
    assert_eq!(distinct.last().copied(), Some(total));
    assert_eq!(
        allocator.peek(CounterName::ImportLicense).expect("reads"),
        total
    );
}

#[test]
fn counters_advance_independently_from_seeds() {
    let store = Arc::new(InMemoryLicensingStore::with_seeds(CounterSeeds {
        registration_cert: 2_400,
        import_license: 180,
        ..CounterSeeds::default()
    }));
    let allocator = SequenceAllocator::new(store, 8);

    assert_eq!(allocator.next(CounterName::RegistrationCert).expect("next"), 2_401);
    assert_eq!(allocator.next(CounterName::ImportLicense).expect("next"), 181);
    assert_eq!(allocator.next(CounterName::ImportLicense).expect("next"), 182);
    assert_eq!(allocator.next(CounterName::TechnicianCert).expect("next"), 1);
    assert_eq!(allocator.peek(CounterName::ImporterNumber).expect("peek"), 0);
    assert_eq!(allocator.peek(CounterName::RegistrationCert).expect("peek"), 2_401);
}
