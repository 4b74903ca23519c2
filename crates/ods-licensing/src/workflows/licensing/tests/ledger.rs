use std::sync::Barrier;

use super::common::*;
use crate::workflows::licensing::domain::{ImporterAccount, ImporterId};
use crate::workflows::licensing::repository::LicensingStore;
use crate::workflows::licensing::{CounterName, LicensingError};

#[test]
fn debit_updates_account() {
    let harness = harness();
    let ledger = harness.service.ledger();

    let outcome = ledger.debit(&importer(), 12_345.67).expect("debited");
    assert_eq!(outcome.previous_cumulative, 0.0);
    assert_eq!(outcome.cumulative_imports, 12_345.67);
    assert_eq!(
        ledger.account(&importer()).expect("present").cumulative_imports,
        12_345.67
    );
}

#[test]
fn debit_for_unknown_importer_is_not_found() {
    let harness = harness();
    let missing = ImporterId("importer-nobody".to_string());
    assert!(matches!(
        harness.service.ledger().debit(&missing, 10.0),
        Err(LicensingError::NotFound { .. })
    ));
}

#[test]
fn concurrent_debits_are_all_recorded() {
    let harness = harness();
    let ledger = harness.service.ledger();
    let threads = 12;
    let barrier = Barrier::new(threads);

    std::thread::scope(|scope| {
        for _ in 0..threads {
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                ledger.debit(&importer(), 250.0).expect("debit lands");
            });
        }
    });

    let account = harness.account();
    assert_eq!(account.cumulative_imports, 250.0 * threads as f64);
    assert_eq!(account.balance(), QUOTA - 250.0 * threads as f64);
}

#[test]
fn importer_number_is_assigned_once() {
    let harness = harness();
    let ledger = harness.service.ledger();

    let first = ledger.assign_importer_number(&importer()).expect("assigned");
    let again = ledger.assign_importer_number(&importer()).expect("stable");
    assert_eq!(first, again);
    assert_eq!(harness.account().importer_number, Some(first));

    let other = ImporterId("importer-frost".to_string());
    harness
        .store
        .insert_account(ImporterAccount::new(other.clone(), 5_000.0))
        .expect("provisioned");
    let second = ledger.assign_importer_number(&other).expect("assigned");
    assert_eq!(second, first + 1);
    assert_eq!(
        harness
            .service
            .counters()
            .peek(CounterName::ImporterNumber)
            .expect("reads"),
        2
    );
}

#[test]
fn importer_number_skips_numbers_already_held() {
    let harness = harness();
    let legacy = ImporterId("importer-legacy".to_string());
    let mut provisioned = ImporterAccount::new(legacy.clone(), 5_000.0);
    provisioned.importer_number = Some(1);
    harness
        .store
        .insert_account(provisioned)
        .expect("provisioned");

    let ledger = harness.service.ledger();
    let assigned = ledger.assign_importer_number(&importer()).expect("assigned");

    assert_eq!(assigned, 2);
    assert_eq!(harness.account().importer_number, Some(2));
    assert_eq!(
        ledger.account(&legacy).expect("present").importer_number,
        Some(1)
    );
    assert_eq!(
        harness
            .service
            .counters()
            .peek(CounterName::ImporterNumber)
            .expect("reads"),
        2
    );
}
