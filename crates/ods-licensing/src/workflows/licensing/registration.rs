use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::catalog::RefrigerantCatalog;
use super::counters::{CounterName, SequenceAllocator};
use super::domain::{
    ImporterId, ObjectReference, RefrigerantSelection, Registration, RegistrationId,
    RegistrationState,
};
use super::error::LicensingError;
use super::repository::{dispatch, LicensingStore, Notification, NotificationKind, RepositoryError};
use super::service::Collaborators;

const ENTITY: &str = "registration";

/// When registrations are accepted, supplied by operator policy.
///
/// During the window month, registrations are taken for the calendar year that follows the
/// window (a December window registers the next year). Outside the window nothing is open unless
/// `override_open` is set, in which case the current calendar year is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationWindow {
    pub month: u32,
    pub override_open: bool,
}

impl Default for RegistrationWindow {
    fn default() -> Self {
        Self {
            month: 12,
            override_open: false,
        }
    }
}

impl RegistrationWindow {
    pub fn open_year(&self, today: NaiveDate) -> Option<i32> {
        if today.month() == self.month {
            if self.month == 12 {
                Some(today.year() + 1)
            } else {
                Some(today.year())
            }
        } else if self.override_open {
            Some(today.year())
        } else {
            None
        }
    }

    pub fn is_open_for(&self, today: NaiveDate, year: i32) -> bool {
        self.open_year(today) == Some(year)
    }
}

/// Returned by [`RegistrationWorkflow::approve`]; the certificate is absent when rendering failed.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationApproval {
    pub registration: Registration,
    pub certificate: Option<ObjectReference>,
}

/// State machine for yearly refrigerant registrations.
pub struct RegistrationWorkflow<S> {
    store: Arc<S>,
    counters: SequenceAllocator<S>,
    catalog: Arc<RefrigerantCatalog>,
    collaborators: Collaborators,
    window: RegistrationWindow,
    max_attempts: u32,
}

impl<S> RegistrationWorkflow<S>
where
    S: LicensingStore,
{
    pub fn new(
        store: Arc<S>,
        counters: SequenceAllocator<S>,
        catalog: Arc<RefrigerantCatalog>,
        collaborators: Collaborators,
        window: RegistrationWindow,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            counters,
            catalog,
            collaborators,
            window,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn window(&self) -> RegistrationWindow {
        self.window
    }

    /// Submit a registration for the open year.
    pub fn submit(
        &self,
        importer_id: &ImporterId,
        year: i32,
        refrigerant_codes: &[String],
        is_retail: bool,
    ) -> Result<Registration, LicensingError> {
        self.ensure_open(year)?;
        let selections = self.resolve_selections(refrigerant_codes)?;
        self.ensure_not_registered(importer_id, year)?;

        let now = self.collaborators.clock.now();
        let mut record = Registration::new(importer_id.clone(), year, selections, is_retail, now);
        record.transition(
            RegistrationState::Submitted,
            now,
            Some(importer_id.0.as_str()),
            None,
        );

        let stored = self.store.insert_registration(record)?;
        info!(
            registration = %stored.id,
            importer = %importer_id,
            year,
            refrigerants = stored.selected_refrigerants.len(),
            "registration submitted"
        );
        self.notify(&stored, NotificationKind::RegistrationSubmitted);
        Ok(stored)
    }

    /// Store an unsubmitted registration. The window is checked on [`Self::submit_draft`].
    pub fn save_draft(
        &self,
        importer_id: &ImporterId,
        year: i32,
        refrigerant_codes: &[String],
        is_retail: bool,
    ) -> Result<Registration, LicensingError> {
        let selections = self.resolve_selections(refrigerant_codes)?;
        let now = self.collaborators.clock.now();
        let record = Registration::new(importer_id.clone(), year, selections, is_retail, now);
        let stored = self.store.insert_registration(record)?;
        debug!(registration = %stored.id, importer = %importer_id, year, "registration draft saved");
        Ok(stored)
    }

    pub fn submit_draft(&self, id: &RegistrationId) -> Result<Registration, LicensingError> {
        let stored = self.transition(id, "submit", |workflow, record| {
            if !matches!(record.state, RegistrationState::Draft) {
                return Err(LicensingError::invalid_state(
                    ENTITY,
                    &record.id,
                    record.state.label(),
                    "submit",
                ));
            }
            workflow.ensure_open(record.year)?;
            workflow.ensure_not_registered(&record.importer_id, record.year)?;

            let now = workflow.collaborators.clock.now();
            let actor = record.importer_id.0.clone();
            record.transition(RegistrationState::Submitted, now, Some(&actor), None);
            Ok(())
        })?;

        info!(registration = %stored.id, importer = %stored.importer_id, year = stored.year, "registration draft submitted");
        self.notify(&stored, NotificationKind::RegistrationSubmitted);
        Ok(stored)
    }

    /// Approve a submitted registration and stamp its certificate number.
    pub fn approve(
        &self,
        id: &RegistrationId,
        approver: &str,
    ) -> Result<RegistrationApproval, LicensingError> {
        let approver = approver.trim();
        if approver.is_empty() {
            return Err(LicensingError::Validation(
                "approver identity is required".to_string(),
            ));
        }

        let mut certificate_number = None;
        let mut approved = None;
        for attempt in 1..=self.max_attempts {
            let mut record = self.load(id)?;
            if !record.state.is_pending() {
                return Err(LicensingError::invalid_state(
                    ENTITY,
                    id,
                    record.state.label(),
                    "approve",
                ));
            }
            if let Some(existing) = self.approved_for(&record.importer_id, record.year)? {
                // A competing approval of this same record landed between the two reads.
                if existing.id == record.id {
                    return Err(LicensingError::invalid_state(
                        ENTITY,
                        id,
                        existing.state.label(),
                        "approve",
                    ));
                }
                return Err(LicensingError::Precondition(format!(
                    "importer {} already holds approved registration {} for {}",
                    record.importer_id, existing.id, record.year
                )));
            }

            let number = match certificate_number {
                Some(number) => number,
                None => {
                    let number = self.counters.next(CounterName::RegistrationCert)?;
                    certificate_number = Some(number);
                    number
                }
            };

            let now = self.collaborators.clock.now();
            record.transition(
                RegistrationState::Approved {
                    certificate_number: number,
                    approved_by: approver.to_string(),
                    approved_at: now,
                },
                now,
                Some(approver),
                None,
            );

            match self.store.update_registration(record) {
                Ok(stored) => {
                    approved = Some(stored);
                    break;
                }
                Err(RepositoryError::Conflict) => {
                    debug!(registration = %id, attempt, "registration changed, re-evaluating approval");
                }
                Err(other) => return Err(other.into()),
            }
        }

        let registration = approved.ok_or_else(|| {
            LicensingError::ConcurrencyConflict(format!(
                "registration {id} contended for {} attempts",
                self.max_attempts
            ))
        })?;

        info!(
            registration = %registration.id,
            importer = %registration.importer_id,
            certificate_number = registration.certificate_number(),
            approver,
            "registration approved"
        );

        let certificate = match self
            .collaborators
            .documents
            .registration_certificate(&registration)
        {
            Ok(reference) => Some(reference),
            Err(err) => {
                warn!(registration = %registration.id, error = %err, "certificate rendering failed");
                None
            }
        };
        self.notify(&registration, NotificationKind::RegistrationApproved);

        Ok(RegistrationApproval {
            registration,
            certificate,
        })
    }

    pub fn reject(&self, id: &RegistrationId, reason: &str) -> Result<Registration, LicensingError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LicensingError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        let stored = self.transition(id, "reject", |workflow, record| {
            if !record.state.is_pending() {
                return Err(LicensingError::invalid_state(
                    ENTITY,
                    &record.id,
                    record.state.label(),
                    "reject",
                ));
            }
            let now = workflow.collaborators.clock.now();
            record.transition(
                RegistrationState::Rejected {
                    reason: reason.to_string(),
                    rejected_at: now,
                },
                now,
                None,
                Some(reason),
            );
            Ok(())
        })?;

        info!(registration = %stored.id, importer = %stored.importer_id, reason, "registration rejected");
        self.notify(&stored, NotificationKind::RegistrationRejected);
        Ok(stored)
    }

    pub fn get(&self, id: &RegistrationId) -> Result<Registration, LicensingError> {
        self.load(id)
    }

    /// The approved registration an importer holds for `year`, if any.
    pub fn approved_for(
        &self,
        importer_id: &ImporterId,
        year: i32,
    ) -> Result<Option<Registration>, LicensingError> {
        Ok(self
            .store
            .registrations_for(importer_id, year)?
            .into_iter()
            .find(|record| record.state.is_approved()))
    }

    fn load(&self, id: &RegistrationId) -> Result<Registration, LicensingError> {
        self.store
            .fetch_registration(id)?
            .ok_or_else(|| LicensingError::not_found(ENTITY, id))
    }

    /// Re-read, mutate and write until the optimistic write lands or the closure refuses.
    fn transition<F>(
        &self,
        id: &RegistrationId,
        action: &'static str,
        mut apply: F,
    ) -> Result<Registration, LicensingError>
    where
        F: FnMut(&Self, &mut Registration) -> Result<(), LicensingError>,
    {
        for attempt in 1..=self.max_attempts {
            let mut record = self.load(id)?;
            apply(self, &mut record)?;
            match self.store.update_registration(record) {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::Conflict) => {
                    debug!(registration = %id, action, attempt, "registration changed, retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(LicensingError::ConcurrencyConflict(format!(
            "registration {id} contended for {} attempts",
            self.max_attempts
        )))
    }

    fn ensure_open(&self, year: i32) -> Result<(), LicensingError> {
        let today = self.collaborators.clock.today();
        if self.window.is_open_for(today, year) {
            return Ok(());
        }
        let detail = match self.window.open_year(today) {
            Some(open) => format!("registration is open for {open}, not {year}"),
            None => format!("registration for {year} is closed"),
        };
        Err(LicensingError::Validation(detail))
    }

    fn ensure_not_registered(
        &self,
        importer_id: &ImporterId,
        year: i32,
    ) -> Result<(), LicensingError> {
        if let Some(existing) = self.approved_for(importer_id, year)? {
            return Err(LicensingError::Precondition(format!(
                "importer {importer_id} already holds approved registration {} for {year}",
                existing.id
            )));
        }
        Ok(())
    }

    fn resolve_selections(
        &self,
        codes: &[String],
    ) -> Result<Vec<RefrigerantSelection>, LicensingError> {
        let mut selections: Vec<RefrigerantSelection> = Vec::with_capacity(codes.len());
        for code in codes {
            let entry = self.catalog.get(code).ok_or_else(|| {
                LicensingError::Validation(format!("refrigerant {} is not in the catalog", code.trim()))
            })?;
            if selections
                .iter()
                .any(|selection| selection.code == entry.code)
            {
                continue;
            }
            selections.push(RefrigerantSelection {
                code: entry.code.clone(),
                gwp: entry.gwp,
                restricted: entry.restricted,
            });
        }

        if selections.is_empty() {
            return Err(LicensingError::Validation(
                "at least one refrigerant must be selected".to_string(),
            ));
        }
        Ok(selections)
    }

    fn notify(&self, record: &Registration, kind: NotificationKind) {
        let mut notification = Notification::new(kind, &record.importer_id, record.id.0.clone())
            .with_detail("year", record.year)
            .with_detail("state", record.state.label());
        if let Some(number) = record.certificate_number() {
            notification = notification.with_detail("certificate_number", number);
        }
        if let RegistrationState::Rejected { reason, .. } = &record.state {
            notification = notification.with_detail("reason", reason);
        }
        dispatch(self.collaborators.notifier.as_ref(), notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn december_window_opens_next_year() {
        let window = RegistrationWindow::default();
        assert_eq!(window.open_year(date(2025, 12, 1)), Some(2026));
        assert_eq!(window.open_year(date(2025, 11, 30)), None);
        assert!(!window.is_open_for(date(2025, 12, 15), 2025));
    }

    #[test]
    fn override_opens_current_year_outside_window() {
        let window = RegistrationWindow {
            month: 12,
            override_open: true,
        };
        assert_eq!(window.open_year(date(2026, 3, 10)), Some(2026));
        assert_eq!(window.open_year(date(2026, 12, 10)), Some(2027));
    }

    #[test]
    fn non_december_window_registers_current_year() {
        let window = RegistrationWindow {
            month: 1,
            override_open: false,
        };
        assert_eq!(window.open_year(date(2026, 1, 20)), Some(2026));
        assert_eq!(window.open_year(date(2026, 2, 1)), None);
    }
}
