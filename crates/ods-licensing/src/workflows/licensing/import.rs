use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::co2::Co2Calculator;
use super::counters::{CounterName, SequenceAllocator};
use super::domain::{
    ImportId, ImportLicense, ImportState, ImporterAccount, ImporterId, LineItem, LineItemRequest,
    ObjectReference, RegistrationId, TransitionRecord,
};
use super::error::LicensingError;
use super::ledger::{apply_debit, DebitOutcome, QuotaPolicy};
use super::repository::{dispatch, LicensingStore, Notification, NotificationKind, RepositoryError};
use super::service::Collaborators;

const ENTITY: &str = "import";

/// Signature image captured from the approving officer.
#[derive(Debug, Clone)]
pub struct SignatureImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SignatureImage {
    fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/svg+xml" => "svg",
            _ => "bin",
        }
    }
}

/// Everything produced by a successful import approval.
#[derive(Debug, Clone, Serialize)]
pub struct ImportApproval {
    pub import: ImportLicense,
    pub account: ImporterAccount,
    pub debit: DebitOutcome,
    pub license_document: Option<ObjectReference>,
}

/// State machine for import license requests, including the approval fan-out to the ledger.
pub struct ImportLicenseWorkflow<S> {
    store: Arc<S>,
    counters: SequenceAllocator<S>,
    calculator: Co2Calculator,
    collaborators: Collaborators,
    quota_policy: QuotaPolicy,
    max_attempts: u32,
}

impl<S> ImportLicenseWorkflow<S>
where
    S: LicensingStore,
{
    pub fn new(
        store: Arc<S>,
        counters: SequenceAllocator<S>,
        calculator: Co2Calculator,
        collaborators: Collaborators,
        quota_policy: QuotaPolicy,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            counters,
            calculator,
            collaborators,
            quota_policy,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Open an import against an approved registration for the current year.
    pub fn submit(
        &self,
        importer_id: &ImporterId,
        registration_id: &RegistrationId,
        requests: Vec<LineItemRequest>,
    ) -> Result<ImportLicense, LicensingError> {
        let registration = self
            .store
            .fetch_registration(registration_id)?
            .ok_or_else(|| LicensingError::not_found("registration", registration_id))?;

        if &registration.importer_id != importer_id {
            return Err(LicensingError::Precondition(format!(
                "registration {registration_id} does not belong to importer {importer_id}"
            )));
        }
        if !registration.state.is_approved() {
            return Err(LicensingError::Precondition(format!(
                "registration {registration_id} is {}, imports require an approved registration",
                registration.state.label()
            )));
        }
        let now = self.collaborators.clock.now();
        let current_year = now.year();
        if registration.year != current_year {
            return Err(LicensingError::Precondition(format!(
                "registration {registration_id} covers {}, not the current year {current_year}",
                registration.year
            )));
        }

        if requests.is_empty() {
            return Err(LicensingError::Validation(
                "an import needs at least one line item".to_string(),
            ));
        }
        let mut line_items = Vec::with_capacity(requests.len());
        for request in requests {
            if request.quantity == 0 {
                return Err(LicensingError::Validation(format!(
                    "quantity for {} must be at least 1",
                    request.refrigerant_code
                )));
            }
            if !request.volume.is_finite() || request.volume <= 0.0 {
                return Err(LicensingError::Validation(format!(
                    "volume for {} must be greater than zero",
                    request.refrigerant_code
                )));
            }
            let selection = registration
                .selection(&request.refrigerant_code)
                .ok_or_else(|| {
                    LicensingError::Validation(format!(
                        "{} is not on registration {registration_id}",
                        request.refrigerant_code.trim()
                    ))
                })?;
            line_items.push(LineItem {
                refrigerant_code: selection.code.clone(),
                quantity: request.quantity,
                volume: request.volume,
                unit: request.unit.trim().to_string(),
                gwp: selection.gwp,
            });
        }

        let total_co2_equivalent = self.calculator.total(&line_items)?;
        let import_number = self.counters.next(CounterName::ImportLicense)?;

        let mut record = ImportLicense {
            id: ImportId::generate(),
            importer_id: importer_id.clone(),
            registration_id: registration_id.clone(),
            year: registration.year,
            import_number,
            line_items,
            state: ImportState::AwaitingArrival,
            total_co2_equivalent,
            inspection_at: None,
            supporting_documents: Vec::new(),
            submitted_at: now,
            transitions: Vec::new(),
            version: 0,
        };
        record.transitions.push(TransitionRecord {
            from: "new".to_string(),
            to: record.state.label().to_string(),
            at: now,
            actor: Some(importer_id.0.clone()),
            note: None,
        });

        let stored = self.store.insert_import(record)?;
        info!(
            import = %stored.id,
            import_number,
            importer = %importer_id,
            total_co2_equivalent,
            "import submitted"
        );
        self.notify(&stored, NotificationKind::ImportSubmitted);
        Ok(stored)
    }

    pub fn mark_arrived(
        &self,
        id: &ImportId,
        supporting_documents: Vec<ObjectReference>,
    ) -> Result<ImportLicense, LicensingError> {
        let stored = self.transition(id, "mark arrived", |workflow, record| {
            workflow.require(record, &ImportState::AwaitingArrival, "mark arrived")?;
            let now = workflow.collaborators.clock.now();
            record
                .supporting_documents
                .extend(supporting_documents.iter().cloned());
            record.transition(ImportState::AwaitingInspectionSchedule, now, None, None);
            Ok(())
        })?;

        info!(import = %stored.id, documents = stored.supporting_documents.len(), "import arrived");
        self.notify(&stored, NotificationKind::ImportArrived);
        Ok(stored)
    }

    pub fn schedule_inspection(
        &self,
        id: &ImportId,
        when: DateTime<Utc>,
    ) -> Result<ImportLicense, LicensingError> {
        let stored = self.transition(id, "schedule inspection", |workflow, record| {
            workflow.require(
                record,
                &ImportState::AwaitingInspectionSchedule,
                "schedule inspection",
            )?;
            let now = workflow.collaborators.clock.now();
            if when <= now {
                return Err(LicensingError::Validation(format!(
                    "inspection time {when} must be in the future"
                )));
            }
            record.inspection_at = Some(when);
            record.transition(ImportState::InspectionScheduled, now, None, None);
            Ok(())
        })?;

        info!(import = %stored.id, inspection_at = %when, "inspection scheduled");
        self.notify(&stored, NotificationKind::InspectionScheduled);
        Ok(stored)
    }

    /// Freeze the import as approved and debit the importer's quota in one store transaction.
    pub fn approve(
        &self,
        id: &ImportId,
        approver: &str,
        signature: SignatureImage,
    ) -> Result<ImportApproval, LicensingError> {
        let approver = approver.trim();
        if approver.is_empty() {
            return Err(LicensingError::Validation(
                "approver identity is required".to_string(),
            ));
        }

        let record = self.load(id)?;
        self.require(&record, &ImportState::InspectionScheduled, "approve")?;
        // Quota and validation failures surface before the signature is stored.
        self.settle(&record)?;

        let key = format!("signatures/{}.{}", id, signature.extension());
        let signature = self
            .collaborators
            .objects
            .put(&key, &signature.content_type, &signature.bytes)?;

        let mut committed = None;
        for attempt in 1..=self.max_attempts {
            let mut record = self.load(id)?;
            self.require(&record, &ImportState::InspectionScheduled, "approve")?;

            let (total, debited, debit) = self.settle(&record)?;

            let now = self.collaborators.clock.now();
            record.total_co2_equivalent = total;
            record.transition(
                ImportState::Approved {
                    approved_by: approver.to_string(),
                    approved_at: now,
                    signature: signature.clone(),
                },
                now,
                Some(approver),
                None,
            );

            match self.store.commit_import_approval(record, debited) {
                Ok((import, account)) => {
                    committed = Some((import, account, debit));
                    break;
                }
                Err(RepositoryError::Conflict) => {
                    debug!(import = %id, attempt, "import or account changed, re-evaluating approval");
                }
                Err(other) => return Err(other.into()),
            }
        }

        let (import, account, debit) = committed.ok_or_else(|| {
            LicensingError::ConcurrencyConflict(format!(
                "approval of import {id} contended for {} attempts",
                self.max_attempts
            ))
        })?;

        if debit.overage > 0.0 {
            warn!(
                import = %import.id,
                importer = %import.importer_id,
                overage = debit.overage,
                "approved import exceeds remaining quota; balance floored at zero"
            );
        }
        info!(
            import = %import.id,
            import_number = import.import_number,
            importer = %import.importer_id,
            total_co2_equivalent = import.total_co2_equivalent,
            balance = debit.balance,
            approver,
            "import approved"
        );

        let license_document = match self.collaborators.documents.import_license(&import) {
            Ok(reference) => Some(reference),
            Err(err) => {
                warn!(import = %import.id, error = %err, "license rendering failed");
                None
            }
        };
        self.notify(&import, NotificationKind::ImportApproved);

        Ok(ImportApproval {
            import,
            account,
            debit,
            license_document,
        })
    }

    /// Reject from any non-terminal state. The import number stays consumed.
    pub fn reject(&self, id: &ImportId, reason: &str) -> Result<ImportLicense, LicensingError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LicensingError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        let stored = self.transition(id, "reject", |workflow, record| {
            if record.state.is_terminal() {
                return Err(LicensingError::invalid_state(
                    ENTITY,
                    &record.id,
                    record.state.label(),
                    "reject",
                ));
            }
            let now = workflow.collaborators.clock.now();
            record.transition(
                ImportState::Rejected {
                    reason: reason.to_string(),
                    rejected_at: now,
                },
                now,
                None,
                Some(reason),
            );
            Ok(())
        })?;

        info!(import = %stored.id, import_number = stored.import_number, reason, "import rejected");
        self.notify(&stored, NotificationKind::ImportRejected);
        Ok(stored)
    }

    pub fn get(&self, id: &ImportId) -> Result<ImportLicense, LicensingError> {
        self.load(id)
    }

    pub fn list_for_importer(
        &self,
        importer_id: &ImporterId,
    ) -> Result<Vec<ImportLicense>, LicensingError> {
        Ok(self.store.imports_for(importer_id)?)
    }

    /// Recomputed total plus the account as it would look after the debit.
    fn settle(
        &self,
        record: &ImportLicense,
    ) -> Result<(f64, ImporterAccount, DebitOutcome), LicensingError> {
        let total = self.calculator.total(&record.line_items)?;
        let account = self
            .store
            .fetch_account(&record.importer_id)?
            .ok_or_else(|| LicensingError::not_found("importer account", &record.importer_id))?;
        let (debited, debit) = apply_debit(&account, total, self.quota_policy)?;
        Ok((total, debited, debit))
    }

    fn load(&self, id: &ImportId) -> Result<ImportLicense, LicensingError> {
        self.store
            .fetch_import(id)?
            .ok_or_else(|| LicensingError::not_found(ENTITY, id))
    }

    fn require(
        &self,
        record: &ImportLicense,
        expected: &ImportState,
        action: &'static str,
    ) -> Result<(), LicensingError> {
        if &record.state == expected {
            Ok(())
        } else {
            Err(LicensingError::invalid_state(
                ENTITY,
                &record.id,
                record.state.label(),
                action,
            ))
        }
    }

    fn transition<F>(
        &self,
        id: &ImportId,
        action: &'static str,
        mut apply: F,
    ) -> Result<ImportLicense, LicensingError>
    where
        F: FnMut(&Self, &mut ImportLicense) -> Result<(), LicensingError>,
    {
        for attempt in 1..=self.max_attempts {
            let mut record = self.load(id)?;
            apply(self, &mut record)?;
            match self.store.update_import(record) {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::Conflict) => {
                    debug!(import = %id, action, attempt, "import changed, retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(LicensingError::ConcurrencyConflict(format!(
            "import {id} contended for {} attempts",
            self.max_attempts
        )))
    }

    fn notify(&self, record: &ImportLicense, kind: NotificationKind) {
        let mut notification = Notification::new(kind, &record.importer_id, record.id.0.clone())
            .with_detail("import_number", record.import_number)
            .with_detail("state", record.state.label())
            .with_detail("total_co2_equivalent", record.total_co2_equivalent);
        if let Some(at) = record.inspection_at {
            notification = notification.with_detail("inspection_at", at.to_rfc3339());
        }
        if let ImportState::Rejected { reason, .. } = &record.state {
            notification = notification.with_detail("reason", reason);
        }
        dispatch(self.collaborators.notifier.as_ref(), notification);
    }
}
