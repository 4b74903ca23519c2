use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an importer account provisioned outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImporterId(pub String);

/// Identifier wrapper for yearly registrations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegistrationId(pub String);

/// Identifier wrapper for import license requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImportId(pub String);

impl RegistrationId {
    pub fn generate() -> Self {
        Self(format!("reg-{}", Uuid::new_v4().simple()))
    }
}

impl ImportId {
    pub fn generate() -> Self {
        Self(format!("imp-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for ImporterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pointer into object storage for signatures, supporting documents and rendered artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub key: String,
    pub content_type: String,
}

/// Audit entry appended on every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: String,
    pub to: String,
    pub at: DateTime<Utc>,
    pub actor: Option<String>,
    pub note: Option<String>,
}

/// Refrigerant chosen on a registration, with the GWP captured when it was selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefrigerantSelection {
    pub code: String,
    pub gwp: Option<f64>,
    pub restricted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegistrationState {
    Draft,
    Submitted,
    Approved {
        certificate_number: u64,
        approved_by: String,
        approved_at: DateTime<Utc>,
    },
    Rejected {
        reason: String,
        rejected_at: DateTime<Utc>,
    },
}

impl RegistrationState {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved { .. } | Self::Rejected { .. })
    }

    /// Awaiting an administrative decision.
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Submitted)
    }

    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// One importer's request to handle a list of refrigerants for one calendar year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub importer_id: ImporterId,
    pub year: i32,
    pub selected_refrigerants: Vec<RefrigerantSelection>,
    pub is_retail: bool,
    pub state: RegistrationState,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub transitions: Vec<TransitionRecord>,
    pub version: u64,
}

impl Registration {
    pub fn new(
        importer_id: ImporterId,
        year: i32,
        selected_refrigerants: Vec<RefrigerantSelection>,
        is_retail: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RegistrationId::generate(),
            importer_id,
            year,
            selected_refrigerants,
            is_retail,
            state: RegistrationState::Draft,
            created_at,
            submitted_at: None,
            transitions: Vec::new(),
            version: 0,
        }
    }

    /// Present exactly when the registration has been approved.
    pub fn certificate_number(&self) -> Option<u64> {
        match self.state {
            RegistrationState::Approved {
                certificate_number, ..
            } => Some(certificate_number),
            _ => None,
        }
    }

    pub fn selection(&self, code: &str) -> Option<&RefrigerantSelection> {
        let code = code.trim();
        self.selected_refrigerants
            .iter()
            .find(|selection| selection.code.eq_ignore_ascii_case(code))
    }

    pub(crate) fn transition(
        &mut self,
        next: RegistrationState,
        at: DateTime<Utc>,
        actor: Option<&str>,
        note: Option<&str>,
    ) {
        self.transitions.push(TransitionRecord {
            from: self.state.label().to_string(),
            to: next.label().to_string(),
            at,
            actor: actor.map(str::to_string),
            note: note.map(str::to_string),
        });
        if matches!(next, RegistrationState::Submitted) {
            self.submitted_at = Some(at);
        }
        self.state = next;
    }
}

/// Line item as entered by the importer; GWP is resolved from the registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub refrigerant_code: String,
    pub quantity: u32,
    pub volume: f64,
    pub unit: String,
}

/// A single refrigerant on an import. `quantity` counts containers, each holding `volume` of `unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub refrigerant_code: String,
    pub quantity: u32,
    pub volume: f64,
    pub unit: String,
    pub gwp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImportState {
    AwaitingArrival,
    AwaitingInspectionSchedule,
    InspectionScheduled,
    Approved {
        approved_by: String,
        approved_at: DateTime<Utc>,
        signature: ObjectReference,
    },
    Rejected {
        reason: String,
        rejected_at: DateTime<Utc>,
    },
}

impl ImportState {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::AwaitingArrival => "awaiting_arrival",
            Self::AwaitingInspectionSchedule => "awaiting_inspection_schedule",
            Self::InspectionScheduled => "inspection_scheduled",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved { .. } | Self::Rejected { .. })
    }

    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    /// Goods have arrived and are waiting on customs.
    pub const fn is_arrived(&self) -> bool {
        matches!(
            self,
            Self::AwaitingInspectionSchedule | Self::InspectionScheduled | Self::Approved { .. }
        )
    }
}

/// One shipment request against an approved registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportLicense {
    pub id: ImportId,
    pub importer_id: ImporterId,
    pub registration_id: RegistrationId,
    pub year: i32,
    pub import_number: u64,
    pub line_items: Vec<LineItem>,
    pub state: ImportState,
    pub total_co2_equivalent: f64,
    pub inspection_at: Option<DateTime<Utc>>,
    pub supporting_documents: Vec<ObjectReference>,
    pub submitted_at: DateTime<Utc>,
    pub transitions: Vec<TransitionRecord>,
    pub version: u64,
}

impl ImportLicense {
    pub(crate) fn transition(
        &mut self,
        next: ImportState,
        at: DateTime<Utc>,
        actor: Option<&str>,
        note: Option<&str>,
    ) {
        self.transitions.push(TransitionRecord {
            from: self.state.label().to_string(),
            to: next.label().to_string(),
            at,
            actor: actor.map(str::to_string),
            note: note.map(str::to_string),
        });
        self.state = next;
    }
}

/// Quota bookkeeping for a single importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImporterAccount {
    pub importer_id: ImporterId,
    pub import_quota: f64,
    pub cumulative_imports: f64,
    pub importer_number: Option<u64>,
    pub version: u64,
}

impl ImporterAccount {
    pub fn new(importer_id: ImporterId, import_quota: f64) -> Self {
        Self {
            importer_id,
            import_quota,
            cumulative_imports: 0.0,
            importer_number: None,
            version: 0,
        }
    }

    /// Remaining allowance, floored at zero.
    pub fn balance(&self) -> f64 {
        (self.import_quota - self.cumulative_imports).max(0.0)
    }
}
