//! Error correction model.
//!
//! A [`PayrollErrorCorrection`] is a supervised amendment to a released
//! payroll record. Its lifecycle is independent of the record it references.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::formula::Value;

/// The lifecycle state of an error correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    /// Awaiting review.
    Requested,
    /// Approved and ready to process.
    Approved,
    /// Rejected by a reviewer. Terminal.
    Rejected,
    /// Applied; a new record version exists. Terminal.
    Processed,
    /// Withdrawn before review. Terminal.
    Cancelled,
}

impl CorrectionStatus {
    /// Returns true while the correction still blocks other corrections of the same record.
    pub fn is_open(&self) -> bool {
        matches!(self, CorrectionStatus::Requested | CorrectionStatus::Approved)
    }
}

impl fmt::Display for CorrectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CorrectionStatus::Requested => "Requested",
            CorrectionStatus::Approved => "Approved",
            CorrectionStatus::Rejected => "Rejected",
            CorrectionStatus::Processed => "Processed",
            CorrectionStatus::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// The inputs a correction changes relative to the original calculation.
///
/// # Example
///
/// ```
/// use payroll_engine::formula::Value;
/// use payroll_engine::models::ProposedChanges;
///
/// let mut changes = ProposedChanges::default();
/// changes.variable_overrides.insert("absentDays".to_string(), Value::Integer(0));
/// assert!(!changes.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChanges {
    /// Context variables replaced before evaluation.
    #[serde(default)]
    pub variable_overrides: BTreeMap<String, Value>,
    /// Target field → replacement expression for this calculation only.
    #[serde(default)]
    pub formula_overrides: BTreeMap<String, String>,
}

impl ProposedChanges {
    /// Returns true if the correction would change nothing.
    pub fn is_empty(&self) -> bool {
        self.variable_overrides.is_empty() && self.formula_overrides.is_empty()
    }
}

/// A supervised amendment to a released payroll record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollErrorCorrection {
    /// Unique identifier.
    pub id: Uuid,
    /// The record version being corrected.
    pub payroll_record_id: Uuid,
    /// Who asked for the correction.
    pub requested_by: String,
    /// Why the record is wrong.
    pub reason: String,
    /// What differs from the original calculation.
    pub proposed_changes: ProposedChanges,
    /// Current lifecycle state.
    pub status: CorrectionStatus,
    /// Who approved or rejected the correction.
    pub approved_by: Option<String>,
    /// Why the correction was rejected.
    pub rejection_reason: Option<String>,
    /// When the correction was processed.
    pub processed_at: Option<DateTime<Utc>>,
    /// The record version produced by processing.
    pub resulting_record_id: Option<Uuid>,
    /// When the correction was requested.
    pub created_at: DateTime<Utc>,
}

impl PayrollErrorCorrection {
    /// Creates a new correction in `Requested` state.
    pub fn new(
        payroll_record_id: Uuid,
        requested_by: impl Into<String>,
        reason: impl Into<String>,
        proposed_changes: ProposedChanges,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payroll_record_id,
            requested_by: requested_by.into(),
            reason: reason.into(),
            proposed_changes,
            status: CorrectionStatus::Requested,
            approved_by: None,
            rejection_reason: None,
            processed_at: None,
            resulting_record_id: None,
            created_at: Utc::now(),
        }
    }

    /// `Requested → Approved`.
    pub fn approve(&mut self, approver: impl Into<String>) -> EngineResult<()> {
        self.ensure_status(CorrectionStatus::Requested, "approve")?;
        self.approved_by = Some(approver.into());
        self.status = CorrectionStatus::Approved;
        Ok(())
    }

    /// `Requested → Rejected`.
    pub fn reject(&mut self, reviewer: impl Into<String>, reason: impl Into<String>) -> EngineResult<()> {
        self.ensure_status(CorrectionStatus::Requested, "reject")?;
        self.approved_by = Some(reviewer.into());
        self.rejection_reason = Some(reason.into());
        self.status = CorrectionStatus::Rejected;
        Ok(())
    }

    /// `Approved → Processed`.
    pub fn mark_processed(&mut self, resulting_record_id: Uuid) -> EngineResult<()> {
        self.ensure_status(CorrectionStatus::Approved, "process")?;
        self.resulting_record_id = Some(resulting_record_id);
        self.processed_at = Some(Utc::now());
        self.status = CorrectionStatus::Processed;
        Ok(())
    }

    /// `Requested → Cancelled`.
    pub fn cancel(&mut self) -> EngineResult<()> {
        self.ensure_status(CorrectionStatus::Requested, "cancel")?;
        self.status = CorrectionStatus::Cancelled;
        Ok(())
    }

    /// Fails unless the correction is in the given state.
    pub fn ensure_status(&self, expected: CorrectionStatus, action: &'static str) -> EngineResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                entity: "correction",
                id: self.id,
                from: self.status.to_string(),
                action,
            })
        }
    }
}
