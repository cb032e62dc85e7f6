//! Payroll record model and its lifecycle state machine.
//!
//! A [`PayrollRecord`] is the persisted, versioned outcome of a committed
//! calculation. Its [`RecordStatus`] only moves along the transitions encoded
//! here; the service layer never assigns a status directly.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PayPeriod, PayrollCalculationResult};
use crate::error::{EngineError, EngineResult};

/// The lifecycle state of a payroll record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Created but not yet calculated. Never persisted.
    Draft,
    /// Calculated and awaiting submission.
    Calculated,
    /// Submitted to an approver.
    PendingApproval,
    /// Approved, not yet visible to the employee.
    Approved,
    /// Visible to the employee; amendments go through error correction.
    Released,
    /// Replaced by a newer version. Terminal.
    Superseded,
}

impl RecordStatus {
    /// Returns true for every state except `Superseded`.
    pub fn is_active(&self) -> bool {
        !matches!(self, RecordStatus::Superseded)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordStatus::Draft => "Draft",
            RecordStatus::Calculated => "Calculated",
            RecordStatus::PendingApproval => "PendingApproval",
            RecordStatus::Approved => "Approved",
            RecordStatus::Released => "Released",
            RecordStatus::Superseded => "Superseded",
        };
        f.write_str(name)
    }
}

/// A persisted payroll calculation for one employee and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRecord {
    /// Unique identifier of this version.
    pub id: Uuid,
    /// The employee.
    pub employee_id: String,
    /// The pay period.
    pub period: PayPeriod,
    /// Current lifecycle state.
    pub status: RecordStatus,
    /// The calculation this record holds. `None` only while `Draft`.
    pub calculation_result: Option<PayrollCalculationResult>,
    /// Who approved the record.
    pub approved_by: Option<String>,
    /// When the record was approved.
    pub approved_at: Option<DateTime<Utc>>,
    /// When the record was released.
    pub released_at: Option<DateTime<Utc>>,
    /// The reason given by the last approver who rejected the record.
    pub rejection_reason: Option<String>,
    /// Version number, starting at 1 and incremented by each correction.
    pub version: u32,
    /// The record version this one replaced.
    pub supersedes: Option<Uuid>,
    /// The record version that replaced this one.
    pub superseded_by: Option<Uuid>,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
    /// When this version last changed state.
    pub updated_at: DateTime<Utc>,
}

impl PayrollRecord {
    /// Creates a new draft record.
    pub fn draft(employee_id: impl Into<String>, period: PayPeriod, version: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            employee_id: employee_id.into(),
            period,
            status: RecordStatus::Draft,
            calculation_result: None,
            approved_by: None,
            approved_at: None,
            released_at: None,
            rejection_reason: None,
            version,
            supersedes: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `Draft → Calculated`, or a recalculation in place while `Calculated`.
    pub fn mark_calculated(&mut self, result: PayrollCalculationResult) -> EngineResult<()> {
        self.ensure_status(&[RecordStatus::Draft, RecordStatus::Calculated], "calculate")?;
        self.calculation_result = Some(result);
        self.transition(RecordStatus::Calculated);
        Ok(())
    }

    /// `Calculated → PendingApproval`.
    pub fn submit_for_approval(&mut self) -> EngineResult<()> {
        self.ensure_status(&[RecordStatus::Calculated], "submit")?;
        self.rejection_reason = None;
        self.transition(RecordStatus::PendingApproval);
        Ok(())
    }

    /// `PendingApproval → Approved`.
    pub fn approve(&mut self, approver: impl Into<String>) -> EngineResult<()> {
        self.ensure_status(&[RecordStatus::PendingApproval], "approve")?;
        self.approved_by = Some(approver.into());
        self.approved_at = Some(Utc::now());
        self.transition(RecordStatus::Approved);
        Ok(())
    }

    /// `PendingApproval → Calculated`, keeping the prior calculation result.
    pub fn reject(&mut self, reason: impl Into<String>) -> EngineResult<()> {
        self.ensure_status(&[RecordStatus::PendingApproval], "reject")?;
        self.rejection_reason = Some(reason.into());
        self.transition(RecordStatus::Calculated);
        Ok(())
    }

    /// `Approved → Released`.
    pub fn release(&mut self) -> EngineResult<()> {
        self.ensure_status(&[RecordStatus::Approved], "release")?;
        self.released_at = Some(Utc::now());
        self.transition(RecordStatus::Released);
        Ok(())
    }

    /// Any active state → `Superseded`.
    pub fn supersede(&mut self, replacement: Uuid) -> EngineResult<()> {
        if !self.status.is_active() {
            return Err(self.invalid("supersede"));
        }
        self.superseded_by = Some(replacement);
        self.transition(RecordStatus::Superseded);
        Ok(())
    }

    fn transition(&mut self, to: RecordStatus) {
        self.status = to;
        self.updated_at = Utc::now();
    }

    fn ensure_status(&self, allowed: &[RecordStatus], action: &'static str) -> EngineResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> EngineError {
        EngineError::InvalidTransition {
            entity: "payroll record",
            id: self.id,
            from: self.status.to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditTrace;
    use rust_decimal::Decimal;

    fn empty_result() -> PayrollCalculationResult {
        PayrollCalculationResult {
            employee_id: "emp_001".to_string(),
            period: PayPeriod::new(3, 2026).unwrap(),
            line_items: vec![],
            gross_salary: Decimal::ZERO,
            total_deductions: Decimal::ZERO,
            net_salary: Decimal::ZERO,
            currency: "USD".to_string(),
            audit_trace: AuditTrace::default(),
        }
    }

    fn calculated_record() -> PayrollRecord {
        let mut record = PayrollRecord::draft("emp_001", PayPeriod::new(3, 2026).unwrap(), 1);
        record.mark_calculated(empty_result()).unwrap();
        record
    }

    #[test]
    fn test_full_happy_path() {
        let mut record = calculated_record();
        record.submit_for_approval().unwrap();
        record.approve("mgr_01").unwrap();
        record.release().unwrap();

        assert_eq!(record.status, RecordStatus::Released);
        assert_eq!(record.approved_by.as_deref(), Some("mgr_01"));
        assert!(record.approved_at.is_some());
        assert!(record.released_at.is_some());
    }

    #[test]
    fn test_approving_draft_is_rejected() {
        let mut record = PayrollRecord::draft("emp_001", PayPeriod::new(3, 2026).unwrap(), 1);
        let err = record.approve("mgr_01").unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition { action: "approve", ref from, .. } if from == "Draft"
        ));
        assert_eq!(record.status, RecordStatus::Draft);
    }

    #[test]
    fn test_approving_calculated_requires_submission() {
        let mut record = calculated_record();
        assert!(record.approve("mgr_01").is_err());
        assert_eq!(record.status, RecordStatus::Calculated);
    }

    #[test]
    fn test_reject_returns_to_calculated_and_keeps_result() {
        let mut record = calculated_record();
        record.submit_for_approval().unwrap();
        record.reject("overtime looks wrong").unwrap();

        assert_eq!(record.status, RecordStatus::Calculated);
        assert!(record.calculation_result.is_some());
        assert_eq!(record.rejection_reason.as_deref(), Some("overtime looks wrong"));
    }

    #[test]
    fn test_release_requires_approval() {
        let mut record = calculated_record();
        record.submit_for_approval().unwrap();
        assert!(record.release().is_err());
    }

    #[test]
    fn test_supersede_is_terminal() {
        let mut record = calculated_record();
        let replacement = Uuid::new_v4();
        record.supersede(replacement).unwrap();

        assert_eq!(record.status, RecordStatus::Superseded);
        assert_eq!(record.superseded_by, Some(replacement));
        assert!(record.supersede(Uuid::new_v4()).is_err());
        assert!(record.submit_for_approval().is_err());
    }

    #[test]
    fn test_recalculate_in_place_while_calculated() {
        let mut record = calculated_record();
        assert!(record.mark_calculated(empty_result()).is_ok());
        record.submit_for_approval().unwrap();
        assert!(record.mark_calculated(empty_result()).is_err());
    }

    #[test]
    fn test_status_display_and_activity() {
        assert_eq!(RecordStatus::PendingApproval.to_string(), "PendingApproval");
        assert!(RecordStatus::Released.is_active());
        assert!(!RecordStatus::Superseded.is_active());
    }
}
