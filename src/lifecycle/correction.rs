//! The error correction workflow.
//!
//! A released record is never edited. Instead a correction is requested,
//! reviewed by someone other than the requester, and processed: the
//! calculation is re-run with the proposed overrides and the result becomes
//! a new record version that supersedes the old one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};
use uuid::Uuid;

use super::service::{PayrollService, require};
use crate::error::{EngineError, EngineResult};
use crate::formula::parse;
use crate::models::{
    CorrectionStatus, PayrollErrorCorrection, PayrollRecord, ProposedChanges, RecordStatus,
};

/// Manages error corrections for released payroll records.
#[derive(Clone)]
pub struct CorrectionService {
    payroll: PayrollService,
    corrections: Arc<Mutex<HashMap<Uuid, PayrollErrorCorrection>>>,
}

impl CorrectionService {
    /// Creates a service that corrects records held by `payroll`.
    pub fn new(payroll: PayrollService) -> Self {
        Self {
            payroll,
            corrections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Requests a correction of a released record.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidTransition`] if the record is not `Released`
    /// - [`EngineError::Validation`] for an empty reason or change set, or
    ///   when the record already has an open correction
    /// - [`EngineError::Syntax`] if a formula override does not parse
    pub fn request(
        &self,
        payroll_record_id: Uuid,
        requested_by: &str,
        reason: &str,
        proposed_changes: ProposedChanges,
    ) -> EngineResult<PayrollErrorCorrection> {
        require("requested_by", requested_by)?;
        require("reason", reason)?;
        if proposed_changes.is_empty() {
            return Err(EngineError::Validation {
                field: "proposed_changes".to_string(),
                message: "a correction must change at least one input".to_string(),
            });
        }
        for expression in proposed_changes.formula_overrides.values() {
            parse(expression)?;
        }

        let record = self.payroll.get(payroll_record_id)?;
        ensure_released(&record, "correct")?;

        let mut corrections = self.corrections.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(open) = corrections
            .values()
            .find(|c| c.payroll_record_id == payroll_record_id && c.status.is_open())
        {
            return Err(EngineError::Validation {
                field: "payroll_record_id".to_string(),
                message: format!("record already has open correction {}", open.id),
            });
        }

        let correction =
            PayrollErrorCorrection::new(payroll_record_id, requested_by, reason, proposed_changes);
        corrections.insert(correction.id, correction.clone());
        info!(
            correction_id = %correction.id,
            record_id = %payroll_record_id,
            requested_by,
            "Error correction requested"
        );
        Ok(correction)
    }

    /// `Requested → Approved`. The approver must not be the requester.
    pub fn approve(&self, id: Uuid, approver: &str) -> EngineResult<PayrollErrorCorrection> {
        require("approver", approver)?;
        let correction = self.update(id, |c| {
            if c.requested_by == approver {
                return Err(EngineError::Validation {
                    field: "approver".to_string(),
                    message: "a correction cannot be approved by its requester".to_string(),
                });
            }
            c.approve(approver)
        })?;
        info!(correction_id = %id, approver, "Error correction approved");
        Ok(correction)
    }

    /// `Requested → Rejected`. The record is left untouched.
    pub fn reject(&self, id: Uuid, reviewer: &str, reason: &str) -> EngineResult<PayrollErrorCorrection> {
        require("reviewer", reviewer)?;
        require("reason", reason)?;
        let correction = self.update(id, |c| c.reject(reviewer, reason))?;
        info!(correction_id = %id, reviewer, "Error correction rejected");
        Ok(correction)
    }

    /// `Requested → Cancelled`.
    pub fn cancel(&self, id: Uuid) -> EngineResult<PayrollErrorCorrection> {
        let correction = self.update(id, |c| c.cancel())?;
        info!(correction_id = %id, "Error correction cancelled");
        Ok(correction)
    }

    /// Applies an approved correction.
    ///
    /// Recalculates with the proposed overrides, stores the result as a new
    /// released version and supersedes the corrected record. If the
    /// recalculation fails the correction stays `Approved` and nothing changes.
    pub fn process(&self, id: Uuid) -> EngineResult<(PayrollErrorCorrection, PayrollRecord)> {
        let correction = self.get(id)?;
        correction.ensure_status(CorrectionStatus::Approved, "process")?;
        let prior = self.payroll.get(correction.payroll_record_id)?;

        let _guard = self
            .payroll
            .in_flight()
            .acquire(&prior.employee_id, prior.period)?;
        let correction = self.get(id)?;
        correction.ensure_status(CorrectionStatus::Approved, "process")?;
        let prior = self.payroll.get(correction.payroll_record_id)?;
        ensure_released(&prior, "correct")?;

        let result = self
            .payroll
            .calculator()
            .calculate_with_overrides(&prior.employee_id, prior.period, &correction.proposed_changes)
            .inspect_err(|err| {
                warn!(
                    correction_id = %id,
                    record_id = %prior.id,
                    error = %err,
                    "Error correction could not be processed"
                )
            })?;

        let approver = correction.approved_by.clone().unwrap_or_default();
        let mut next = PayrollRecord::draft(prior.employee_id.clone(), prior.period, prior.version + 1);
        next.supersedes = Some(prior.id);
        next.mark_calculated(result)?;
        next.submit_for_approval()?;
        next.approve(approver)?;
        next.release()?;

        let next = self.payroll.records().supersede(prior.id, next)?;
        let correction = self.update(id, |c| c.mark_processed(next.id))?;

        info!(
            correction_id = %id,
            record_id = %next.id,
            superseded_record_id = %prior.id,
            employee_id = %next.employee_id,
            version = next.version,
            "Error correction processed"
        );
        Ok((correction, next))
    }

    /// Returns a correction by id.
    pub fn get(&self, id: Uuid) -> EngineResult<PayrollErrorCorrection> {
        self.corrections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(EngineError::CorrectionNotFound { id })
    }

    /// Returns every correction of a record version, oldest first.
    pub fn list_for_record(&self, payroll_record_id: Uuid) -> Vec<PayrollErrorCorrection> {
        let corrections = self.corrections.lock().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<PayrollErrorCorrection> = corrections
            .values()
            .filter(|c| c.payroll_record_id == payroll_record_id)
            .cloned()
            .collect();
        list.sort_by_key(|c| c.created_at);
        list
    }

    fn update(
        &self,
        id: Uuid,
        change: impl FnOnce(&mut PayrollErrorCorrection) -> EngineResult<()>,
    ) -> EngineResult<PayrollErrorCorrection> {
        let mut corrections = self.corrections.lock().unwrap_or_else(PoisonError::into_inner);
        let mut correction = corrections
            .get(&id)
            .cloned()
            .ok_or(EngineError::CorrectionNotFound { id })?;
        change(&mut correction)?;
        corrections.insert(id, correction.clone());
        Ok(correction)
    }
}

fn ensure_released(record: &PayrollRecord, action: &'static str) -> EngineResult<()> {
    if record.status == RecordStatus::Released {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            entity: "payroll record",
            id: record.id,
            from: record.status.to_string(),
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Value;
    use crate::lifecycle::service::fixtures::{period, released_record, service};
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn absent_days_zero() -> ProposedChanges {
        ProposedChanges {
            variable_overrides: BTreeMap::from([("absentDays".to_string(), Value::Integer(0))]),
            formula_overrides: BTreeMap::new(),
        }
    }

    fn setup() -> (CorrectionService, PayrollRecord) {
        let payroll = service();
        let record = released_record(&payroll);
        (CorrectionService::new(payroll), record)
    }

    #[test]
    fn test_correction_supersedes_record() {
        let (corrections, record) = setup();
        let correction = corrections
            .request(record.id, "hr_01", "absence entered twice", absent_days_zero())
            .unwrap();
        corrections.approve(correction.id, "mgr_02").unwrap();
        let (processed, next) = corrections.process(correction.id).unwrap();

        assert_eq!(processed.status, CorrectionStatus::Processed);
        assert_eq!(processed.resulting_record_id, Some(next.id));

        assert_eq!(next.version, 2);
        assert_eq!(next.status, RecordStatus::Released);
        assert_eq!(next.supersedes, Some(record.id));
        assert_eq!(next.approved_by.as_deref(), Some("mgr_02"));
        let result = next.calculation_result.as_ref().unwrap();
        assert_eq!(result.line_item("attendanceBonus").unwrap().value, dec("500"));
        assert_eq!(result.net_salary, dec("51750"));

        let prior = corrections.payroll.get(record.id).unwrap();
        assert_eq!(prior.status, RecordStatus::Superseded);
        assert_eq!(prior.superseded_by, Some(next.id));
        assert_eq!(
            corrections.payroll.active_record("emp_001", period()).unwrap().id,
            next.id
        );
    }

    #[test]
    fn test_request_requires_released_record() {
        let payroll = service();
        let record = payroll.create_payroll_record("emp_001", period()).unwrap();
        let corrections = CorrectionService::new(payroll);
        assert!(matches!(
            corrections.request(record.id, "hr_01", "wrong", absent_days_zero()),
            Err(EngineError::InvalidTransition { action: "correct", .. })
        ));
    }

    #[test]
    fn test_request_validation() {
        let (corrections, record) = setup();
        assert!(matches!(
            corrections.request(record.id, "hr_01", " ", absent_days_zero()),
            Err(EngineError::Validation { .. })
        ));
        assert!(matches!(
            corrections.request(record.id, "hr_01", "wrong", ProposedChanges::default()),
            Err(EngineError::Validation { .. })
        ));

        let bad_formula = ProposedChanges {
            variable_overrides: BTreeMap::new(),
            formula_overrides: BTreeMap::from([(
                "overtimePay".to_string(),
                "overtimeHours * (".to_string(),
            )]),
        };
        assert!(matches!(
            corrections.request(record.id, "hr_01", "wrong", bad_formula),
            Err(EngineError::Syntax { .. })
        ));
    }

    #[test]
    fn test_one_open_correction_per_record() {
        let (corrections, record) = setup();
        let first = corrections
            .request(record.id, "hr_01", "absence entered twice", absent_days_zero())
            .unwrap();
        assert!(corrections
            .request(record.id, "hr_02", "same issue", absent_days_zero())
            .is_err());

        corrections.cancel(first.id).unwrap();
        assert!(corrections
            .request(record.id, "hr_02", "same issue", absent_days_zero())
            .is_ok());
        assert_eq!(corrections.list_for_record(record.id).len(), 2);
    }

    #[test]
    fn test_requester_cannot_approve() {
        let (corrections, record) = setup();
        let correction = corrections
            .request(record.id, "hr_01", "absence entered twice", absent_days_zero())
            .unwrap();
        assert!(matches!(
            corrections.approve(correction.id, "hr_01"),
            Err(EngineError::Validation { .. })
        ));
        assert_eq!(
            corrections.get(correction.id).unwrap().status,
            CorrectionStatus::Requested
        );
    }

    #[test]
    fn test_reject_leaves_record_untouched() {
        let (corrections, record) = setup();
        let correction = corrections
            .request(record.id, "hr_01", "absence entered twice", absent_days_zero())
            .unwrap();
        assert!(corrections.reject(correction.id, "mgr_02", "").is_err());

        let rejected = corrections
            .reject(correction.id, "mgr_02", "timesheet confirms absence")
            .unwrap();
        assert_eq!(rejected.status, CorrectionStatus::Rejected);
        assert_eq!(corrections.payroll.get(record.id).unwrap(), record);
        assert!(matches!(
            corrections.process(correction.id),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_failed_processing_keeps_correction_approved() {
        let (corrections, record) = setup();
        let changes = ProposedChanges {
            variable_overrides: BTreeMap::new(),
            formula_overrides: BTreeMap::from([(
                "overtimePay".to_string(),
                "bonusX * 2".to_string(),
            )]),
        };
        let correction = corrections
            .request(record.id, "hr_01", "overtime policy", changes)
            .unwrap();
        corrections.approve(correction.id, "mgr_02").unwrap();

        assert!(matches!(
            corrections.process(correction.id),
            Err(EngineError::UnknownVariable { ref name }) if name == "bonusX"
        ));
        assert_eq!(
            corrections.get(correction.id).unwrap().status,
            CorrectionStatus::Approved
        );
        assert_eq!(
            corrections.payroll.get(record.id).unwrap().status,
            RecordStatus::Released
        );
    }

    #[test]
    fn test_process_twice_fails() {
        let (corrections, record) = setup();
        let correction = corrections
            .request(record.id, "hr_01", "absence entered twice", absent_days_zero())
            .unwrap();
        corrections.approve(correction.id, "mgr_02").unwrap();
        corrections.process(correction.id).unwrap();
        assert!(matches!(
            corrections.process(correction.id),
            Err(EngineError::InvalidTransition { .. })
        ));
        assert_eq!(corrections.payroll.history("emp_001", period()).len(), 2);
    }

    #[test]
    fn test_missing_correction() {
        let (corrections, _) = setup();
        assert!(matches!(
            corrections.get(Uuid::nil()),
            Err(EngineError::CorrectionNotFound { .. })
        ));
    }
}
