//! Payroll record operations.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::in_flight::InFlightCalculations;
use super::store::RecordStore;
use crate::calculation::{BatchOutcome, CancellationToken, Calculator, run_batch};
use crate::error::{EngineError, EngineResult};
use crate::models::{PayPeriod, PayrollCalculationResult, PayrollRecord, RecordStatus};

/// Creates payroll records and drives them through approval and release.
///
/// Cloning is cheap; clones share the same store and in-flight set.
#[derive(Clone)]
pub struct PayrollService {
    calculator: Calculator,
    records: Arc<RecordStore>,
    in_flight: InFlightCalculations,
}

impl PayrollService {
    /// Creates a service with an empty record store.
    pub fn new(calculator: Calculator) -> Self {
        Self {
            calculator,
            records: Arc::new(RecordStore::new()),
            in_flight: InFlightCalculations::new(),
        }
    }

    /// The calculator used for every record.
    pub fn calculator(&self) -> &Calculator {
        &self.calculator
    }

    pub(crate) fn records(&self) -> &RecordStore {
        &self.records
    }

    pub(crate) fn in_flight(&self) -> &InFlightCalculations {
        &self.in_flight
    }

    /// Calculates without persisting anything.
    pub fn calculate(&self, employee_id: &str, period: PayPeriod) -> EngineResult<PayrollCalculationResult> {
        self.calculator.calculate(employee_id, period)
    }

    /// Calculates and stores a new record in `Calculated` state.
    ///
    /// # Errors
    ///
    /// - [`EngineError::DuplicateCalculation`] if the pair is being calculated
    ///   right now or already has an active record
    /// - any calculation error, in which case nothing is stored
    pub fn create_payroll_record(&self, employee_id: &str, period: PayPeriod) -> EngineResult<PayrollRecord> {
        let _guard = self.in_flight.acquire(employee_id, period)?;
        if let Some(existing) = self.records.active(employee_id, period) {
            warn!(
                employee_id,
                period = %period,
                record_id = %existing.id,
                status = %existing.status,
                "Active payroll record already exists"
            );
            return Err(EngineError::DuplicateCalculation {
                employee_id: employee_id.to_string(),
                period,
            });
        }

        let version = self.records.latest_version(employee_id, period) + 1;
        let mut record = PayrollRecord::draft(employee_id, period, version);
        let result = self.calculator.calculate(employee_id, period)?;
        record.mark_calculated(result)?;
        self.records.insert(record.clone())?;

        info!(
            employee_id,
            period = %period,
            record_id = %record.id,
            version,
            "Payroll record created"
        );
        Ok(record)
    }

    /// `Calculated → PendingApproval`.
    pub fn submit_for_approval(&self, id: Uuid) -> EngineResult<PayrollRecord> {
        let record = self.records.update(id, |r| r.submit_for_approval())?;
        info!(record_id = %id, "Payroll record submitted for approval");
        Ok(record)
    }

    /// `PendingApproval → Approved`.
    pub fn approve(&self, id: Uuid, approver: &str) -> EngineResult<PayrollRecord> {
        require("approver", approver)?;
        let record = self.records.update(id, |r| r.approve(approver))?;
        info!(record_id = %id, approver, "Payroll record approved");
        Ok(record)
    }

    /// `PendingApproval → Calculated`; the calculation result is kept.
    pub fn reject(&self, id: Uuid, approver: &str, reason: &str) -> EngineResult<PayrollRecord> {
        require("approver", approver)?;
        require("reason", reason)?;
        let record = self.records.update(id, |r| r.reject(reason))?;
        info!(record_id = %id, approver, reason, "Payroll record rejected");
        Ok(record)
    }

    /// `Approved → Released`.
    pub fn release(&self, id: Uuid) -> EngineResult<PayrollRecord> {
        let record = self.records.update(id, |r| r.release())?;
        info!(record_id = %id, employee_id = %record.employee_id, "Payroll record released");
        Ok(record)
    }

    /// Replaces the result of a `Calculated` record with a fresh calculation.
    pub fn recalculate(&self, id: Uuid) -> EngineResult<PayrollRecord> {
        let current = self.records.get(id)?;
        let _guard = self.in_flight.acquire(&current.employee_id, current.period)?;
        if current.status != RecordStatus::Calculated {
            return Err(EngineError::InvalidTransition {
                entity: "payroll record",
                id,
                from: current.status.to_string(),
                action: "recalculate",
            });
        }

        let result = self.calculator.calculate(&current.employee_id, current.period)?;
        let record = self.records.update(id, |r| r.mark_calculated(result))?;
        info!(record_id = %id, employee_id = %record.employee_id, "Payroll record recalculated");
        Ok(record)
    }

    /// Returns a record by id.
    pub fn get(&self, id: Uuid) -> EngineResult<PayrollRecord> {
        self.records.get(id)
    }

    /// Returns the active record for the employee and period, if any.
    pub fn active_record(&self, employee_id: &str, period: PayPeriod) -> Option<PayrollRecord> {
        self.records.active(employee_id, period)
    }

    /// Returns every version for the employee and period, oldest first.
    pub fn history(&self, employee_id: &str, period: PayPeriod) -> Vec<PayrollRecord> {
        self.records.history(employee_id, period)
    }

    /// Calculates every employee of a branch without storing records.
    pub async fn calculate_branch(
        &self,
        branch_id: &str,
        period: PayPeriod,
        cancellation: CancellationToken,
    ) -> Vec<BatchOutcome<PayrollCalculationResult>> {
        let calculator = self.calculator.clone();
        self.run_branch(branch_id, period, cancellation, move |employee_id| {
            calculator.calculate(employee_id, period)
        })
        .await
    }

    /// Creates a record for every employee of a branch.
    ///
    /// Each employee succeeds or fails on its own.
    pub async fn process_branch_payroll(
        &self,
        branch_id: &str,
        period: PayPeriod,
        cancellation: CancellationToken,
    ) -> Vec<BatchOutcome<PayrollRecord>> {
        let service = self.clone();
        self.run_branch(branch_id, period, cancellation, move |employee_id| {
            service.create_payroll_record(employee_id, period)
        })
        .await
    }

    async fn run_branch<T, F>(
        &self,
        branch_id: &str,
        period: PayPeriod,
        cancellation: CancellationToken,
        job: F,
    ) -> Vec<BatchOutcome<T>>
    where
        T: Send + 'static,
        F: Fn(&str) -> EngineResult<T> + Send + Sync + 'static,
    {
        let employee_ids: Vec<String> = self
            .calculator
            .contexts()
            .employees_in_branch(branch_id)
            .into_iter()
            .map(|employee| employee.id)
            .collect();
        let workers = self.calculator.settings().worker_count();
        info!(
            branch_id,
            period = %period,
            employees = employee_ids.len(),
            workers,
            "Processing branch payroll"
        );
        run_batch(employee_ids, workers, cancellation, job).await
    }
}

pub(crate) fn require(field: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}
