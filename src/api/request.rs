//! Request types for the Payroll Formula Engine API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PayPeriod, ProposedChanges};

/// Request body for `POST /payroll/calculate`.
///
/// # Example
///
/// ```
/// use payroll_engine::api::CalculationRequest;
///
/// let json = r#"{"employee_id": "emp_001", "period": {"month": 3, "year": 2026}}"#;
/// let request: CalculationRequest = serde_json::from_str(json).unwrap();
/// assert!(request.overrides.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationRequest {
    /// The employee to calculate.
    pub employee_id: String,
    /// The pay period.
    pub period: PayPeriod,
    /// Optional what-if overrides applied to this calculation only.
    #[serde(default)]
    pub overrides: Option<ProposedChanges>,
}

/// Request body for `POST /payroll/records`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    /// The employee.
    pub employee_id: String,
    /// The pay period.
    pub period: PayPeriod,
}

/// Request body for approving a record or a correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    /// Who approves.
    pub approver: String,
}

/// Request body for rejecting a record or a correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectRequest {
    /// Who rejects.
    pub approver: String,
    /// Why.
    pub reason: String,
}

/// Request body for `POST /payroll/branches/:branch_id/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchPayrollRequest {
    /// The pay period.
    pub period: PayPeriod,
    /// Store a record per employee instead of only calculating.
    #[serde(default)]
    pub commit: bool,
}

/// Request body for `POST /formulas/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateFormulaRequest {
    /// The organization whose active fields may be referenced.
    pub organization_id: String,
    /// The expression to check.
    pub expression: String,
}

/// Request body for `POST /corrections`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRequest {
    /// The released record to correct.
    pub payroll_record_id: Uuid,
    /// Who asks for the correction.
    pub requested_by: String,
    /// Why the record is wrong.
    pub reason: String,
    /// The inputs to change.
    pub proposed_changes: ProposedChanges,
}
