//! Response types for the Payroll Formula Engine API.
//!
//! This module defines the error response structures, the mapping from
//! engine errors to HTTP statuses, and the bodies of composite responses.

use std::collections::BTreeSet;

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::calculation::BatchOutcome;
use crate::error::EngineError;
use crate::models::{PayPeriod, PayrollCalculationResult, PayrollErrorCorrection, PayrollRecord};

/// API error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Creates a new API error with details.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Creates a validation error response.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Creates a malformed JSON error response.
    pub fn malformed_json(message: impl Into<String>) -> Self {
        Self::new("MALFORMED_JSON", message)
    }
}

impl From<&EngineError> for ApiError {
    fn from(error: &EngineError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        match error {
            EngineError::Syntax { position, .. } => {
                Self::with_details(code, message, format!("position {}", position))
            }
            EngineError::FormulaCycle { cycle } => Self::with_details(code, message, cycle.join(",")),
            EngineError::Evaluation { source, .. } => {
                Self::with_details(code, message, source.to_string())
            }
            _ => Self::new(code, message),
        }
    }
}

/// API error with HTTP status code.
pub struct ApiErrorResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The error body.
    pub error: ApiError,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            Json(self.error),
        )
            .into_response()
    }
}

impl From<EngineError> for ApiErrorResponse {
    fn from(error: EngineError) -> Self {
        let status = match &error {
            EngineError::ConfigNotFound { .. }
            | EngineError::ConfigParseError { .. }
            | EngineError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Syntax { .. }
            | EngineError::UnknownVariable { .. }
            | EngineError::FormulaCycle { .. }
            | EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
            EngineError::IncompleteContext { .. }
            | EngineError::Evaluation { .. }
            | EngineError::NegativeNetSalary { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::DuplicateCalculation { .. } | EngineError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            EngineError::EmployeeNotFound { .. }
            | EngineError::RecordNotFound { .. }
            | EngineError::CorrectionNotFound { .. }
            | EngineError::FormulaNotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        };
        ApiErrorResponse {
            status,
            error: ApiError::from(&error),
        }
    }
}

/// Body of `POST /formulas/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateFormulaResponse {
    /// Always true; invalid expressions produce an error response instead.
    pub valid: bool,
    /// The variables the expression references, sorted.
    pub variables: BTreeSet<String>,
}

/// One employee's entry in a branch payroll response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeOutcome {
    /// The employee.
    pub employee_id: String,
    /// The stored record, when records were committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<PayrollRecord>,
    /// The calculation, when records were not committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PayrollCalculationResult>,
    /// Why this employee failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl EmployeeOutcome {
    pub(crate) fn from_record(outcome: BatchOutcome<PayrollRecord>) -> Self {
        match outcome.result {
            Ok(record) => Self {
                employee_id: outcome.employee_id,
                record: Some(record),
                result: None,
                error: None,
            },
            Err(err) => Self::failed(outcome.employee_id, &err),
        }
    }

    pub(crate) fn from_result(outcome: BatchOutcome<PayrollCalculationResult>) -> Self {
        match outcome.result {
            Ok(result) => Self {
                employee_id: outcome.employee_id,
                record: None,
                result: Some(result),
                error: None,
            },
            Err(err) => Self::failed(outcome.employee_id, &err),
        }
    }

    fn failed(employee_id: String, error: &EngineError) -> Self {
        Self {
            employee_id,
            record: None,
            result: None,
            error: Some(ApiError::from(error)),
        }
    }
}

/// Body of `POST /payroll/branches/:branch_id/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchPayrollResponse {
    /// The branch.
    pub branch_id: String,
    /// The pay period.
    pub period: PayPeriod,
    /// Whether records were stored.
    pub committed: bool,
    /// Number of employees that succeeded.
    pub succeeded: usize,
    /// Number of employees that failed or were cancelled.
    pub failed: usize,
    /// Per-employee outcomes sorted by employee id.
    pub outcomes: Vec<EmployeeOutcome>,
}

impl BranchPayrollResponse {
    pub(crate) fn new(
        branch_id: String,
        period: PayPeriod,
        committed: bool,
        outcomes: Vec<EmployeeOutcome>,
    ) -> Self {
        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        Self {
            branch_id,
            period,
            committed,
            succeeded: outcomes.len() - failed,
            failed,
            outcomes,
        }
    }
}

/// Body of `POST /corrections/:id/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCorrectionResponse {
    /// The processed correction.
    pub correction: PayrollErrorCorrection,
    /// The new record version.
    pub record: PayrollRecord,
}
