//! Error types for the Payroll Formula Engine.
//!
//! This module provides strongly-typed errors using the `thiserror` crate
//! for all error conditions that can occur while authoring formulas,
//! calculating payroll, and driving record and correction lifecycles.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::PayPeriod;

/// A runtime fault raised while evaluating a parsed formula.
///
/// Evaluation errors abort the calculation of the affected employee only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// The divisor of a division evaluated to zero.
    #[error("division by zero")]
    DivisionByZero,

    /// An operator received a value of the wrong type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The type the operator required.
        expected: &'static str,
        /// The type that was supplied.
        found: &'static str,
    },

    /// The formula referenced a variable absent from the evaluation context.
    #[error("variable '{name}' is not bound in the evaluation context")]
    UnboundVariable {
        /// The unbound variable name.
        name: String,
    },

    /// A decimal operation exceeded the representable range.
    #[error("arithmetic overflow")]
    Overflow,
}

/// The main error type for the Payroll Formula Engine.
///
/// # Example
///
/// ```
/// use payroll_engine::error::EngineError;
///
/// let error = EngineError::UnknownVariable {
///     name: "bonusX".to_string(),
/// };
/// assert_eq!(error.to_string(), "Unknown variable: bonusX");
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration file was not found at the specified path.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration file '{path}': {message}")]
    ConfigParseError {
        /// The path to the file that failed to parse.
        path: String,
        /// A description of the parse error.
        message: String,
    },

    /// Formula text is malformed.
    #[error("Syntax error at position {position}: {message}")]
    Syntax {
        /// Byte offset into the expression where the error was detected.
        position: usize,
        /// A description of the problem.
        message: String,
    },

    /// A formula references a variable outside its declared vocabulary.
    #[error("Unknown variable: {name}")]
    UnknownVariable {
        /// The offending identifier.
        name: String,
    },

    /// Formula dependencies form a cycle.
    #[error("Formula dependency cycle: {}", .cycle.join(" -> "))]
    FormulaCycle {
        /// The fields participating in the cycle, first field repeated at the end.
        cycle: Vec<String>,
    },

    /// Upstream data required to build an evaluation context is missing.
    #[error("Incomplete context for employee '{employee_id}': missing {variable}")]
    IncompleteContext {
        /// The employee whose context could not be built.
        employee_id: String,
        /// The variable that could not be resolved.
        variable: String,
    },

    /// A formula failed at runtime.
    #[error("Evaluation of '{field}' failed: {source}")]
    Evaluation {
        /// The target field of the failing formula.
        field: String,
        /// The underlying evaluation fault.
        #[source]
        source: EvaluationError,
    },

    /// A calculation for the same employee and period is already active or in flight.
    #[error("Duplicate calculation for employee '{employee_id}' in period {period}")]
    DuplicateCalculation {
        /// The employee.
        employee_id: String,
        /// The pay period.
        period: PayPeriod,
    },

    /// The computed net salary is negative.
    #[error("Negative net salary {net_salary} for employee '{employee_id}'")]
    NegativeNetSalary {
        /// The employee.
        employee_id: String,
        /// The offending net salary.
        net_salary: Decimal,
    },

    /// A lifecycle action is not permitted from the entity's current state.
    #[error("Cannot {action} {entity} {id} in state {from}")]
    InvalidTransition {
        /// The kind of entity ("payroll record", "correction").
        entity: &'static str,
        /// The entity id.
        id: Uuid,
        /// The current state.
        from: String,
        /// The attempted action.
        action: &'static str,
    },

    /// No master data exists for the employee.
    #[error("Employee not found: {employee_id}")]
    EmployeeNotFound {
        /// The employee id.
        employee_id: String,
    },

    /// No payroll record exists with the given id.
    #[error("Payroll record not found: {id}")]
    RecordNotFound {
        /// The record id.
        id: Uuid,
    },

    /// No correction exists with the given id.
    #[error("Error correction not found: {id}")]
    CorrectionNotFound {
        /// The correction id.
        id: Uuid,
    },

    /// No formula exists with the given id.
    #[error("Formula not found: {id}")]
    FormulaNotFound {
        /// The formula id.
        id: Uuid,
    },

    /// A request field failed validation.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// The invalid field.
        field: String,
        /// A description of the problem.
        message: String,
    },

    /// A batch was cancelled before this employee was processed.
    #[error("Calculation cancelled")]
    Cancelled,

    /// A worker failed unexpectedly.
    #[error("Internal error: {message}")]
    Internal {
        /// A description of the failure.
        message: String,
    },
}

impl EngineError {
    /// Returns a stable, machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::ConfigNotFound { .. } | EngineError::ConfigParseError { .. } => {
                "CONFIG_ERROR"
            }
            EngineError::Syntax { .. } => "SYNTAX_ERROR",
            EngineError::UnknownVariable { .. } => "UNKNOWN_VARIABLE",
            EngineError::FormulaCycle { .. } => "FORMULA_CYCLE",
            EngineError::IncompleteContext { .. } => "INCOMPLETE_CONTEXT",
            EngineError::Evaluation { .. } => "EVALUATION_ERROR",
            EngineError::DuplicateCalculation { .. } => "DUPLICATE_CALCULATION",
            EngineError::NegativeNetSalary { .. } => "NEGATIVE_NET_SALARY",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::EmployeeNotFound { .. } => "EMPLOYEE_NOT_FOUND",
            EngineError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            EngineError::CorrectionNotFound { .. } => "CORRECTION_NOT_FOUND",
            EngineError::FormulaNotFound { .. } => "FORMULA_NOT_FOUND",
            EngineError::Validation { .. } => "VALIDATION_ERROR",
            EngineError::Cancelled => "CANCELLED",
            EngineError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Wraps an evaluation fault with the field whose formula raised it.
    pub fn evaluation(field: impl Into<String>, source: EvaluationError) -> Self {
        EngineError::Evaluation {
            field: field.into(),
            source,
        }
    }
}

/// A type alias for Results that return EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
