//! Core data models for the Payroll Formula Engine.
//!
//! This module contains all the domain models used throughout the engine.

mod calculation_result;
mod correction;
mod employee;
mod formula;
mod pay_period;
mod payroll_record;

pub use calculation_result::{AuditStep, AuditTrace, LineItem, PayrollCalculationResult};
pub use correction::{CorrectionStatus, PayrollErrorCorrection, ProposedChanges};
pub use employee::EmployeeProfile;
pub use formula::{DataType, FieldKind, FormulaVariable, PayrollFormula, SourceKind};
pub use pay_period::PayPeriod;
pub use payroll_record::{PayrollRecord, RecordStatus};
