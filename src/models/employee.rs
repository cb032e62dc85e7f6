//! Employee master data.
//!
//! This module defines the [`EmployeeProfile`] snapshot consumed from the
//! employee master-data collaborator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The master-data view of an employee needed for payroll.
///
/// Salary and grade are optional because upstream HR records may be
/// incomplete; a missing value surfaces as an incomplete context when the
/// employee is calculated, not when the profile is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    /// Unique identifier for the employee.
    pub id: String,
    /// The organization whose formula set applies to this employee.
    pub organization_id: String,
    /// The branch the employee belongs to, used for batch runs.
    pub branch_id: String,
    /// Monthly basic salary in the employee's currency.
    #[serde(default)]
    pub basic_salary: Option<Decimal>,
    /// Numeric pay grade.
    #[serde(default)]
    pub grade: Option<i64>,
    /// ISO 4217 currency code the employee is paid in.
    pub currency: String,
}
