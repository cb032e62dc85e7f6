//! Formula and variable definitions.
//!
//! This module contains the administrator-authored [`PayrollFormula`] and the
//! [`FormulaVariable`] vocabulary that formulas may reference.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::formula::Value;

/// Where the value of a [`FormulaVariable`] originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Attendance facts (working days, overtime).
    Attendance,
    /// Leave facts (leave days).
    Leave,
    /// Employee master data (basic salary, grade).
    Employee,
    /// Computed by the engine from other sources (exchange rate).
    Derived,
    /// A fixed value from configuration.
    Constant,
}

/// The type of a variable's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Fixed-point decimal.
    Decimal,
    /// Whole number.
    Integer,
    /// True or false.
    Boolean,
}

impl DataType {
    /// Returns true if a value of this type can be used in arithmetic.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Decimal | DataType::Integer)
    }
}

/// How a formula's output contributes to the payroll totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Added to gross salary.
    Allowance,
    /// Added to total deductions.
    Deduction,
    /// An intermediate value that does not feed the totals.
    #[default]
    Informational,
}

/// A well-known variable that formulas may reference.
///
/// # Example
///
/// ```
/// use payroll_engine::models::{DataType, FormulaVariable, SourceKind};
///
/// let variable = FormulaVariable {
///     name: "overtimeHours".to_string(),
///     source_kind: SourceKind::Attendance,
///     data_type: DataType::Decimal,
///     value: None,
/// };
/// assert!(variable.data_type.is_numeric());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaVariable {
    /// The identifier used in formula expressions.
    pub name: String,
    /// Where the value comes from.
    pub source_kind: SourceKind,
    /// The value's type.
    pub data_type: DataType,
    /// The fixed value for `Constant` variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A named, organization-scoped pay formula producing one output field.
///
/// Formulas are immutable during evaluation. Editing an expression creates a
/// new version of the formula in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollFormula {
    /// Unique identifier of this formula version.
    pub id: Uuid,
    /// The organization the formula belongs to.
    pub organization_id: String,
    /// Human-readable name.
    pub name: String,
    /// The output field this formula computes.
    pub target_field: String,
    /// How the output contributes to totals.
    pub kind: FieldKind,
    /// The formula source text.
    pub expression: String,
    /// Variables (including other formulas' fields) the expression may read.
    pub declared_variables: BTreeSet<String>,
    /// Whether the formula participates in calculations.
    pub is_active: bool,
    /// Monotonic version per (organization, target field).
    pub version: u32,
}
