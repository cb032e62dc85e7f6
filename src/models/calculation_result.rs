//! Calculation result models for the Payroll Formula Engine.
//!
//! This module contains the [`PayrollCalculationResult`] type and its
//! associated structures that capture all outputs of one calculation,
//! including itemized formula outputs, totals, and an audit trace.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FieldKind, PayPeriod};

/// One formula output in a calculation.
///
/// # Example
///
/// ```
/// use payroll_engine::models::{FieldKind, LineItem};
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
/// use uuid::Uuid;
///
/// let item = LineItem {
///     field: "overtimePay".to_string(),
///     formula_id: Uuid::nil(),
///     kind: FieldKind::Allowance,
///     value: Decimal::from_str("3750.00").unwrap(),
/// };
/// assert_eq!(item.kind, FieldKind::Allowance);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// The target field the formula computed.
    pub field: String,
    /// The formula version that produced the value.
    pub formula_id: Uuid,
    /// How the value contributes to totals.
    pub kind: FieldKind,
    /// The value, rounded to the engine's formula scale.
    pub value: Decimal,
}

/// A single step in the audit trace recording one formula evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStep {
    /// The sequential step number.
    pub step_number: u32,
    /// The id of the formula that was evaluated.
    pub rule_id: String,
    /// The target field of the formula.
    pub rule_name: String,
    /// The expression that was evaluated.
    pub expression: String,
    /// The variables the expression consumed and their values.
    pub input: serde_json::Value,
    /// The rounded output.
    pub output: serde_json::Value,
    /// Human-readable explanation of the step.
    pub reasoning: String,
}

/// The complete audit trace for a calculation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrace {
    /// The sequence of evaluation steps in dependency order.
    pub steps: Vec<AuditStep>,
}

/// The complete result of a payroll calculation.
///
/// Results carry no timestamps or random identifiers, so calculating the same
/// inputs twice yields equal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollCalculationResult {
    /// The employee the result belongs to.
    pub employee_id: String,
    /// The pay period covered.
    pub period: PayPeriod,
    /// Formula outputs in evaluation order.
    pub line_items: Vec<LineItem>,
    /// Basic salary plus all allowance-kind outputs.
    pub gross_salary: Decimal,
    /// Sum of all deduction-kind outputs.
    pub total_deductions: Decimal,
    /// Gross salary minus total deductions.
    pub net_salary: Decimal,
    /// The currency amounts are expressed in.
    pub currency: String,
    /// The audit trace of evaluated formulas.
    pub audit_trace: AuditTrace,
}

impl PayrollCalculationResult {
    /// Returns the line item for a given field, if one was computed.
    pub fn line_item(&self, field: &str) -> Option<&LineItem> {
        self.line_items.iter().find(|item| item.field == field)
    }
}
