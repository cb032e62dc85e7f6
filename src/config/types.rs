//! Configuration types for the payroll engine.
//!
//! This module contains the strongly-typed configuration structures that
//! are deserialized from YAML configuration files.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::context::AttendanceFacts;
use crate::formula::NewFormula;
use crate::models::{EmployeeProfile, FieldKind, FormulaVariable, PayPeriod};

/// Engine-wide settings from `engine.yaml`.
///
/// Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Decimal places each formula output is rounded to.
    pub scale: u32,
    /// Minor-unit precision for totals when a currency has no explicit entry.
    pub currency_precision: u32,
    /// Per-currency minor-unit precision (e.g. `JPY: 0`).
    pub currency_precisions: BTreeMap<String, u32>,
    /// Currency every `exchangeRate` converts into.
    pub base_currency: String,
    /// Overtime multiplier when attendance provides none.
    pub default_overtime_rate: Decimal,
    /// Batch worker count; zero means one per available CPU core.
    pub batch_workers: usize,
    /// Field kinds for formulas that do not declare their own.
    pub field_kinds: BTreeMap<String, FieldKind>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scale: 2,
            currency_precision: 2,
            currency_precisions: BTreeMap::new(),
            base_currency: "USD".to_string(),
            default_overtime_rate: Decimal::new(15, 1),
            batch_workers: 0,
            field_kinds: BTreeMap::new(),
        }
    }
}

impl EngineSettings {
    /// Returns the minor-unit precision for a currency.
    pub fn precision_for(&self, currency: &str) -> u32 {
        self.currency_precisions
            .get(currency)
            .copied()
            .unwrap_or(self.currency_precision)
    }

    /// Returns the number of batch workers to run.
    pub fn worker_count(&self) -> usize {
        if self.batch_workers > 0 {
            return self.batch_workers;
        }
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}

/// Extra variables from `variables.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariablesConfig {
    /// Constant variables available to every formula.
    #[serde(default)]
    pub variables: Vec<FormulaVariable>,
}

/// One formula in an organization's formula file.
#[derive(Debug, Clone, Deserialize)]
pub struct FormulaDefinition {
    /// Human-readable name.
    pub name: String,
    /// Output field.
    pub target_field: String,
    /// Contribution to totals; falls back to `engine.yaml` field kinds.
    #[serde(default)]
    pub kind: Option<FieldKind>,
    /// Formula source.
    pub expression: String,
    /// Explicit inputs; derived from the expression when absent.
    #[serde(default)]
    pub declared_variables: Option<BTreeSet<String>>,
    /// Whether the formula is active after loading.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// An organization's formula file under `formulas/`.
#[derive(Debug, Clone, Deserialize)]
pub struct FormulaFile {
    /// The organization the formulas belong to.
    pub organization_id: String,
    /// The formulas.
    #[serde(default)]
    pub formulas: Vec<FormulaDefinition>,
}

impl FormulaFile {
    /// Converts the definitions into registry submissions.
    pub fn to_new_formulas(&self, settings: &EngineSettings) -> Vec<NewFormula> {
        self.formulas
            .iter()
            .map(|definition| NewFormula {
                organization_id: self.organization_id.clone(),
                name: definition.name.clone(),
                target_field: definition.target_field.clone(),
                kind: definition
                    .kind
                    .or_else(|| settings.field_kinds.get(&definition.target_field).copied())
                    .unwrap_or_default(),
                expression: definition.expression.clone(),
                declared_variables: definition.declared_variables.clone(),
                activate: definition.active,
            })
            .collect()
    }
}

/// Attendance facts for one employee and period in `fixtures.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceFixture {
    /// The employee.
    pub employee_id: String,
    /// The pay period.
    pub period: PayPeriod,
    /// The facts.
    #[serde(flatten)]
    pub facts: AttendanceFacts,
}

/// An exchange rate in `fixtures.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRateFixture {
    /// Source currency.
    pub from: String,
    /// Target currency.
    pub to: String,
    /// Units of `to` per unit of `from`.
    pub rate: Decimal,
}

/// Seed data for the in-memory collaborators.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixturesConfig {
    /// Employee master data.
    #[serde(default)]
    pub employees: Vec<EmployeeProfile>,
    /// Attendance facts.
    #[serde(default)]
    pub attendance: Vec<AttendanceFixture>,
    /// Exchange rates.
    #[serde(default)]
    pub exchange_rates: Vec<ExchangeRateFixture>,
}
