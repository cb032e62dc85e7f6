//! The calculation orchestrator.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::evaluation::run_formulas;
use crate::config::EngineSettings;
use crate::context::ContextBuilder;
use crate::error::EngineResult;
use crate::formula::FormulaRegistry;
use crate::models::{EmployeeProfile, PayPeriod, PayrollCalculationResult, ProposedChanges};

/// Calculates payroll for one employee at a time.
///
/// A `Calculator` is cheap to clone and safe to share across threads.
#[derive(Clone)]
pub struct Calculator {
    registry: Arc<FormulaRegistry>,
    contexts: ContextBuilder,
    settings: Arc<EngineSettings>,
}

impl Calculator {
    /// Creates a calculator.
    pub fn new(
        registry: Arc<FormulaRegistry>,
        contexts: ContextBuilder,
        settings: Arc<EngineSettings>,
    ) -> Self {
        Self {
            registry,
            contexts,
            settings,
        }
    }

    /// The formula registry.
    pub fn registry(&self) -> &FormulaRegistry {
        &self.registry
    }

    /// The context builder.
    pub fn contexts(&self) -> &ContextBuilder {
        &self.contexts
    }

    /// The engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Calculates an employee's payroll for a period.
    pub fn calculate(
        &self,
        employee_id: &str,
        period: PayPeriod,
    ) -> EngineResult<PayrollCalculationResult> {
        let employee = self.contexts.employee(employee_id)?;
        self.calculate_employee(&employee, period, None)
    }

    /// Calculates with variable and formula overrides applied.
    ///
    /// Variable overrides replace context values; formula overrides replace
    /// the expression of an active formula for this calculation only.
    pub fn calculate_with_overrides(
        &self,
        employee_id: &str,
        period: PayPeriod,
        changes: &ProposedChanges,
    ) -> EngineResult<PayrollCalculationResult> {
        let employee = self.contexts.employee(employee_id)?;
        self.calculate_employee(&employee, period, Some(changes))
    }

    /// Calculates for an already loaded employee.
    pub fn calculate_employee(
        &self,
        employee: &EmployeeProfile,
        period: PayPeriod,
        changes: Option<&ProposedChanges>,
    ) -> EngineResult<PayrollCalculationResult> {
        let start_time = Instant::now();

        let mut context = self.contexts.build_for(employee, period)?;
        let mut set = self.registry.formula_set(&employee.organization_id)?;
        if let Some(changes) = changes {
            context = context.with_overrides(&changes.variable_overrides)?;
            for (field, expression) in &changes.formula_overrides {
                set = set.with_override(field, expression)?;
            }
        }

        match run_formulas(&set, &context, &self.settings) {
            Ok(result) => {
                info!(
                    employee_id = %employee.id,
                    period = %period,
                    formulas = set.len(),
                    gross_salary = %result.gross_salary,
                    net_salary = %result.net_salary,
                    overrides = changes.is_some(),
                    duration_us = start_time.elapsed().as_micros(),
                    "Payroll calculated"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(
                    employee_id = %employee.id,
                    period = %period,
                    error = %err,
                    "Payroll calculation failed"
                );
                Err(err)
            }
        }
    }
}
