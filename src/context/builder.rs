//! Evaluation context assembly.
//!
//! A [`ContextBuilder`] snapshots everything one employee's calculation may
//! read into an immutable [`EvaluationContext`]. The snapshot is taken once,
//! before any formula runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::sources::{AttendanceSource, CurrencySource, EmployeeDirectory};
use super::variables::names;
use crate::config::EngineSettings;
use crate::error::{EngineError, EngineResult};
use crate::formula::{Value, Variables};
use crate::models::{EmployeeProfile, FormulaVariable, PayPeriod, SourceKind};

/// The variable snapshot for one employee and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationContext {
    employee_id: String,
    period: PayPeriod,
    currency: String,
    values: BTreeMap<String, Value>,
}

impl EvaluationContext {
    /// Creates a context from explicit bindings.
    pub fn new(
        employee_id: impl Into<String>,
        period: PayPeriod,
        currency: impl Into<String>,
        values: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            employee_id: employee_id.into(),
            period,
            currency: currency.into(),
            values,
        }
    }

    /// The employee the context was built for.
    pub fn employee_id(&self) -> &str {
        &self.employee_id
    }

    /// The pay period the context covers.
    pub fn period(&self) -> PayPeriod {
        self.period
    }

    /// The employee's pay currency.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Returns a bound value.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    /// Returns true if `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// All bindings, sorted by name.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Returns a new snapshot with some bindings replaced.
    ///
    /// Only bound variables can be overridden, and a boolean cannot be
    /// replaced by a number or the other way round.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, Value>) -> EngineResult<Self> {
        let mut values = self.values.clone();
        for (name, value) in overrides {
            let current = values
                .get_mut(name)
                .ok_or_else(|| EngineError::UnknownVariable { name: name.clone() })?;
            if matches!(current, Value::Boolean(_)) != matches!(value, Value::Boolean(_)) {
                return Err(EngineError::Validation {
                    field: format!("variable_overrides.{}", name),
                    message: format!("expected {}, found {}", current.type_name(), value.type_name()),
                });
            }
            *current = *value;
        }
        Ok(Self {
            values,
            ..self.clone()
        })
    }
}

impl Variables for EvaluationContext {
    fn get_value(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

/// Builds evaluation contexts from the upstream collaborators.
#[derive(Clone)]
pub struct ContextBuilder {
    employees: Arc<dyn EmployeeDirectory>,
    attendance: Arc<dyn AttendanceSource>,
    currency: Arc<dyn CurrencySource>,
    constants: BTreeMap<String, Value>,
    base_currency: String,
    default_overtime_rate: Decimal,
}

impl ContextBuilder {
    /// Creates a builder over the given collaborators.
    pub fn new(
        employees: Arc<dyn EmployeeDirectory>,
        attendance: Arc<dyn AttendanceSource>,
        currency: Arc<dyn CurrencySource>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            employees,
            attendance,
            currency,
            constants: BTreeMap::new(),
            base_currency: settings.base_currency.clone(),
            default_overtime_rate: settings.default_overtime_rate,
        }
    }

    /// Binds every `Constant` variable that carries a value into each context.
    pub fn with_constants<'a>(mut self, vocabulary: impl IntoIterator<Item = &'a FormulaVariable>) -> Self {
        self.constants.extend(
            vocabulary
                .into_iter()
                .filter(|variable| variable.source_kind == SourceKind::Constant)
                .filter_map(|variable| variable.value.map(|value| (variable.name.clone(), value))),
        );
        self
    }

    /// Looks up an employee's master data.
    pub fn employee(&self, employee_id: &str) -> EngineResult<EmployeeProfile> {
        self.employees
            .employee(employee_id)
            .ok_or_else(|| EngineError::EmployeeNotFound {
                employee_id: employee_id.to_string(),
            })
    }

    /// Lists a branch's employees.
    pub fn employees_in_branch(&self, branch_id: &str) -> Vec<EmployeeProfile> {
        self.employees.employees_in_branch(branch_id)
    }

    /// Builds the context for an employee by id.
    pub fn build_context(&self, employee_id: &str, period: PayPeriod) -> EngineResult<EvaluationContext> {
        let employee = self.employee(employee_id)?;
        self.build_for(&employee, period)
    }

    /// Builds the context for an already loaded employee.
    ///
    /// Fails with [`EngineError::IncompleteContext`] naming the first
    /// variable that could not be resolved.
    pub fn build_for(&self, employee: &EmployeeProfile, period: PayPeriod) -> EngineResult<EvaluationContext> {
        let missing = |variable: &str| EngineError::IncompleteContext {
            employee_id: employee.id.clone(),
            variable: variable.to_string(),
        };
        let (start, end) = (period.start_date(), period.end_date());

        let basic_salary = employee
            .basic_salary
            .ok_or_else(|| missing(names::BASIC_SALARY))?;
        let grade = employee.grade.ok_or_else(|| missing(names::GRADE))?;
        let facts = self
            .attendance
            .attendance_facts(&employee.id, start, end)
            .ok_or_else(|| missing(names::WORKING_DAYS))?;
        let days = facts.days;
        let overtime_hours = facts.overtime_hours;
        let overtime_rate = facts.overtime_rate.unwrap_or(self.default_overtime_rate);
        let exchange_rate = self
            .currency
            .exchange_rate(&employee.currency, &self.base_currency)
            .ok_or_else(|| missing(names::EXCHANGE_RATE))?;

        let mut values = self.constants.clone();
        values.extend([
            (names::BASIC_SALARY.to_string(), Value::Decimal(basic_salary)),
            (names::GRADE.to_string(), Value::Integer(grade)),
            (names::WORKING_DAYS.to_string(), days.working_days.into()),
            (
                names::ACTUAL_WORKING_DAYS.to_string(),
                days.actual_working_days.into(),
            ),
            (names::ABSENT_DAYS.to_string(), days.absent_days.into()),
            (names::LEAVE_DAYS.to_string(), days.leave_days.into()),
            (names::CALENDAR_DAYS.to_string(), period.calendar_days().into()),
            (names::OVERTIME_HOURS.to_string(), Value::Decimal(overtime_hours)),
            (names::OVERTIME_RATE.to_string(), Value::Decimal(overtime_rate)),
            (names::EXCHANGE_RATE.to_string(), Value::Decimal(exchange_rate)),
        ]);

        debug!(
            employee_id = %employee.id,
            period = %period,
            variables = values.len(),
            "Built evaluation context"
        );
        Ok(EvaluationContext::new(
            employee.id.clone(),
            period,
            employee.currency.clone(),
            values,
        ))
    }
}
