//! Upstream data collaborators.
//!
//! The engine only reads from attendance, currency and employee master data.
//! Each collaborator is a trait so deployments can plug in their own services;
//! the in-memory implementations back the demo server and the tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{EmployeeProfile, PayPeriod};

/// Day counts for one employee over a date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkingDaysInfo {
    /// Scheduled working days in the range.
    pub working_days: u32,
    /// Days actually worked.
    pub actual_working_days: u32,
    /// Unexcused absences.
    pub absent_days: u32,
    /// Approved leave days.
    pub leave_days: u32,
}

/// Attendance and leave facts.
pub trait AttendanceSource: Send + Sync {
    /// Returns every attendance fact for the inclusive date range in one read,
    /// or `None` if nothing is recorded for it.
    fn attendance_facts(
        &self,
        employee_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<AttendanceFacts>;

    /// Returns day counts for the inclusive date range, or `None` if unknown.
    fn working_days_info(
        &self,
        employee_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<WorkingDaysInfo> {
        self.attendance_facts(employee_id, start, end)
            .map(|facts| facts.days)
    }

    /// Returns overtime hours worked in the inclusive date range.
    fn overtime_hours(&self, employee_id: &str, start: NaiveDate, end: NaiveDate) -> Option<Decimal> {
        self.attendance_facts(employee_id, start, end)
            .map(|facts| facts.overtime_hours)
    }
}

/// Exchange rate lookups.
pub trait CurrencySource: Send + Sync {
    /// Returns the rate converting one unit of `from` into `to`.
    fn exchange_rate(&self, from: &str, to: &str) -> Option<Decimal>;
}

/// Employee master data.
pub trait EmployeeDirectory: Send + Sync {
    /// Looks up one employee.
    fn employee(&self, employee_id: &str) -> Option<EmployeeProfile>;

    /// Lists every employee of a branch.
    fn employees_in_branch(&self, branch_id: &str) -> Vec<EmployeeProfile>;
}

/// Attendance facts for one employee and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttendanceFacts {
    /// Day counts.
    #[serde(flatten)]
    pub days: WorkingDaysInfo,
    /// Overtime hours worked.
    #[serde(default)]
    pub overtime_hours: Decimal,
    /// Employee-specific overtime multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overtime_rate: Option<Decimal>,
}

/// Attendance facts held in memory, keyed by employee and month.
#[derive(Debug, Default)]
pub struct InMemoryAttendance {
    facts: RwLock<HashMap<(String, NaiveDate), AttendanceFacts>>,
}

impl InMemoryAttendance {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the facts for an employee's pay period, replacing earlier ones.
    pub fn record(&self, employee_id: impl Into<String>, period: PayPeriod, facts: AttendanceFacts) {
        self.facts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((employee_id.into(), period.start_date()), facts);
    }

    fn lookup(&self, employee_id: &str, start: NaiveDate, end: NaiveDate) -> Option<AttendanceFacts> {
        let facts = self.facts.read().unwrap_or_else(PoisonError::into_inner);
        let found = facts.get(&(employee_id.to_string(), start)).copied()?;
        // Only whole months are recorded.
        PayPeriod::new(start.month(), start.year())
            .ok()
            .filter(|period| period.end_date() == end)
            .map(|_| found)
    }
}

impl AttendanceSource for InMemoryAttendance {
    fn attendance_facts(
        &self,
        employee_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<AttendanceFacts> {
        self.lookup(employee_id, start, end)
    }
}

/// Exchange rates held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCurrency {
    rates: RwLock<HashMap<(String, String), Decimal>>,
}

impl InMemoryCurrency {
    /// Creates an empty rate table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rate converting `from` into `to`.
    pub fn set_rate(&self, from: impl Into<String>, to: impl Into<String>, rate: Decimal) {
        self.rates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((from.into(), to.into()), rate);
    }
}

impl CurrencySource for InMemoryCurrency {
    fn exchange_rate(&self, from: &str, to: &str) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        self.rates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }
}

/// Employee master data held in memory.
#[derive(Debug, Default)]
pub struct InMemoryEmployeeDirectory {
    employees: RwLock<HashMap<String, EmployeeProfile>>,
}

impl InMemoryEmployeeDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an employee.
    pub fn upsert(&self, employee: EmployeeProfile) {
        self.employees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(employee.id.clone(), employee);
    }
}

impl EmployeeDirectory for InMemoryEmployeeDirectory {
    fn employee(&self, employee_id: &str) -> Option<EmployeeProfile> {
        self.employees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(employee_id)
            .cloned()
    }

    fn employees_in_branch(&self, branch_id: &str) -> Vec<EmployeeProfile> {
        let mut employees: Vec<EmployeeProfile> = self
            .employees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|employee| employee.branch_id == branch_id)
            .cloned()
            .collect();
        employees.sort_by(|a, b| a.id.cmp(&b.id));
        employees
    }
}
