//! The built-in variable vocabulary.

use crate::models::{DataType, FormulaVariable, SourceKind};

/// Names of the variables every evaluation context binds.
pub mod names {
    /// Monthly basic salary.
    pub const BASIC_SALARY: &str = "basicSalary";
    /// Pay grade.
    pub const GRADE: &str = "grade";
    /// Scheduled working days in the period.
    pub const WORKING_DAYS: &str = "workingDays";
    /// Days actually worked.
    pub const ACTUAL_WORKING_DAYS: &str = "actualWorkingDays";
    /// Unexcused absences.
    pub const ABSENT_DAYS: &str = "absentDays";
    /// Approved leave days.
    pub const LEAVE_DAYS: &str = "leaveDays";
    /// Days in the calendar month.
    pub const CALENDAR_DAYS: &str = "calendarDays";
    /// Overtime hours worked.
    pub const OVERTIME_HOURS: &str = "overtimeHours";
    /// Overtime multiplier.
    pub const OVERTIME_RATE: &str = "overtimeRate";
    /// Rate from the employee's currency to the base currency.
    pub const EXCHANGE_RATE: &str = "exchangeRate";
}

/// Returns the variables bound by [`ContextBuilder`](super::ContextBuilder).
pub fn builtin_variables() -> Vec<FormulaVariable> {
    [
        (names::BASIC_SALARY, SourceKind::Employee, DataType::Decimal),
        (names::GRADE, SourceKind::Employee, DataType::Integer),
        (names::WORKING_DAYS, SourceKind::Attendance, DataType::Integer),
        (names::ACTUAL_WORKING_DAYS, SourceKind::Attendance, DataType::Integer),
        (names::ABSENT_DAYS, SourceKind::Attendance, DataType::Integer),
        (names::LEAVE_DAYS, SourceKind::Leave, DataType::Integer),
        (names::CALENDAR_DAYS, SourceKind::Derived, DataType::Integer),
        (names::OVERTIME_HOURS, SourceKind::Attendance, DataType::Decimal),
        (names::OVERTIME_RATE, SourceKind::Attendance, DataType::Decimal),
        (names::EXCHANGE_RATE, SourceKind::Derived, DataType::Decimal),
    ]
    .into_iter()
    .map(|(name, source_kind, data_type)| FormulaVariable {
        name: name.to_string(),
        source_kind,
        data_type,
        value: None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_builtin_names_are_unique() {
        let variables = builtin_variables();
        let names: BTreeSet<_> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names.len(), variables.len());
        assert!(variables.iter().all(|v| v.data_type.is_numeric()));
    }
}
