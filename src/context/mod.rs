//! Variable resolution.
//!
//! This module turns upstream attendance, currency and master data into the
//! per-employee [`EvaluationContext`] that formulas are evaluated against.

mod builder;
mod sources;
mod variables;

pub use builder::{ContextBuilder, EvaluationContext};
pub use sources::{
    AttendanceFacts, AttendanceSource, CurrencySource, EmployeeDirectory, InMemoryAttendance,
    InMemoryCurrency, InMemoryEmployeeDirectory, WorkingDaysInfo,
};
pub use variables::{builtin_variables, names};
