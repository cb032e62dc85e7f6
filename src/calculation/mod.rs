//! Calculation logic for the payroll engine.
//!
//! This module evaluates an organization's formula set against an employee's
//! evaluation context, totals the outputs into gross, deductions and net
//! salary, and runs whole branches through a bounded worker pool.

mod batch;
mod calculator;
mod evaluation;

pub use batch::{BatchOutcome, CancellationToken, run_batch};
pub use calculator::Calculator;
pub use evaluation::run_formulas;
