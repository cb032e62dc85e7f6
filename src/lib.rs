//! Payroll Formula Engine
//!
//! This crate evaluates organization-defined payroll formulas against each
//! employee's attendance and master data, totals the results into gross,
//! deductions and net salary, and tracks the outcome through an approval
//! lifecycle with supervised error corrections.

#![warn(missing_docs)]

pub mod api;
pub mod calculation;
pub mod config;
pub mod context;
pub mod error;
pub mod formula;
pub mod lifecycle;
pub mod models;
