//! Payroll record and error correction lifecycles.
//!
//! [`PayrollService`] turns calculations into versioned records and moves
//! them from `Calculated` to `Released`. [`CorrectionService`] amends
//! released records by superseding them with a corrected version.

mod correction;
mod in_flight;
mod service;
mod store;

pub use correction::CorrectionService;
pub use in_flight::{InFlightCalculations, InFlightGuard};
pub use service::PayrollService;
pub use store::RecordStore;
