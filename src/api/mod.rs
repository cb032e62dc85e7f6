//! HTTP API module for the Payroll Formula Engine.
//!
//! This module exposes calculation, payroll record, formula authoring and
//! error correction operations as JSON endpoints.

mod handlers;
mod request;
mod response;
mod state;

pub use handlers::create_router;
pub use request::{
    ApproveRequest, BranchPayrollRequest, CalculationRequest, CorrectionRequest,
    CreateRecordRequest, RejectRequest, ValidateFormulaRequest,
};
pub use response::{
    ApiError, ApiErrorResponse, BranchPayrollResponse, EmployeeOutcome, ProcessCorrectionResponse,
    ValidateFormulaResponse,
};
pub use state::AppState;
