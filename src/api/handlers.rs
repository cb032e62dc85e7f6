//! HTTP request handlers for the Payroll Formula Engine API.
//!
//! Every handler tags its log lines with a fresh correlation id and answers
//! with JSON, including on failure.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::calculation::CancellationToken;
use crate::error::EngineError;
use crate::formula::NewFormula;

use super::request::{
    ApproveRequest, BranchPayrollRequest, CalculationRequest, CorrectionRequest,
    CreateRecordRequest, RejectRequest, ValidateFormulaRequest,
};
use super::response::{
    ApiError, ApiErrorResponse, BranchPayrollResponse, EmployeeOutcome, ProcessCorrectionResponse,
    ValidateFormulaResponse,
};
use super::state::AppState;

/// Creates the API router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/payroll/calculate", post(calculate_handler))
        .route("/payroll/records", post(create_record_handler))
        .route("/payroll/records/:id", get(get_record_handler))
        .route("/payroll/records/:id/submit", post(submit_record_handler))
        .route("/payroll/records/:id/approve", post(approve_record_handler))
        .route("/payroll/records/:id/reject", post(reject_record_handler))
        .route("/payroll/records/:id/release", post(release_record_handler))
        .route("/payroll/records/:id/recalculate", post(recalculate_record_handler))
        .route("/payroll/records/:id/corrections", get(list_corrections_handler))
        .route("/payroll/branches/:branch_id/process", post(process_branch_handler))
        .route("/formulas", post(register_formula_handler))
        .route("/formulas/validate", post(validate_formula_handler))
        .route("/organizations/:organization_id/formulas", get(list_formulas_handler))
        .route("/corrections", post(request_correction_handler))
        .route("/corrections/:id", get(get_correction_handler))
        .route("/corrections/:id/approve", post(approve_correction_handler))
        .route("/corrections/:id/reject", post(reject_correction_handler))
        .route("/corrections/:id/process", post(process_correction_handler))
        .route("/corrections/:id/cancel", post(cancel_correction_handler))
        .with_state(state)
}

/// Handler for POST /payroll/calculate.
///
/// Calculates without storing a record, optionally with what-if overrides.
async fn calculate_handler(
    State(state): State<AppState>,
    payload: Result<Json<CalculationRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(correlation_id = %correlation_id, "Processing calculation request");
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let calculator = state.payroll().calculator();
    let result = match &request.overrides {
        Some(changes) => {
            calculator.calculate_with_overrides(&request.employee_id, request.period, changes)
        }
        None => calculator.calculate(&request.employee_id, request.period),
    };
    respond(correlation_id, StatusCode::OK, result)
}

/// Handler for POST /payroll/records.
async fn create_record_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(
        correlation_id = %correlation_id,
        employee_id = %request.employee_id,
        period = %request.period,
        "Creating payroll record"
    );
    let result = state
        .payroll()
        .create_payroll_record(&request.employee_id, request.period);
    respond(correlation_id, StatusCode::CREATED, result)
}

async fn get_record_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    respond(Uuid::new_v4(), StatusCode::OK, state.payroll().get(id))
}

async fn submit_record_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(correlation_id = %correlation_id, record_id = %id, "Submitting payroll record");
    respond(correlation_id, StatusCode::OK, state.payroll().submit_for_approval(id))
}

async fn approve_record_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ApproveRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(correlation_id = %correlation_id, record_id = %id, "Approving payroll record");
    respond(correlation_id, StatusCode::OK, state.payroll().approve(id, &request.approver))
}

async fn reject_record_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RejectRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(correlation_id = %correlation_id, record_id = %id, "Rejecting payroll record");
    let result = state
        .payroll()
        .reject(id, &request.approver, &request.reason);
    respond(correlation_id, StatusCode::OK, result)
}

async fn release_record_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(correlation_id = %correlation_id, record_id = %id, "Releasing payroll record");
    respond(correlation_id, StatusCode::OK, state.payroll().release(id))
}

async fn recalculate_record_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(correlation_id = %correlation_id, record_id = %id, "Recalculating payroll record");
    respond(correlation_id, StatusCode::OK, state.payroll().recalculate(id))
}

async fn list_corrections_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let result = state
        .payroll()
        .get(id)
        .map(|record| state.corrections().list_for_record(record.id));
    respond(correlation_id, StatusCode::OK, result)
}

/// Handler for POST /payroll/branches/:branch_id/process.
///
/// Runs the whole branch and reports every employee individually. The
/// response is 200 even when some employees fail.
async fn process_branch_handler(
    State(state): State<AppState>,
    Path(branch_id): Path<String>,
    payload: Result<Json<BranchPayrollRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(
        correlation_id = %correlation_id,
        branch_id = %branch_id,
        period = %request.period,
        commit = request.commit,
        "Processing branch payroll"
    );

    let cancellation = CancellationToken::new();
    let outcomes = if request.commit {
        state
            .payroll()
            .process_branch_payroll(&branch_id, request.period, cancellation)
            .await
            .into_iter()
            .map(EmployeeOutcome::from_record)
            .collect()
    } else {
        state
            .payroll()
            .calculate_branch(&branch_id, request.period, cancellation)
            .await
            .into_iter()
            .map(EmployeeOutcome::from_result)
            .collect()
    };
    let response = BranchPayrollResponse::new(branch_id, request.period, request.commit, outcomes);
    info!(
        correlation_id = %correlation_id,
        succeeded = response.succeeded,
        failed = response.failed,
        "Branch payroll processed"
    );
    json_response(StatusCode::OK, &response)
}

/// Handler for POST /formulas.
async fn register_formula_handler(
    State(state): State<AppState>,
    payload: Result<Json<NewFormula>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(
        correlation_id = %correlation_id,
        organization_id = %request.organization_id,
        target_field = %request.target_field,
        "Registering formula"
    );
    respond(correlation_id, StatusCode::CREATED, state.registry().register(request))
}

/// Handler for POST /formulas/validate.
async fn validate_formula_handler(
    State(state): State<AppState>,
    payload: Result<Json<ValidateFormulaRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let result = state
        .registry()
        .validate_for(&request.organization_id, &request.expression)
        .map(|variables| ValidateFormulaResponse {
            valid: true,
            variables,
        });
    respond(correlation_id, StatusCode::OK, result)
}

async fn list_formulas_handler(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Response {
    json_response(StatusCode::OK, &state.registry().list(&organization_id))
}

/// Handler for POST /corrections.
async fn request_correction_handler(
    State(state): State<AppState>,
    payload: Result<Json<CorrectionRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(
        correlation_id = %correlation_id,
        record_id = %request.payroll_record_id,
        "Requesting error correction"
    );
    let result = state.corrections().request(
        request.payroll_record_id,
        &request.requested_by,
        &request.reason,
        request.proposed_changes,
    );
    respond(correlation_id, StatusCode::CREATED, result)
}

async fn get_correction_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    respond(Uuid::new_v4(), StatusCode::OK, state.corrections().get(id))
}

async fn approve_correction_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ApproveRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(correlation_id = %correlation_id, correction_id = %id, "Approving error correction");
    respond(
        correlation_id,
        StatusCode::OK,
        state.corrections().approve(id, &request.approver),
    )
}

async fn reject_correction_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RejectRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let request = match parse_body(correlation_id, payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(correlation_id = %correlation_id, correction_id = %id, "Rejecting error correction");
    let result = state
        .corrections()
        .reject(id, &request.approver, &request.reason);
    respond(correlation_id, StatusCode::OK, result)
}

async fn process_correction_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(correlation_id = %correlation_id, correction_id = %id, "Processing error correction");
    let result = state
        .corrections()
        .process(id)
        .map(|(correction, record)| ProcessCorrectionResponse { correction, record });
    respond(correlation_id, StatusCode::OK, result)
}

async fn cancel_correction_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(correlation_id = %correlation_id, correction_id = %id, "Cancelling error correction");
    respond(correlation_id, StatusCode::OK, state.corrections().cancel(id))
}

/// Unwraps a JSON body or turns the rejection into a 400 response.
fn parse_body<T>(correlation_id: Uuid, payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    let rejection = match payload {
        Ok(Json(request)) => return Ok(request),
        Err(rejection) => rejection,
    };
    let error = match rejection {
        JsonRejection::JsonDataError(err) => {
            let body_text = err.body_text();
            warn!(
                correlation_id = %correlation_id,
                error = %body_text,
                "JSON data error"
            );
            if body_text.contains("missing field") {
                ApiError::validation_error(body_text)
            } else {
                ApiError::malformed_json(body_text)
            }
        }
        JsonRejection::JsonSyntaxError(err) => {
            warn!(
                correlation_id = %correlation_id,
                error = %err,
                "JSON syntax error"
            );
            ApiError::malformed_json(format!("Invalid JSON syntax: {}", err))
        }
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::new("MISSING_CONTENT_TYPE", "Content-Type must be application/json")
        }
        _ => ApiError::malformed_json("Failed to parse request body"),
    };
    Err(json_response(StatusCode::BAD_REQUEST, &error))
}

/// Serializes a successful result or maps the engine error to its status.
fn respond<T: Serialize>(correlation_id: Uuid, status: StatusCode, result: Result<T, EngineError>) -> Response {
    match result {
        Ok(body) => json_response(status, &body),
        Err(err) => {
            warn!(
                correlation_id = %correlation_id,
                code = err.error_code(),
                error = %err,
                "Request failed"
            );
            ApiErrorResponse::from(err).into_response()
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], Json(body)).into_response()
}
