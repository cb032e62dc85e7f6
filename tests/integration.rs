//! Integration tests for the Payroll Formula Engine HTTP API.
//!
//! These tests drive the router end to end against `config/default`:
//! - Calculation of the reference employee
//! - Formula registration and validation
//! - Duplicate calculation detection
//! - The record lifecycle from creation to release
//! - Error correction superseding a released record
//! - Branch processing with per-employee failures

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use payroll_engine::api::{AppState, create_router};
use payroll_engine::config::ConfigLoader;

// =============================================================================
// Test Helpers
// =============================================================================

fn create_router_for_test() -> Router {
    let config = ConfigLoader::load("./config/default").expect("Failed to load config");
    create_router(AppState::from_config(&config).expect("Failed to build state"))
}

fn march() -> Value {
    json!({"month": 3, "year": 2026})
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap();
    (status, json)
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(router, "POST", uri, Some(body)).await
}

fn line_item<'a>(result: &'a Value, field: &str) -> &'a Value {
    result["line_items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["field"] == field)
        .map(|item| &item["value"])
        .unwrap_or_else(|| panic!("no line item for {}", field))
}

async fn released_record(router: &Router) -> Value {
    let (status, record) = post(
        router,
        "/payroll/records",
        json!({"employee_id": "emp_001", "period": march()}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = record["id"].as_str().unwrap().to_string();

    let (status, _) = post(router, &format!("/payroll/records/{}/submit", id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(
        router,
        &format!("/payroll/records/{}/approve", id),
        json!({"approver": "mgr_01"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, record) = post(router, &format!("/payroll/records/{}/release", id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    record
}

// =============================================================================
// Calculation
// =============================================================================

#[tokio::test]
async fn test_reference_employee_calculation() {
    let router = create_router_for_test();
    let (status, result) = post(
        &router,
        "/payroll/calculate",
        json!({"employee_id": "emp_001", "period": march()}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(line_item(&result, "overtimePay"), "3750.00");
    assert_eq!(line_item(&result, "dailyRate"), "2272.73");
    assert_eq!(line_item(&result, "absenceDeduction"), "4545.46");
    assert_eq!(line_item(&result, "attendanceBonus"), "0.00");
    assert_eq!(result["gross_salary"], "53750.00");
    assert_eq!(result["total_deductions"], "7045.46");
    assert_eq!(result["net_salary"], "46704.54");
    assert_eq!(result["currency"], "USD");
}

#[tokio::test]
async fn test_audit_trace_follows_dependency_order() {
    let router = create_router_for_test();
    let (_, result) = post(
        &router,
        "/payroll/calculate",
        json!({"employee_id": "emp_001", "period": march()}),
    )
    .await;

    let fields: Vec<&str> = result["audit_trace"]["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|step| step["rule_name"].as_str().unwrap())
        .collect();
    let daily = fields.iter().position(|f| *f == "dailyRate").unwrap();
    let absence = fields.iter().position(|f| *f == "absenceDeduction").unwrap();
    assert!(daily < absence);
    assert_eq!(fields.len(), 6);
}

#[tokio::test]
async fn test_what_if_overrides_do_not_store_anything() {
    let router = create_router_for_test();
    let (status, result) = post(
        &router,
        "/payroll/calculate",
        json!({
            "employee_id": "emp_001",
            "period": march(),
            "overrides": {"variable_overrides": {"absentDays": 0}}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["net_salary"], "51750.00");

    // A record can still be created afterwards.
    let (status, _) = post(
        &router,
        "/payroll/records",
        json!({"employee_id": "emp_001", "period": march()}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_missing_salary_is_incomplete_context() {
    let router = create_router_for_test();
    let (status, error) = post(
        &router,
        "/payroll/calculate",
        json!({"employee_id": "emp_003", "period": march()}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "INCOMPLETE_CONTEXT");
    assert!(error["message"].as_str().unwrap().contains("basicSalary"));
}

#[tokio::test]
async fn test_foreign_currency_employee() {
    let router = create_router_for_test();
    let (status, result) = post(
        &router,
        "/payroll/calculate",
        json!({"employee_id": "emp_004", "period": march()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["currency"], "EUR");
    assert_eq!(line_item(&result, "overtimePay"), "120.00");
}

// =============================================================================
// Formulas
// =============================================================================

#[tokio::test]
async fn test_formula_with_undeclared_variable_is_rejected() {
    let router = create_router_for_test();
    let (status, error) = post(
        &router,
        "/formulas",
        json!({
            "organization_id": "org_acme",
            "name": "Bonus",
            "target_field": "bonus",
            "kind": "allowance",
            "expression": "bonusX * 2"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "UNKNOWN_VARIABLE");
    assert_eq!(error["message"], "Unknown variable: bonusX");
}

#[tokio::test]
async fn test_registered_formula_feeds_totals() {
    let router = create_router_for_test();
    let (status, formula) = post(
        &router,
        "/formulas",
        json!({
            "organization_id": "org_acme",
            "name": "Grade bonus",
            "target_field": "gradeBonus",
            "kind": "allowance",
            "expression": "grade * 100"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(formula["version"], 1);
    assert_eq!(formula["declared_variables"], json!(["grade"]));

    let (_, result) = post(
        &router,
        "/payroll/calculate",
        json!({"employee_id": "emp_001", "period": march()}),
    )
    .await;
    assert_eq!(result["gross_salary"], "54150.00");
}

#[tokio::test]
async fn test_validate_expression_lists_variables() {
    let router = create_router_for_test();
    let (status, body) = post(
        &router,
        "/formulas/validate",
        json!({"organization_id": "org_acme", "expression": "round(dailyRate * leaveDays, 2)"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["variables"], json!(["dailyRate", "leaveDays"]));

    let (status, error) = post(
        &router,
        "/formulas/validate",
        json!({"organization_id": "org_acme", "expression": "basicSalary * (2"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "SYNTAX_ERROR");
}

// =============================================================================
// Record lifecycle
// =============================================================================

#[tokio::test]
async fn test_duplicate_record_is_conflict() {
    let router = create_router_for_test();
    let body = json!({"employee_id": "emp_001", "period": march()});
    let (status, _) = post(&router, "/payroll/records", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, error) = post(&router, "/payroll/records", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "DUPLICATE_CALCULATION");
}

#[tokio::test]
async fn test_record_lifecycle_to_release() {
    let router = create_router_for_test();
    let record = released_record(&router).await;

    assert_eq!(record["status"], "released");
    assert_eq!(record["approved_by"], "mgr_01");
    assert_eq!(record["version"], 1);

    let (status, fetched) = send(
        &router,
        "GET",
        &format!("/payroll/records/{}", record["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["status"], "released");
}

#[tokio::test]
async fn test_approve_without_submission_is_conflict() {
    let router = create_router_for_test();
    let (_, record) = post(
        &router,
        "/payroll/records",
        json!({"employee_id": "emp_002", "period": march()}),
    )
    .await;
    let (status, error) = post(
        &router,
        &format!("/payroll/records/{}/approve", record["id"].as_str().unwrap()),
        json!({"approver": "mgr_01"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_reject_returns_record_to_calculated() {
    let router = create_router_for_test();
    let (_, record) = post(
        &router,
        "/payroll/records",
        json!({"employee_id": "emp_002", "period": march()}),
    )
    .await;
    let id = record["id"].as_str().unwrap();
    post(&router, &format!("/payroll/records/{}/submit", id), json!({})).await;

    let (status, rejected) = post(
        &router,
        &format!("/payroll/records/{}/reject", id),
        json!({"approver": "mgr_01", "reason": "overtime not signed off"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "calculated");
    assert_eq!(rejected["rejection_reason"], "overtime not signed off");
    assert_eq!(rejected["calculation_result"], record["calculation_result"]);
}

// =============================================================================
// Error corrections
// =============================================================================

#[tokio::test]
async fn test_correction_supersedes_released_record() {
    let router = create_router_for_test();
    let record = released_record(&router).await;
    let record_id = record["id"].as_str().unwrap();

    let (status, correction) = post(
        &router,
        "/corrections",
        json!({
            "payroll_record_id": record_id,
            "requested_by": "hr_01",
            "reason": "absence entered twice",
            "proposed_changes": {"variable_overrides": {"absentDays": 0}}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(correction["status"], "requested");
    let correction_id = correction["id"].as_str().unwrap();

    let (status, _) = post(
        &router,
        &format!("/corrections/{}/approve", correction_id),
        json!({"approver": "mgr_02"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, processed) =
        post(&router, &format!("/corrections/{}/process", correction_id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(processed["correction"]["status"], "processed");

    let next = &processed["record"];
    assert_eq!(next["version"], 2);
    assert_eq!(next["status"], "released");
    assert_eq!(next["supersedes"], record_id);
    assert_eq!(next["calculation_result"]["net_salary"], "51750.00");
    assert_eq!(line_item(&next["calculation_result"], "attendanceBonus"), "500.00");

    let (_, prior) = send(&router, "GET", &format!("/payroll/records/{}", record_id), None).await;
    assert_eq!(prior["status"], "superseded");
    assert_eq!(prior["superseded_by"], next["id"]);

    let (_, listed) = send(
        &router,
        "GET",
        &format!("/payroll/records/{}/corrections", record_id),
        None,
    )
    .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_correction_requires_released_record() {
    let router = create_router_for_test();
    let (_, record) = post(
        &router,
        "/payroll/records",
        json!({"employee_id": "emp_001", "period": march()}),
    )
    .await;
    let (status, error) = post(
        &router,
        "/corrections",
        json!({
            "payroll_record_id": record["id"],
            "requested_by": "hr_01",
            "reason": "absence entered twice",
            "proposed_changes": {"variable_overrides": {"absentDays": 0}}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_cancelled_correction_cannot_be_processed() {
    let router = create_router_for_test();
    let record = released_record(&router).await;
    let (_, correction) = post(
        &router,
        "/corrections",
        json!({
            "payroll_record_id": record["id"],
            "requested_by": "hr_01",
            "reason": "wrong overtime",
            "proposed_changes": {"variable_overrides": {"overtimeHours": "12"}}
        }),
    )
    .await;
    let id = correction["id"].as_str().unwrap();

    let (status, cancelled) = post(&router, &format!("/corrections/{}/cancel", id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = post(&router, &format!("/corrections/{}/process", id), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// =============================================================================
// Branch processing
// =============================================================================

#[tokio::test]
async fn test_branch_processing_reports_each_employee() {
    let router = create_router_for_test();
    let (status, report) = post(
        &router,
        "/payroll/branches/br_north/process",
        json!({"period": march(), "commit": true}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["succeeded"], 2);
    assert_eq!(report["failed"], 1);

    let outcomes = report["outcomes"].as_array().unwrap();
    assert_eq!(outcomes[0]["employee_id"], "emp_001");
    assert_eq!(outcomes[0]["record"]["status"], "calculated");
    assert_eq!(outcomes[1]["record"]["calculation_result"]["net_salary"], "40320.00");
    assert_eq!(outcomes[2]["employee_id"], "emp_003");
    assert_eq!(outcomes[2]["error"]["code"], "INCOMPLETE_CONTEXT");

    // Committed records block a second run.
    let (_, rerun) = post(
        &router,
        "/payroll/branches/br_north/process",
        json!({"period": march(), "commit": true}),
    )
    .await;
    assert_eq!(rerun["succeeded"], 0);
    assert_eq!(rerun["outcomes"][0]["error"]["code"], "DUPLICATE_CALCULATION");
}

#[tokio::test]
async fn test_branch_dry_run_returns_results() {
    let router = create_router_for_test();
    let (status, report) = post(
        &router,
        "/payroll/branches/br_south/process",
        json!({"period": march()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["committed"], false);
    assert_eq!(report["outcomes"][0]["employee_id"], "emp_004");
    assert_eq!(report["outcomes"][0]["result"]["currency"], "EUR");
}
