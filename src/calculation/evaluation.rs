//! Formula set evaluation.
//!
//! This module runs a [`FormulaSet`] against one [`EvaluationContext`] and
//! assembles the itemized [`PayrollCalculationResult`]. It is a pure
//! function of its inputs.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::config::EngineSettings;
use crate::context::{EvaluationContext, names};
use crate::error::{EngineError, EngineResult, EvaluationError};
use crate::formula::{CompiledFormula, FormulaSet, Value, evaluate, round_half_up};
use crate::models::{AuditStep, AuditTrace, FieldKind, LineItem, PayrollCalculationResult};

const GROSS_SALARY: &str = "grossSalary";
const TOTAL_DEDUCTIONS: &str = "totalDeductions";
const NET_SALARY: &str = "netSalary";

/// Evaluates every formula in dependency order and totals the outputs.
///
/// Each output is rounded half up to `settings.scale` before it is written
/// back for later formulas. Gross salary, total deductions and net salary are
/// rounded to the currency's minor-unit precision.
///
/// # Errors
///
/// - [`EngineError::UnknownVariable`] if a formula reads a name neither the
///   context nor another formula provides
/// - [`EngineError::FormulaCycle`] if formulas depend on each other in a loop
/// - [`EngineError::Evaluation`] if a formula fails at runtime, or a total
///   overflows (the field is then `grossSalary`, `totalDeductions` or
///   `netSalary`)
/// - [`EngineError::NegativeNetSalary`] if deductions exceed gross salary
pub fn run_formulas(
    set: &FormulaSet,
    context: &EvaluationContext,
    settings: &EngineSettings,
) -> EngineResult<PayrollCalculationResult> {
    set.check_inputs(|name| context.contains(name))?;
    let order = set.evaluation_order()?;

    let mut scope: BTreeMap<String, Value> = context.values().clone();
    let mut line_items = Vec::with_capacity(order.len());
    let mut steps = Vec::with_capacity(order.len());

    for (index, compiled) in order.into_iter().enumerate() {
        let field = compiled.target_field();
        let raw = evaluate(&compiled.ast, &scope)
            .map_err(|source| EngineError::evaluation(field, source))?;
        let output = round_output(raw, settings.scale)
            .map_err(|source| EngineError::evaluation(field, source))?;
        let value = output
            .as_decimal()
            .map(|d| round_half_up(d, settings.scale))
            .map_err(|source| EngineError::evaluation(field, source))?;

        steps.push(audit_step(index, compiled, &scope, output));
        line_items.push(LineItem {
            field: field.to_string(),
            formula_id: compiled.formula.id,
            kind: compiled.formula.kind,
            value,
        });
        scope.insert(field.to_string(), output);
    }

    let basic_salary = context
        .get(names::BASIC_SALARY)
        .and_then(|value| value.as_decimal().ok())
        .ok_or_else(|| EngineError::IncompleteContext {
            employee_id: context.employee_id().to_string(),
            variable: names::BASIC_SALARY.to_string(),
        })?;

    let precision = settings.precision_for(context.currency());
    let sum_of = |kind: FieldKind, field: &str| -> EngineResult<Decimal> {
        line_items
            .iter()
            .filter(|item| item.kind == kind)
            .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.value))
            .ok_or_else(|| EngineError::evaluation(field, EvaluationError::Overflow))
    };
    let gross_salary = basic_salary
        .checked_add(sum_of(FieldKind::Allowance, GROSS_SALARY)?)
        .map(|gross| round_half_up(gross, precision))
        .ok_or_else(|| EngineError::evaluation(GROSS_SALARY, EvaluationError::Overflow))?;
    let total_deductions = round_half_up(sum_of(FieldKind::Deduction, TOTAL_DEDUCTIONS)?, precision);
    let net_salary = gross_salary
        .checked_sub(total_deductions)
        .map(|net| round_half_up(net, precision))
        .ok_or_else(|| EngineError::evaluation(NET_SALARY, EvaluationError::Overflow))?;

    if net_salary.is_sign_negative() && !net_salary.is_zero() {
        return Err(EngineError::NegativeNetSalary {
            employee_id: context.employee_id().to_string(),
            net_salary,
        });
    }

    Ok(PayrollCalculationResult {
        employee_id: context.employee_id().to_string(),
        period: context.period(),
        line_items,
        gross_salary,
        total_deductions,
        net_salary,
        currency: context.currency().to_string(),
        audit_trace: AuditTrace { steps },
    })
}

/// Rounds a formula output, rejecting non-numeric results.
fn round_output(value: Value, scale: u32) -> Result<Value, EvaluationError> {
    match value {
        Value::Integer(_) => Ok(value),
        Value::Decimal(d) => Ok(Value::Decimal(round_half_up(d, scale))),
        Value::Boolean(_) => value.as_decimal().map(Value::Decimal),
    }
}

fn audit_step(
    index: usize,
    compiled: &CompiledFormula,
    scope: &BTreeMap<String, Value>,
    output: Value,
) -> AuditStep {
    let inputs: serde_json::Map<String, serde_json::Value> = compiled
        .formula
        .declared_variables
        .iter()
        .filter_map(|name| {
            let value = scope.get(name)?;
            Some((name.clone(), serde_json::Value::String(value.to_string())))
        })
        .collect();

    AuditStep {
        step_number: u32::try_from(index + 1).unwrap_or(u32::MAX),
        rule_id: compiled.formula.id.to_string(),
        rule_name: compiled.formula.target_field.clone(),
        expression: compiled.formula.expression.clone(),
        input: serde_json::Value::Object(inputs),
        output: serde_json::json!({ "value": output.to_string() }),
        reasoning: format!(
            "{} = {} = {} (formula '{}' v{})",
            compiled.formula.target_field,
            compiled.formula.expression,
            output,
            compiled.formula.name,
            compiled.formula.version
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse;
    use crate::models::{PayPeriod, PayrollFormula};
    use proptest::prelude::*;
    use std::str::FromStr;
    use std::sync::Arc;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn compiled(field: &str, kind: FieldKind, expression: &str) -> CompiledFormula {
        let ast = parse(expression).unwrap();
        CompiledFormula {
            formula: PayrollFormula {
                id: Uuid::new_v4(),
                organization_id: "org_acme".to_string(),
                name: field.to_string(),
                target_field: field.to_string(),
                kind,
                expression: expression.to_string(),
                declared_variables: ast.variables(),
                is_active: true,
                version: 1,
            },
            ast: Arc::new(ast),
        }
    }

    fn context(basic: &str, overtime: &str, absent: i64) -> EvaluationContext {
        let values = BTreeMap::from([
            ("basicSalary".to_string(), Value::Decimal(dec(basic))),
            ("overtimeHours".to_string(), Value::Decimal(dec(overtime))),
            ("absentDays".to_string(), Value::Integer(absent)),
            ("workingDays".to_string(), Value::Integer(22)),
        ]);
        EvaluationContext::new("emp_001", PayPeriod::new(3, 2026).unwrap(), "USD", values)
    }

    fn standard_set() -> FormulaSet {
        FormulaSet::new(
            "org_acme",
            vec![
                compiled(
                    "overtimePay",
                    FieldKind::Allowance,
                    "overtimeHours * (basicSalary / 200) * 1.5",
                ),
                compiled("absenceDeduction", FieldKind::Deduction, "absentDays * dailyRate"),
                compiled("dailyRate", FieldKind::Informational, "basicSalary / workingDays"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_overtime_scenario() {
        let result = run_formulas(
            &standard_set(),
            &context("50000", "10", 0),
            &EngineSettings::default(),
        )
        .unwrap();

        assert_eq!(result.line_item("overtimePay").unwrap().value, dec("3750"));
        assert_eq!(result.gross_salary, dec("53750"));
        assert_eq!(result.total_deductions, dec("0"));
        assert_eq!(result.net_salary, dec("53750"));
        assert_eq!(result.currency, "USD");
    }

    #[test]
    fn test_outputs_rounded_before_reuse() {
        let result = run_formulas(
            &standard_set(),
            &context("50000", "0", 2),
            &EngineSettings::default(),
        )
        .unwrap();

        // 50000 / 22 = 2272.7272... rounds to 2272.73 before doubling.
        assert_eq!(result.line_item("dailyRate").unwrap().value, dec("2272.73"));
        assert_eq!(result.line_item("absenceDeduction").unwrap().value, dec("4545.46"));
        assert_eq!(result.net_salary, dec("45454.54"));
    }

    #[test]
    fn test_line_items_in_dependency_order() {
        let result = run_formulas(
            &standard_set(),
            &context("50000", "10", 1),
            &EngineSettings::default(),
        )
        .unwrap();
        let fields: Vec<_> = result.line_items.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["dailyRate", "absenceDeduction", "overtimePay"]);
        assert_eq!(result.audit_trace.steps.len(), 3);
        assert_eq!(result.audit_trace.steps[1].step_number, 2);
        assert_eq!(result.audit_trace.steps[1].rule_name, "absenceDeduction");
        assert_eq!(
            result.audit_trace.steps[1].input["dailyRate"],
            serde_json::json!("2272.73")
        );
    }

    #[test]
    fn test_negative_net_is_error() {
        let set = FormulaSet::new(
            "org_acme",
            vec![compiled("fine", FieldKind::Deduction, "basicSalary * 2")],
        )
        .unwrap();
        let err = run_formulas(&set, &context("1000", "0", 0), &EngineSettings::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::NegativeNetSalary { net_salary, .. } if net_salary == dec("-1000")
        ));
    }

    #[test]
    fn test_zero_net_is_allowed() {
        let set = FormulaSet::new(
            "org_acme",
            vec![compiled("fullDeduction", FieldKind::Deduction, "basicSalary")],
        )
        .unwrap();
        let result = run_formulas(&set, &context("1000", "0", 0), &EngineSettings::default())
            .unwrap();
        assert!(result.net_salary.is_zero());
    }

    #[test]
    fn test_division_by_zero_names_field() {
        let set = FormulaSet::new(
            "org_acme",
            vec![compiled("perAbsence", FieldKind::Informational, "basicSalary / absentDays")],
        )
        .unwrap();
        let err = run_formulas(&set, &context("1000", "0", 0), &EngineSettings::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Evaluation { ref field, source: EvaluationError::DivisionByZero }
                if field == "perAbsence"
        ));
    }

    #[test]
    fn test_boolean_output_rejected() {
        let set = FormulaSet::new(
            "org_acme",
            vec![compiled("isAbsent", FieldKind::Informational, "absentDays > 0")],
        )
        .unwrap();
        let err = run_formulas(&set, &context("1000", "0", 1), &EngineSettings::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Evaluation { .. }));
    }

    #[test]
    fn test_unresolvable_input_rejected() {
        let set = FormulaSet::new(
            "org_acme",
            vec![compiled("bonus", FieldKind::Allowance, "bonusX * 2")],
        )
        .unwrap();
        let err = run_formulas(&set, &context("1000", "0", 0), &EngineSettings::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownVariable { ref name } if name == "bonusX"));
    }

    #[test]
    fn test_currency_precision_applies_to_totals() {
        let set = FormulaSet::new(
            "org_acme",
            vec![compiled("allowance", FieldKind::Allowance, "basicSalary / 3")],
        )
        .unwrap();
        let mut settings = EngineSettings::default();
        settings.currency_precisions.insert("JPY".to_string(), 0);
        let values = BTreeMap::from([("basicSalary".to_string(), Value::Integer(1000))]);
        let context =
            EvaluationContext::new("emp_jp", PayPeriod::new(3, 2026).unwrap(), "JPY", values);

        let result = run_formulas(&set, &context, &settings).unwrap();
        assert_eq!(result.line_item("allowance").unwrap().value, dec("333.33"));
        assert_eq!(result.gross_salary, dec("1333"));
        assert_eq!(result.net_salary, dec("1333"));
    }

    #[test]
    fn test_total_overflow_is_error() {
        let set = FormulaSet::new(
            "org_acme",
            vec![
                compiled("bonusA", FieldKind::Allowance, "basicSalary * 1000000000000000000000000"),
                compiled("bonusB", FieldKind::Allowance, "basicSalary * 1000000000000000000000000"),
            ],
        )
        .unwrap();
        let err = run_formulas(&set, &context("50000", "0", 0), &EngineSettings::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Evaluation { ref field, source: EvaluationError::Overflow }
                if field == "grossSalary"
        ));
    }

    #[test]
    fn test_deduction_total_overflow_is_error() {
        let set = FormulaSet::new(
            "org_acme",
            vec![
                compiled("levyA", FieldKind::Deduction, "basicSalary * 1000000000000000000000000"),
                compiled("levyB", FieldKind::Deduction, "basicSalary * 1000000000000000000000000"),
            ],
        )
        .unwrap();
        let err = run_formulas(&set, &context("50000", "0", 0), &EngineSettings::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Evaluation { ref field, source: EvaluationError::Overflow }
                if field == "totalDeductions"
        ));
    }

    proptest! {
        #[test]
        fn prop_identical_inputs_identical_results(
            basic in 1_000i64..200_000,
            overtime in 0i64..80,
            absent in 0i64..22,
        ) {
            let context = context(&basic.to_string(), &overtime.to_string(), absent);
            let set = standard_set();
            let first = run_formulas(&set, &context, &EngineSettings::default());
            let second = run_formulas(&set, &context, &EngineSettings::default());
            match (first, second) {
                (Ok(a), Ok(b)) => {
                    prop_assert_eq!(a.line_items, b.line_items);
                    prop_assert_eq!(a.net_salary, b.net_salary);
                }
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "results diverged"),
            }
        }

        #[test]
        fn prop_net_is_never_negative(
            basic in 0i64..100_000,
            rate in 0i64..300,
        ) {
            let set = FormulaSet::new(
                "org_acme",
                vec![compiled("deduction", FieldKind::Deduction, &format!("basicSalary * {} / 100", rate))],
            )
            .unwrap();
            let context = context(&basic.to_string(), "0", 0);
            match run_formulas(&set, &context, &EngineSettings::default()) {
                Ok(result) => prop_assert!(!result.net_salary.is_sign_negative() || result.net_salary.is_zero()),
                Err(err) => {
                    let is_negative_net = matches!(err, EngineError::NegativeNetSalary { .. });
                    prop_assert!(is_negative_net, "unexpected error {:?}", err);
                }
            }
        }

        #[test]
        fn prop_totals_have_currency_precision(
            basic in 1i64..100_000,
            divisor in 1i64..97,
        ) {
            let set = FormulaSet::new(
                "org_acme",
                vec![compiled("allowance", FieldKind::Allowance, &format!("basicSalary / {}", divisor))],
            )
            .unwrap();
            let result = run_formulas(&set, &context(&basic.to_string(), "0", 0), &EngineSettings::default()).unwrap();
            prop_assert!(result.gross_salary.scale() <= 2);
            prop_assert!(result.net_salary.scale() <= 2);
            prop_assert_eq!(round_half_up(result.net_salary, 2), result.net_salary);
        }
    }
}
