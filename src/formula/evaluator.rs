//! Tree-walking evaluator.
//!
//! Evaluation is a pure function of the AST and the variable bindings. It
//! never rounds intermediates; callers round the final output.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::ast::{BinaryOp, Expr, Function, UnaryOp};
use super::value::{Value, round_half_up};
use crate::error::EvaluationError;

/// Largest `places` argument accepted by `round`.
const MAX_ROUND_PLACES: i64 = 28;

/// Read access to variable bindings during evaluation.
pub trait Variables {
    /// Returns the value bound to `name`.
    fn get_value(&self, name: &str) -> Option<Value>;
}

impl<S: BuildHasher> Variables for HashMap<String, Value, S> {
    fn get_value(&self, name: &str) -> Option<Value> {
        self.get(name).copied()
    }
}

impl Variables for BTreeMap<String, Value> {
    fn get_value(&self, name: &str) -> Option<Value> {
        self.get(name).copied()
    }
}

/// Evaluates an expression against a set of bindings.
///
/// # Example
///
/// ```
/// use payroll_engine::formula::{evaluate, parse, Value};
/// use rust_decimal::Decimal;
/// use std::collections::BTreeMap;
///
/// let ast = parse("overtimeHours * (basicSalary / 200) * 1.5").unwrap();
/// let mut vars = BTreeMap::new();
/// vars.insert("overtimeHours".to_string(), Value::Integer(10));
/// vars.insert("basicSalary".to_string(), Value::Decimal(Decimal::from(50_000)));
///
/// let result = evaluate(&ast, &vars).unwrap();
/// assert_eq!(result.as_decimal().unwrap(), Decimal::from(3750));
/// ```
pub fn evaluate(expr: &Expr, vars: &dyn Variables) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Number(n) => Ok(literal(*n)),
        Expr::Boolean(b) => Ok(Value::Boolean(*b)),
        Expr::Variable(name) => vars
            .get_value(name)
            .ok_or_else(|| EvaluationError::UnboundVariable { name: name.clone() }),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, vars)?;
            match op {
                UnaryOp::Negate => match value {
                    Value::Integer(i) => i
                        .checked_neg()
                        .map(Value::Integer)
                        .ok_or(EvaluationError::Overflow),
                    _ => Ok(Value::Decimal(-value.as_decimal()?)),
                },
                UnaryOp::Not => Ok(Value::Boolean(!value.as_bool()?)),
            }
        }
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                if !evaluate(left, vars)?.as_bool()? {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(evaluate(right, vars)?.as_bool()?))
            }
            BinaryOp::Or => {
                if evaluate(left, vars)?.as_bool()? {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(evaluate(right, vars)?.as_bool()?))
            }
            _ => {
                let lhs = evaluate(left, vars)?;
                let rhs = evaluate(right, vars)?;
                apply_binary(*op, lhs, rhs)
            }
        },
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, vars)?.as_bool()? {
                evaluate(then_branch, vars)
            } else {
                evaluate(else_branch, vars)
            }
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, vars))
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, &values)
        }
    }
}

/// Whole literals written without a decimal point are integers.
fn literal(n: Decimal) -> Value {
    if n.scale() == 0 {
        if let Some(i) = n.to_i64() {
            return Value::Integer(i);
        }
    }
    Value::Decimal(n)
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply => {
            if let (Value::Integer(a), Value::Integer(b)) = (lhs, rhs) {
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Subtract => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                return result.map(Value::Integer).ok_or(EvaluationError::Overflow);
            }
            let (a, b) = (lhs.as_decimal()?, rhs.as_decimal()?);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            result.map(Value::Decimal).ok_or(EvaluationError::Overflow)
        }
        BinaryOp::Divide => {
            let (a, b) = (lhs.as_decimal()?, rhs.as_decimal()?);
            if b.is_zero() {
                return Err(EvaluationError::DivisionByZero);
            }
            a.checked_div(b)
                .map(Value::Decimal)
                .ok_or(EvaluationError::Overflow)
        }
        BinaryOp::Greater | BinaryOp::GreaterEqual | BinaryOp::Less | BinaryOp::LessEqual => {
            let (a, b) = (lhs.as_decimal()?, rhs.as_decimal()?);
            let result = match op {
                BinaryOp::Greater => a > b,
                BinaryOp::GreaterEqual => a >= b,
                BinaryOp::Less => a < b,
                _ => a <= b,
            };
            Ok(Value::Boolean(result))
        }
        BinaryOp::Equal | BinaryOp::NotEqual => {
            let equal = match (lhs, rhs) {
                (Value::Boolean(a), Value::Boolean(b)) => a == b,
                (Value::Boolean(_), other) | (other, Value::Boolean(_)) => {
                    return Err(EvaluationError::TypeMismatch {
                        expected: "boolean",
                        found: other.type_name(),
                    });
                }
                (a, b) => a.as_decimal()? == b.as_decimal()?,
            };
            Ok(Value::Boolean(if op == BinaryOp::Equal { equal } else { !equal }))
        }
        BinaryOp::And | BinaryOp::Or => {
            Ok(Value::Boolean(match op {
                BinaryOp::And => lhs.as_bool()? && rhs.as_bool()?,
                _ => lhs.as_bool()? || rhs.as_bool()?,
            }))
        }
    }
}

fn call(function: Function, args: &[Value]) -> Result<Value, EvaluationError> {
    // Arity is enforced by the parser; a hand-built AST may still omit arguments.
    let (&first, rest) = args.split_first().ok_or(EvaluationError::TypeMismatch {
        expected: "argument",
        found: "nothing",
    })?;
    match function {
        Function::Min | Function::Max => {
            let mut best = first;
            let mut best_value = best.as_decimal()?;
            for candidate in rest {
                let value = candidate.as_decimal()?;
                let better = match function {
                    Function::Min => value < best_value,
                    _ => value > best_value,
                };
                if better {
                    best = *candidate;
                    best_value = value;
                }
            }
            Ok(best)
        }
        Function::Round => {
            let places = match args.get(1) {
                None => 0,
                Some(Value::Integer(p)) => *p,
                Some(Value::Decimal(d)) if d.fract().is_zero() => {
                    d.to_i64().ok_or(EvaluationError::Overflow)?
                }
                Some(other) => {
                    return Err(EvaluationError::TypeMismatch {
                        expected: "whole number of places",
                        found: other.type_name(),
                    });
                }
            };
            if !(0..=MAX_ROUND_PLACES).contains(&places) {
                return Err(EvaluationError::Overflow);
            }
            match first {
                Value::Integer(i) => Ok(Value::Integer(i)),
                other => Ok(Value::Decimal(round_half_up(
                    other.as_decimal()?,
                    places as u32,
                ))),
            }
        }
        Function::Abs => match first {
            Value::Integer(i) => i
                .checked_abs()
                .map(Value::Integer)
                .ok_or(EvaluationError::Overflow),
            other => Ok(Value::Decimal(other.as_decimal()?.abs())),
        },
    }
}

/// Evaluates an expression and converts the result to a decimal.
pub fn evaluate_decimal(expr: &Expr, vars: &dyn Variables) -> Result<Decimal, EvaluationError> {
    evaluate(expr, vars)?.as_decimal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn vars(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    fn eval(source: &str, bindings: &BTreeMap<String, Value>) -> Result<Value, EvaluationError> {
        evaluate(&parse(source).unwrap(), bindings)
    }

    fn eval_dec(source: &str, bindings: &BTreeMap<String, Value>) -> Decimal {
        eval(source, bindings).unwrap().as_decimal().unwrap()
    }

    #[test]
    fn test_overtime_scenario() {
        let bindings = vars(&[
            ("basicSalary", Value::Decimal(dec("50000"))),
            ("overtimeHours", Value::Integer(10)),
        ]);
        assert_eq!(
            eval_dec("overtimeHours * (basicSalary / 200) * 1.5", &bindings),
            dec("3750")
        );
    }

    #[test]
    fn test_no_intermediate_rounding() {
        let bindings = BTreeMap::new();
        // 0.999... only reaches 1.00 because intermediates keep full precision
        let result = eval_dec("1 / 3 * 3", &bindings);
        assert_eq!(round_half_up(result, 2), dec("1.00"));
    }

    #[test]
    fn test_division_by_zero() {
        let bindings = vars(&[("workingDays", Value::Integer(0))]);
        assert_eq!(
            eval("100 / workingDays", &bindings),
            Err(EvaluationError::DivisionByZero)
        );
    }

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        let bindings = vars(&[("a", Value::Integer(7)), ("b", Value::Integer(2))]);
        assert_eq!(eval("a * b - 1", &bindings), Ok(Value::Integer(13)));
        assert_eq!(eval("a / b", &bindings), Ok(Value::Decimal(dec("3.5"))));
    }

    #[test]
    fn test_integer_overflow() {
        let bindings = vars(&[("big", Value::Integer(i64::MAX))]);
        assert_eq!(eval("big + 1", &bindings), Err(EvaluationError::Overflow));
    }

    #[test]
    fn test_literal_types() {
        let bindings = BTreeMap::new();
        assert_eq!(eval("500", &bindings), Ok(Value::Integer(500)));
        assert_eq!(eval("500.0", &bindings), Ok(Value::Decimal(dec("500.0"))));
        assert_eq!(eval("2 * 3", &bindings), Ok(Value::Integer(6)));
        // Too large for an integer, still a valid decimal.
        assert_eq!(
            eval("10000000000000000000", &bindings),
            Ok(Value::Decimal(dec("10000000000000000000")))
        );
    }

    #[test]
    fn test_comparison_and_logic() {
        let bindings = vars(&[
            ("absentDays", Value::Integer(2)),
            ("onProbation", Value::Boolean(false)),
        ]);
        assert_eq!(
            eval("absentDays > 1 && !onProbation", &bindings),
            Ok(Value::Boolean(true))
        );
        assert_eq!(eval("absentDays == 2.0", &bindings), Ok(Value::Boolean(true)));
        assert_eq!(eval("onProbation != true", &bindings), Ok(Value::Boolean(true)));
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let bindings = vars(&[("zero", Value::Integer(0))]);
        assert_eq!(
            eval("false && 1 / zero > 0", &bindings),
            Ok(Value::Boolean(false))
        );
        assert_eq!(
            eval("true || 1 / zero > 0", &bindings),
            Ok(Value::Boolean(true))
        );
    }

    #[test]
    fn test_conditional_only_evaluates_taken_branch() {
        let bindings = vars(&[("workingDays", Value::Integer(0))]);
        assert_eq!(
            eval_dec("workingDays > 0 ? 100 / workingDays : 0", &bindings),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_conditional_requires_boolean() {
        let bindings = vars(&[("a", Value::Integer(1))]);
        assert!(matches!(
            eval("a ? 1 : 2", &bindings),
            Err(EvaluationError::TypeMismatch { expected: "boolean", .. })
        ));
    }

    #[test]
    fn test_arithmetic_on_boolean_is_type_mismatch() {
        let bindings = vars(&[("flag", Value::Boolean(true))]);
        assert_eq!(
            eval("flag + 1", &bindings),
            Err(EvaluationError::TypeMismatch {
                expected: "number",
                found: "boolean"
            })
        );
        assert!(eval("flag == 1", &bindings).is_err());
    }

    #[test]
    fn test_unbound_variable() {
        let bindings = BTreeMap::new();
        assert_eq!(
            eval("bonusX * 2", &bindings),
            Err(EvaluationError::UnboundVariable {
                name: "bonusX".to_string()
            })
        );
    }

    #[test]
    fn test_min_max_abs() {
        let bindings = vars(&[("a", Value::Decimal(dec("-3.5"))), ("b", Value::Integer(2))]);
        assert_eq!(eval("min(a, b, 0)", &bindings), Ok(Value::Decimal(dec("-3.5"))));
        assert_eq!(eval("max(a, b)", &bindings), Ok(Value::Integer(2)));
        assert_eq!(eval_dec("abs(a)", &bindings), dec("3.5"));
        assert_eq!(eval("abs(-b)", &bindings), Ok(Value::Integer(2)));
    }

    #[test]
    fn test_round_half_up_function() {
        let bindings = BTreeMap::new();
        assert_eq!(eval_dec("round(2.345, 2)", &bindings), dec("2.35"));
        assert_eq!(eval_dec("round(2.5)", &bindings), dec("3"));
        assert_eq!(eval_dec("round(-2.5)", &bindings), dec("-3"));
    }

    #[test]
    fn test_round_rejects_invalid_places() {
        let bindings = BTreeMap::new();
        assert!(eval("round(1.25, 1.5)", &bindings).is_err());
        assert!(eval("round(1.25, -1)", &bindings).is_err());
        assert!(eval("round(1.25, true)", &bindings).is_err());
    }

    #[test]
    fn test_repeated_evaluation_is_deterministic() {
        let ast = parse("basicSalary / 30 * (30 - absentDays)").unwrap();
        let bindings = vars(&[
            ("basicSalary", Value::Decimal(dec("50000"))),
            ("absentDays", Value::Integer(2)),
        ]);
        let first = evaluate(&ast, &bindings).unwrap();
        for _ in 0..10 {
            assert_eq!(evaluate(&ast, &bindings).unwrap(), first);
        }
    }

    #[test]
    fn test_hashmap_bindings() {
        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), Value::Integer(4));
        assert_eq!(
            evaluate_decimal(&parse("x * 2").unwrap(), &bindings).unwrap(),
            dec("8")
        );
    }
}
