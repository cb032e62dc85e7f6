//! The formula expression engine.
//!
//! Formula text is tokenized, parsed into an [`Expr`] and evaluated against
//! variable bindings with exact decimal arithmetic. The [`FormulaRegistry`]
//! stores versioned formulas per organization and hands out validated
//! [`FormulaSet`] snapshots for calculation.
//!
//! # Example
//!
//! ```
//! use payroll_engine::formula::{evaluate_decimal, parse, round_half_up, Value};
//! use rust_decimal::Decimal;
//! use std::collections::HashMap;
//!
//! let ast = parse("absentDays > 0 ? basicSalary / 30 * absentDays : 0").unwrap();
//! let vars: HashMap<String, Value> = [
//!     ("absentDays".to_string(), Value::Integer(2)),
//!     ("basicSalary".to_string(), Value::Integer(50_000)),
//! ]
//! .into();
//!
//! let deduction = evaluate_decimal(&ast, &vars).unwrap();
//! assert_eq!(round_half_up(deduction, 2).to_string(), "3333.33");
//! ```

mod ast;
mod cache;
mod evaluator;
mod lexer;
mod parser;
mod registry;
mod set;
mod value;

pub use ast::{BinaryOp, Expr, Function, UnaryOp};
pub use cache::FormulaCache;
pub use evaluator::{Variables, evaluate, evaluate_decimal};
pub use lexer::MAX_EXPRESSION_LENGTH;
pub use parser::{MAX_NESTING_DEPTH, parse};
pub use registry::{FormulaRegistry, NewFormula, extract_variables, validate};
pub use set::{CompiledFormula, FormulaSet};
pub use value::{Value, round_half_up};
