//! The closed value type formulas compute over.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;

/// A formula variable or intermediate value.
///
/// # Example
///
/// ```
/// use payroll_engine::formula::Value;
/// use rust_decimal::Decimal;
///
/// let hours = Value::Integer(10);
/// assert_eq!(hours.as_decimal().unwrap(), Decimal::from(10));
/// assert!(Value::Boolean(true).as_decimal().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// True or false.
    Boolean(bool),
    /// A whole number.
    Integer(i64),
    /// A fixed-point decimal.
    Decimal(Decimal),
}

impl Value {
    /// Returns the type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
        }
    }

    /// Returns the numeric value as a decimal.
    pub fn as_decimal(&self) -> Result<Decimal, EvaluationError> {
        match self {
            Value::Integer(i) => Ok(Decimal::from(*i)),
            Value::Decimal(d) => Ok(*d),
            Value::Boolean(_) => Err(self.mismatch("number")),
        }
    }

    /// Returns the boolean value.
    pub fn as_bool(&self) -> Result<bool, EvaluationError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch("boolean")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> EvaluationError {
        EvaluationError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
        }
    }
}

/// Rounds half away from zero to `scale` decimal places.
///
/// ```
/// use payroll_engine::formula::round_half_up;
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// assert_eq!(round_half_up(Decimal::from_str("2.345").unwrap(), 2), Decimal::from_str("2.35").unwrap());
/// assert_eq!(round_half_up(Decimal::from_str("-2.345").unwrap(), 2), Decimal::from_str("-2.35").unwrap());
/// ```
pub fn round_half_up(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded
}
