//! Formula sets and dependency ordering.
//!
//! A [`FormulaSet`] is the explicit snapshot of active formulas handed to the
//! calculator. Formulas may consume each other's target fields; the set
//! orders them so every producer runs before its consumers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::ast::Expr;
use super::parser::parse;
use crate::error::{EngineError, EngineResult};
use crate::models::PayrollFormula;

/// A formula paired with its parsed AST.
#[derive(Debug, Clone)]
pub struct CompiledFormula {
    /// The formula definition.
    pub formula: PayrollFormula,
    /// The parsed expression.
    pub ast: Arc<Expr>,
}

impl CompiledFormula {
    /// The output field this formula computes.
    pub fn target_field(&self) -> &str {
        &self.formula.target_field
    }
}

/// An immutable set of formulas with unique target fields.
#[derive(Debug, Clone)]
pub struct FormulaSet {
    organization_id: String,
    formulas: BTreeMap<String, CompiledFormula>,
}

impl FormulaSet {
    /// Builds a set, rejecting two formulas that target the same field.
    pub fn new(
        organization_id: impl Into<String>,
        formulas: impl IntoIterator<Item = CompiledFormula>,
    ) -> EngineResult<Self> {
        let mut by_field = BTreeMap::new();
        for compiled in formulas {
            let field = compiled.formula.target_field.clone();
            if by_field.insert(field.clone(), compiled).is_some() {
                return Err(EngineError::Validation {
                    field: "target_field".to_string(),
                    message: format!("more than one active formula computes '{}'", field),
                });
            }
        }
        Ok(Self {
            organization_id: organization_id.into(),
            formulas: by_field,
        })
    }

    /// The organization the set belongs to.
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    /// Iterates the formulas sorted by target field.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledFormula> {
        self.formulas.values()
    }

    /// Returns the formula computing `field`.
    pub fn get(&self, field: &str) -> Option<&CompiledFormula> {
        self.formulas.get(field)
    }

    /// Returns the number of formulas.
    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    /// Returns true if the set has no formulas.
    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Returns true if some formula in the set computes `field`.
    pub fn produces(&self, field: &str) -> bool {
        self.formulas.contains_key(field)
    }

    /// Returns a copy of the set with one formula's expression replaced.
    ///
    /// The replacement's declared variables are taken from the expression.
    /// Only fields the set already computes can be overridden.
    pub fn with_override(&self, field: &str, expression: &str) -> EngineResult<Self> {
        let existing = self.formulas.get(field).ok_or_else(|| EngineError::Validation {
            field: "formula_overrides".to_string(),
            message: format!("no active formula computes '{}'", field),
        })?;
        let ast = parse(expression)?;

        let mut formula = existing.formula.clone();
        formula.expression = expression.to_string();
        formula.declared_variables = ast.variables();

        let mut formulas = self.formulas.clone();
        formulas.insert(
            field.to_string(),
            CompiledFormula {
                formula,
                ast: Arc::new(ast),
            },
        );
        Ok(Self {
            organization_id: self.organization_id.clone(),
            formulas,
        })
    }

    /// Checks that every declared input is either available or produced by the set.
    pub fn check_inputs(&self, is_available: impl Fn(&str) -> bool) -> EngineResult<()> {
        for compiled in self.formulas.values() {
            for name in &compiled.formula.declared_variables {
                if !is_available(name.as_str()) && !self.produces(name) {
                    return Err(EngineError::UnknownVariable { name: name.clone() });
                }
            }
        }
        Ok(())
    }

    /// Orders formulas so each runs after every formula whose field it consumes.
    ///
    /// Independent formulas run in target-field order, so the result does not
    /// depend on the order formulas were added. A cycle is reported as
    /// [`EngineError::FormulaCycle`] starting from its alphabetically first field.
    ///
    /// # Example
    ///
    /// ```
    /// use payroll_engine::formula::{CompiledFormula, FormulaSet, parse};
    /// use payroll_engine::models::{FieldKind, PayrollFormula};
    /// use std::sync::Arc;
    /// use uuid::Uuid;
    ///
    /// fn compiled(field: &str, expression: &str) -> CompiledFormula {
    ///     let ast = parse(expression).unwrap();
    ///     CompiledFormula {
    ///         formula: PayrollFormula {
    ///             id: Uuid::new_v4(),
    ///             organization_id: "org".into(),
    ///             name: field.into(),
    ///             target_field: field.into(),
    ///             kind: FieldKind::Informational,
    ///             expression: expression.into(),
    ///             declared_variables: ast.variables(),
    ///             is_active: true,
    ///             version: 1,
    ///         },
    ///         ast: Arc::new(ast),
    ///     }
    /// }
    ///
    /// let set = FormulaSet::new("org", vec![
    ///     compiled("net", "gross - tax"),
    ///     compiled("tax", "gross * 0.1"),
    ///     compiled("gross", "basicSalary + 100"),
    /// ]).unwrap();
    /// let order: Vec<_> = set.evaluation_order().unwrap()
    ///     .into_iter().map(|f| f.target_field().to_string()).collect();
    /// assert_eq!(order, vec!["gross", "tax", "net"]);
    /// ```
    pub fn evaluation_order(&self) -> EngineResult<Vec<&CompiledFormula>> {
        let dependencies: BTreeMap<&str, BTreeSet<&str>> = self
            .formulas
            .iter()
            .map(|(field, compiled)| {
                let deps = compiled
                    .formula
                    .declared_variables
                    .iter()
                    .map(String::as_str)
                    .filter(|name| self.produces(name))
                    .collect();
                (field.as_str(), deps)
            })
            .collect();

        let mut remaining: BTreeMap<&str, BTreeSet<&str>> = dependencies.clone();
        let mut ordered = Vec::with_capacity(self.formulas.len());

        loop {
            let ready = remaining
                .iter()
                .find(|(_, deps)| deps.is_empty())
                .map(|(field, _)| *field);
            let Some(field) = ready else { break };

            remaining.remove(field);
            for deps in remaining.values_mut() {
                deps.remove(field);
            }
            if let Some(compiled) = self.formulas.get(field) {
                ordered.push(compiled);
            }
        }

        if remaining.is_empty() {
            Ok(ordered)
        } else {
            Err(EngineError::FormulaCycle {
                cycle: find_cycle(&remaining),
            })
        }
    }
}

/// Walks unresolved dependencies from the smallest field until a field repeats.
///
/// Every field left in `remaining` still has a dependency inside `remaining`,
/// so the walk always closes a loop.
fn find_cycle(remaining: &BTreeMap<&str, BTreeSet<&str>>) -> Vec<String> {
    let Some(start) = remaining.keys().next().copied() else {
        return Vec::new();
    };

    let mut path: Vec<&str> = vec![start];
    let mut current = start;
    loop {
        let next = remaining
            .get(current)
            .and_then(|deps| deps.iter().next().copied())
            .unwrap_or(start);
        if let Some(pos) = path.iter().position(|field| *field == next) {
            let mut cycle: Vec<&str> = path[pos..].to_vec();
            // Consumers point at producers; reverse so the cycle reads in evaluation order.
            cycle.reverse();
            let min_pos = cycle
                .iter()
                .enumerate()
                .min_by_key(|(_, field)| **field)
                .map(|(i, _)| i)
                .unwrap_or(0);
            cycle.rotate_left(min_pos);
            let first = cycle[0];
            cycle.push(first);
            return cycle.into_iter().map(str::to_string).collect();
        }
        path.push(next);
        current = next;
    }
}
