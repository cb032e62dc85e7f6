//! Formula registry.
//!
//! The [`FormulaRegistry`] stores every version of every organization's
//! formulas. Each mutation is validated against the organization's whole
//! active set before it is committed, so the active set is always free of
//! unknown variables, duplicate targets and dependency cycles.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::cache::FormulaCache;
use super::parser::parse;
use super::set::{CompiledFormula, FormulaSet};
use crate::error::{EngineError, EngineResult};
use crate::models::{FieldKind, FormulaVariable, PayrollFormula};

/// A formula submitted for registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFormula {
    /// Owning organization.
    pub organization_id: String,
    /// Human-readable name.
    pub name: String,
    /// Output field.
    pub target_field: String,
    /// Contribution to totals.
    #[serde(default)]
    pub kind: FieldKind,
    /// Formula source.
    pub expression: String,
    /// Variables the formula may read. Derived from the expression when absent.
    #[serde(default)]
    pub declared_variables: Option<BTreeSet<String>>,
    /// Whether to activate the formula immediately.
    #[serde(default = "default_activate")]
    pub activate: bool,
}

fn default_activate() -> bool {
    true
}

/// Returns the variable identifiers referenced by a formula expression.
///
/// # Example
///
/// ```
/// use payroll_engine::formula::extract_variables;
///
/// let vars = extract_variables("max(0, basicSalary - absentDays * 100)").unwrap();
/// assert!(vars.contains("basicSalary"));
/// assert!(vars.contains("absentDays"));
/// assert_eq!(vars.len(), 2);
/// ```
pub fn extract_variables(expression: &str) -> EngineResult<BTreeSet<String>> {
    Ok(parse(expression)?.variables())
}

/// Checks that an expression parses and only reads known names.
///
/// Returns the expression's referenced variables.
pub fn validate(expression: &str, is_known: impl Fn(&str) -> bool) -> EngineResult<BTreeSet<String>> {
    let referenced = extract_variables(expression)?;
    if let Some(name) = referenced.iter().find(|name| !is_known(name.as_str())) {
        return Err(EngineError::UnknownVariable { name: name.clone() });
    }
    Ok(referenced)
}

/// Versioned store of payroll formulas.
#[derive(Debug)]
pub struct FormulaRegistry {
    vocabulary: BTreeMap<String, FormulaVariable>,
    formulas: RwLock<HashMap<Uuid, PayrollFormula>>,
    cache: FormulaCache,
}

impl FormulaRegistry {
    /// Creates an empty registry over the given global variable vocabulary.
    pub fn new(vocabulary: impl IntoIterator<Item = FormulaVariable>) -> Self {
        Self {
            vocabulary: vocabulary
                .into_iter()
                .map(|variable| (variable.name.clone(), variable))
                .collect(),
            formulas: RwLock::new(HashMap::new()),
            cache: FormulaCache::new(),
        }
    }

    /// The global variables every formula may read.
    pub fn vocabulary(&self) -> &BTreeMap<String, FormulaVariable> {
        &self.vocabulary
    }

    /// Returns true if `name` is a global variable.
    pub fn is_global(&self, name: &str) -> bool {
        self.vocabulary.contains_key(name)
    }

    /// The parsed-AST cache shared by every formula set built here.
    pub fn cache(&self) -> &FormulaCache {
        &self.cache
    }

    /// Registers a formula as the next version of its target field.
    ///
    /// When `activate` is set, the previous active version of the field is
    /// deactivated in the same step. Nothing is stored if validation fails.
    pub fn register(&self, new: NewFormula) -> EngineResult<PayrollFormula> {
        let organization_id = new.organization_id.clone();
        let mut registered = self.register_all(&organization_id, vec![new])?;
        registered.pop().ok_or_else(|| EngineError::Validation {
            field: "formulas".to_string(),
            message: "nothing was registered".to_string(),
        })
    }

    /// Registers several formulas for one organization as a unit.
    ///
    /// Formulas in the batch may depend on each other regardless of order.
    pub fn register_all(
        &self,
        organization_id: &str,
        batch: Vec<NewFormula>,
    ) -> EngineResult<Vec<PayrollFormula>> {
        let mut formulas = self.formulas.write().unwrap_or_else(PoisonError::into_inner);
        let mut staged = formulas.clone();
        let mut registered = Vec::with_capacity(batch.len());

        for new in batch {
            if new.organization_id != organization_id {
                return Err(EngineError::Validation {
                    field: "organization_id".to_string(),
                    message: format!(
                        "formula '{}' belongs to '{}', not '{}'",
                        new.name, new.organization_id, organization_id
                    ),
                });
            }
            self.check_target_field(&new.target_field)?;
            let declared = self.declared_variables(&new.expression, new.declared_variables)?;

            let formula = PayrollFormula {
                id: Uuid::new_v4(),
                organization_id: new.organization_id,
                name: new.name,
                version: next_version(&staged, organization_id, &new.target_field),
                target_field: new.target_field,
                kind: new.kind,
                expression: new.expression,
                declared_variables: declared,
                is_active: new.activate,
            };
            if formula.is_active {
                deactivate_other_versions(&mut staged, &formula);
            }
            staged.insert(formula.id, formula.clone());
            registered.push(formula);
        }

        self.check_organization(&staged, organization_id)?;
        *formulas = staged;

        for formula in &registered {
            info!(
                formula_id = %formula.id,
                organization_id = %formula.organization_id,
                target_field = %formula.target_field,
                version = formula.version,
                active = formula.is_active,
                "Registered formula"
            );
        }
        Ok(registered)
    }

    /// Activates a formula version, deactivating other versions of its field.
    pub fn activate(&self, id: Uuid) -> EngineResult<PayrollFormula> {
        let mut formulas = self.formulas.write().unwrap_or_else(PoisonError::into_inner);
        let mut staged = formulas.clone();
        let formula = staged
            .get_mut(&id)
            .ok_or(EngineError::FormulaNotFound { id })?;
        formula.is_active = true;
        let formula = formula.clone();
        deactivate_other_versions(&mut staged, &formula);

        if let Err(err) = self.check_organization(&staged, &formula.organization_id) {
            warn!(formula_id = %id, error = %err, "Formula activation rejected");
            return Err(err);
        }
        *formulas = staged;
        info!(formula_id = %id, target_field = %formula.target_field, "Activated formula");
        Ok(formula)
    }

    /// Deactivates a formula version.
    ///
    /// Fails if another active formula still reads the field it computes.
    pub fn deactivate(&self, id: Uuid) -> EngineResult<PayrollFormula> {
        let mut formulas = self.formulas.write().unwrap_or_else(PoisonError::into_inner);
        let mut staged = formulas.clone();
        let formula = staged
            .get_mut(&id)
            .ok_or(EngineError::FormulaNotFound { id })?;
        formula.is_active = false;
        let formula = formula.clone();

        self.check_organization(&staged, &formula.organization_id)?;
        *formulas = staged;
        info!(formula_id = %id, target_field = %formula.target_field, "Deactivated formula");
        Ok(formula)
    }

    /// Replaces a formula's expression by registering a new version.
    ///
    /// The new version inherits the old one's name, kind and activation, and
    /// the old version's cached AST is dropped.
    pub fn update_expression(&self, id: Uuid, expression: &str) -> EngineResult<PayrollFormula> {
        let mut formulas = self.formulas.write().unwrap_or_else(PoisonError::into_inner);
        let previous = formulas
            .get(&id)
            .cloned()
            .ok_or(EngineError::FormulaNotFound { id })?;
        let declared = self.declared_variables(expression, None)?;

        let mut staged = formulas.clone();
        let formula = PayrollFormula {
            id: Uuid::new_v4(),
            expression: expression.to_string(),
            declared_variables: declared,
            version: next_version(&staged, &previous.organization_id, &previous.target_field),
            ..previous.clone()
        };
        if formula.is_active {
            deactivate_other_versions(&mut staged, &formula);
        }
        staged.insert(formula.id, formula.clone());

        self.check_organization(&staged, &formula.organization_id)?;
        *formulas = staged;
        self.cache.invalidate(&previous.expression, previous.version);

        info!(
            formula_id = %formula.id,
            previous_id = %previous.id,
            version = formula.version,
            "Updated formula expression"
        );
        Ok(formula)
    }

    /// Returns a formula version by id.
    pub fn get(&self, id: Uuid) -> EngineResult<PayrollFormula> {
        self.formulas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(EngineError::FormulaNotFound { id })
    }

    /// Lists every version of an organization's formulas by field then version.
    pub fn list(&self, organization_id: &str) -> Vec<PayrollFormula> {
        let mut list: Vec<PayrollFormula> = self
            .formulas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|f| f.organization_id == organization_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.target_field
                .cmp(&b.target_field)
                .then(a.version.cmp(&b.version))
        });
        list
    }

    /// Returns the organization's active formulas as a validated set.
    pub fn formula_set(&self, organization_id: &str) -> EngineResult<FormulaSet> {
        let formulas = self.formulas.read().unwrap_or_else(PoisonError::into_inner);
        self.compile(&formulas, organization_id)
    }

    /// Checks an expression against the vocabulary and an organization's active fields.
    ///
    /// Used to validate a formula before it is registered.
    pub fn validate_for(&self, organization_id: &str, expression: &str) -> EngineResult<BTreeSet<String>> {
        let formulas = self.formulas.read().unwrap_or_else(PoisonError::into_inner);
        let fields: BTreeSet<&str> = formulas
            .values()
            .filter(|f| f.is_active && f.organization_id == organization_id)
            .map(|f| f.target_field.as_str())
            .collect();
        validate(expression, |name| self.is_global(name) || fields.contains(name))
    }

    fn check_target_field(&self, field: &str) -> EngineResult<()> {
        let mut chars = field.chars();
        let well_formed = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            && field != "true"
            && field != "false";
        if !well_formed {
            return Err(EngineError::Validation {
                field: "target_field".to_string(),
                message: format!("'{}' is not a valid identifier", field),
            });
        }
        if self.is_global(field) {
            return Err(EngineError::Validation {
                field: "target_field".to_string(),
                message: format!("'{}' is a built-in variable", field),
            });
        }
        Ok(())
    }

    /// Parses the expression and returns its declared variables.
    ///
    /// Explicit declarations must cover every referenced non-global name.
    fn declared_variables(
        &self,
        expression: &str,
        declared: Option<BTreeSet<String>>,
    ) -> EngineResult<BTreeSet<String>> {
        let referenced = extract_variables(expression)?;
        match declared {
            None => Ok(referenced),
            Some(declared) => {
                if let Some(name) = referenced
                    .iter()
                    .find(|name| !declared.contains(*name) && !self.is_global(name))
                {
                    return Err(EngineError::UnknownVariable { name: name.clone() });
                }
                Ok(declared)
            }
        }
    }

    fn compile(
        &self,
        formulas: &HashMap<Uuid, PayrollFormula>,
        organization_id: &str,
    ) -> EngineResult<FormulaSet> {
        let compiled = formulas
            .values()
            .filter(|f| f.is_active && f.organization_id == organization_id)
            .map(|f| {
                Ok(CompiledFormula {
                    ast: self.cache.get_or_parse(&f.expression, f.version)?,
                    formula: f.clone(),
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        FormulaSet::new(organization_id, compiled)
    }

    fn check_organization(
        &self,
        formulas: &HashMap<Uuid, PayrollFormula>,
        organization_id: &str,
    ) -> EngineResult<()> {
        let set = self.compile(formulas, organization_id)?;
        set.check_inputs(|name| self.is_global(name))?;
        set.evaluation_order()?;
        Ok(())
    }
}

fn next_version(formulas: &HashMap<Uuid, PayrollFormula>, organization_id: &str, field: &str) -> u32 {
    formulas
        .values()
        .filter(|f| f.organization_id == organization_id && f.target_field == field)
        .map(|f| f.version)
        .max()
        .unwrap_or(0)
        + 1
}

fn deactivate_other_versions(formulas: &mut HashMap<Uuid, PayrollFormula>, active: &PayrollFormula) {
    for formula in formulas.values_mut() {
        if formula.id != active.id
            && formula.organization_id == active.organization_id
            && formula.target_field == active.target_field
        {
            formula.is_active = false;
        }
    }
}
