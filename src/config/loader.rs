//! Configuration loading functionality.
//!
//! This module provides the [`ConfigLoader`] type for loading engine settings,
//! the variable vocabulary and per-organization formulas from YAML files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::calculation::Calculator;
use crate::context::{
    ContextBuilder, InMemoryAttendance, InMemoryCurrency, InMemoryEmployeeDirectory,
    builtin_variables,
};
use crate::error::{EngineError, EngineResult};
use crate::formula::FormulaRegistry;
use crate::models::{DataType, FormulaVariable, SourceKind};

use super::types::{EngineSettings, FixturesConfig, FormulaFile, VariablesConfig};

/// Loads and provides access to engine configuration.
///
/// # Directory Structure
///
/// ```text
/// config/default/
/// ├── engine.yaml      # Rounding, currencies, field kinds, batch workers
/// ├── variables.yaml   # Constant variables added to the built-in vocabulary
/// ├── fixtures.yaml    # Optional seed data for the in-memory collaborators
/// └── formulas/
///     └── org_acme.yaml  # One file per organization
/// ```
///
/// # Example
///
/// ```no_run
/// use payroll_engine::config::ConfigLoader;
///
/// let loader = ConfigLoader::load("./config/default")?;
/// let registry = loader.build_registry()?;
/// let set = registry.formula_set("org_acme")?;
/// println!("{} active formulas", set.len());
/// # Ok::<(), payroll_engine::error::EngineError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    settings: EngineSettings,
    vocabulary: Vec<FormulaVariable>,
    formula_files: Vec<FormulaFile>,
    fixtures: FixturesConfig,
}

impl ConfigLoader {
    /// Loads configuration from the specified directory.
    ///
    /// Returns an error if `engine.yaml`, `variables.yaml` or the `formulas`
    /// directory is missing, if any file contains invalid YAML, or if a
    /// configured variable is malformed. `fixtures.yaml` is optional.
    pub fn load<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();

        let settings = Self::load_yaml::<EngineSettings>(&path.join("engine.yaml"))?;

        let variables_path = path.join("variables.yaml");
        let variables = Self::load_yaml::<VariablesConfig>(&variables_path)?;
        let vocabulary = Self::merge_vocabulary(&variables_path, variables.variables)?;

        let formula_files = Self::load_formula_files(&path.join("formulas"))?;

        let fixtures_path = path.join("fixtures.yaml");
        let fixtures = if fixtures_path.exists() {
            Self::load_yaml::<FixturesConfig>(&fixtures_path)?
        } else {
            FixturesConfig::default()
        };

        info!(
            path = %path.display(),
            organizations = formula_files.len(),
            variables = vocabulary.len(),
            "Loaded engine configuration"
        );

        Ok(Self {
            settings,
            vocabulary,
            formula_files,
            fixtures,
        })
    }

    /// Loads and parses a YAML file.
    fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> EngineResult<T> {
        let path_str = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|_| EngineError::ConfigNotFound {
            path: path_str.clone(),
        })?;

        serde_yaml::from_str(&content).map_err(|e| EngineError::ConfigParseError {
            path: path_str,
            message: e.to_string(),
        })
    }

    /// Loads every `*.yaml` file in the formulas directory, sorted by file name.
    fn load_formula_files(dir: &Path) -> EngineResult<Vec<FormulaFile>> {
        let dir_str = dir.display().to_string();
        let entries = fs::read_dir(dir).map_err(|_| EngineError::ConfigNotFound {
            path: dir_str.clone(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
            .collect();
        paths.sort();

        let mut files: Vec<FormulaFile> = Vec::with_capacity(paths.len());
        for path in &paths {
            let file = Self::load_yaml::<FormulaFile>(path)?;
            if files
                .iter()
                .any(|other| other.organization_id == file.organization_id)
            {
                return Err(EngineError::ConfigParseError {
                    path: path.display().to_string(),
                    message: format!(
                        "organization '{}' is defined in more than one file",
                        file.organization_id
                    ),
                });
            }
            files.push(file);
        }
        Ok(files)
    }

    /// Appends configured constants to the built-in vocabulary.
    fn merge_vocabulary(
        path: &Path,
        configured: Vec<FormulaVariable>,
    ) -> EngineResult<Vec<FormulaVariable>> {
        let invalid = |message: String| EngineError::ConfigParseError {
            path: path.display().to_string(),
            message,
        };

        let mut vocabulary = builtin_variables();
        for variable in configured {
            if vocabulary.iter().any(|known| known.name == variable.name) {
                return Err(invalid(format!(
                    "variable '{}' is defined more than once",
                    variable.name
                )));
            }
            if variable.source_kind != SourceKind::Constant {
                return Err(invalid(format!(
                    "variable '{}' must be a constant; only constants can be configured",
                    variable.name
                )));
            }
            let Some(value) = variable.value else {
                return Err(invalid(format!("constant '{}' has no value", variable.name)));
            };
            let matches_type = match variable.data_type {
                DataType::Boolean => value.as_bool().is_ok(),
                DataType::Integer | DataType::Decimal => value.as_decimal().is_ok(),
            };
            if !matches_type {
                return Err(invalid(format!(
                    "constant '{}' is declared {:?} but has a {} value",
                    variable.name,
                    variable.data_type,
                    value.type_name()
                )));
            }
            vocabulary.push(variable);
        }
        Ok(vocabulary)
    }

    /// Returns the engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Returns the full variable vocabulary, built-ins first.
    pub fn vocabulary(&self) -> &[FormulaVariable] {
        &self.vocabulary
    }

    /// Returns the loaded formula files.
    pub fn formula_files(&self) -> &[FormulaFile] {
        &self.formula_files
    }

    /// Returns the seed data for the in-memory collaborators.
    pub fn fixtures(&self) -> &FixturesConfig {
        &self.fixtures
    }

    /// Creates a registry and registers every configured formula.
    ///
    /// Any invalid formula fails the whole load.
    pub fn build_registry(&self) -> EngineResult<FormulaRegistry> {
        let registry = FormulaRegistry::new(self.vocabulary.iter().cloned());
        for file in &self.formula_files {
            registry.register_all(&file.organization_id, file.to_new_formulas(&self.settings))?;
        }
        Ok(registry)
    }

    /// Creates in-memory collaborators seeded from `fixtures.yaml`.
    pub fn seed_collaborators(
        &self,
    ) -> (InMemoryEmployeeDirectory, InMemoryAttendance, InMemoryCurrency) {
        let directory = InMemoryEmployeeDirectory::new();
        for employee in &self.fixtures.employees {
            directory.upsert(employee.clone());
        }
        let attendance = InMemoryAttendance::new();
        for fixture in &self.fixtures.attendance {
            attendance.record(fixture.employee_id.clone(), fixture.period, fixture.facts);
        }
        let currency = InMemoryCurrency::new();
        for rate in &self.fixtures.exchange_rates {
            currency.set_rate(rate.from.clone(), rate.to.clone(), rate.rate);
        }
        (directory, attendance, currency)
    }

    /// Wires a [`Calculator`] over the configured registry and seeded collaborators.
    pub fn build_calculator(&self) -> EngineResult<Calculator> {
        let registry = Arc::new(self.build_registry()?);
        let (directory, attendance, currency) = self.seed_collaborators();
        let contexts = ContextBuilder::new(
            Arc::new(directory),
            Arc::new(attendance),
            Arc::new(currency),
            &self.settings,
        )
        .with_constants(registry.vocabulary().values());
        Ok(Calculator::new(
            registry,
            contexts,
            Arc::new(self.settings.clone()),
        ))
    }
}
