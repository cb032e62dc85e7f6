//! Application state for the Payroll Formula Engine API.

use crate::calculation::Calculator;
use crate::config::ConfigLoader;
use crate::error::EngineResult;
use crate::formula::FormulaRegistry;
use crate::lifecycle::{CorrectionService, PayrollService};

/// Shared application state.
///
/// Holds the record and correction services; both share one calculator and
/// one record store.
#[derive(Clone)]
pub struct AppState {
    payroll: PayrollService,
    corrections: CorrectionService,
}

impl AppState {
    /// Creates state around a calculator with empty record and correction stores.
    pub fn new(calculator: Calculator) -> Self {
        let payroll = PayrollService::new(calculator);
        let corrections = CorrectionService::new(payroll.clone());
        Self {
            payroll,
            corrections,
        }
    }

    /// Creates state from a loaded configuration directory.
    pub fn from_config(config: &ConfigLoader) -> EngineResult<Self> {
        Ok(Self::new(config.build_calculator()?))
    }

    /// The payroll record service.
    pub fn payroll(&self) -> &PayrollService {
        &self.payroll
    }

    /// The error correction service.
    pub fn corrections(&self) -> &CorrectionService {
        &self.corrections
    }

    /// The formula registry.
    pub fn registry(&self) -> &FormulaRegistry {
        self.payroll.calculator().registry()
    }
}
