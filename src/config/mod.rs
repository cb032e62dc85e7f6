//! Configuration loading and management for the payroll engine.
//!
//! This module loads engine settings, the variable vocabulary and each
//! organization's formulas from YAML files.
//!
//! # Example
//!
//! ```no_run
//! use payroll_engine::config::ConfigLoader;
//!
//! let config = ConfigLoader::load("./config/default").unwrap();
//! println!("Base currency: {}", config.settings().base_currency);
//! ```

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    AttendanceFixture, EngineSettings, ExchangeRateFixture, FixturesConfig, FormulaDefinition,
    FormulaFile, VariablesConfig,
};
