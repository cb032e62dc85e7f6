//! Per-(employee, period) calculation tokens.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{EngineError, EngineResult};
use crate::models::PayPeriod;

type Key = (String, PayPeriod);

/// The set of (employee, period) pairs currently being calculated.
///
/// Holding an [`InFlightGuard`] is the only way to move a record for that
/// pair out of `Draft`. A second concurrent attempt observes
/// [`EngineError::DuplicateCalculation`] instead of waiting.
#[derive(Debug, Clone, Default)]
pub struct InFlightCalculations {
    keys: Arc<Mutex<HashSet<Key>>>,
}

impl InFlightCalculations {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the pair, failing if another calculation already holds it.
    pub fn acquire(&self, employee_id: &str, period: PayPeriod) -> EngineResult<InFlightGuard> {
        let key = (employee_id.to_string(), period);
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return Err(EngineError::DuplicateCalculation {
                employee_id: employee_id.to_string(),
                period,
            });
        }
        Ok(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    /// Returns true while the pair is claimed.
    pub fn is_in_flight(&self, employee_id: &str, period: PayPeriod) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(employee_id.to_string(), period))
    }
}

/// Releases its (employee, period) claim when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<Key>>>,
    key: Key,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
