//! In-memory payroll record storage.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{PayPeriod, PayrollRecord};

/// Stores every record version.
///
/// At most one active (non-superseded) record exists per employee and
/// period; [`RecordStore::insert`] refuses a second one.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Mutex<HashMap<Uuid, PayrollRecord>>,
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record with the given id.
    pub fn get(&self, id: Uuid) -> EngineResult<PayrollRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(EngineError::RecordNotFound { id })
    }

    /// Returns the active record for the employee and period, if any.
    pub fn active(&self, employee_id: &str, period: PayPeriod) -> Option<PayrollRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        find_active(&records, employee_id, period).cloned()
    }

    /// Returns every version for the employee and period, oldest first.
    pub fn history(&self, employee_id: &str, period: PayPeriod) -> Vec<PayrollRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut history: Vec<PayrollRecord> = records
            .values()
            .filter(|r| r.employee_id == employee_id && r.period == period)
            .cloned()
            .collect();
        history.sort_by_key(|r| r.version);
        history
    }

    /// The highest version stored for the employee and period, or 0.
    pub fn latest_version(&self, employee_id: &str, period: PayPeriod) -> u32 {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.employee_id == employee_id && r.period == period)
            .map(|r| r.version)
            .max()
            .unwrap_or(0)
    }

    /// Stores a new record.
    pub fn insert(&self, record: PayrollRecord) -> EngineResult<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if find_active(&records, &record.employee_id, record.period).is_some() {
            return Err(EngineError::DuplicateCalculation {
                employee_id: record.employee_id,
                period: record.period,
            });
        }
        records.insert(record.id, record);
        Ok(())
    }

    /// Applies `change` to a copy of the record and stores it if it succeeds.
    pub fn update(
        &self,
        id: Uuid,
        change: impl FnOnce(&mut PayrollRecord) -> EngineResult<()>,
    ) -> EngineResult<PayrollRecord> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut record = records
            .get(&id)
            .cloned()
            .ok_or(EngineError::RecordNotFound { id })?;
        change(&mut record)?;
        records.insert(id, record.clone());
        Ok(record)
    }

    /// Marks `prior_id` superseded and stores `replacement` in one step.
    pub fn supersede(&self, prior_id: Uuid, replacement: PayrollRecord) -> EngineResult<PayrollRecord> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut prior = records
            .get(&prior_id)
            .cloned()
            .ok_or(EngineError::RecordNotFound { id: prior_id })?;
        if prior.employee_id != replacement.employee_id || prior.period != replacement.period {
            return Err(EngineError::Validation {
                field: "replacement".to_string(),
                message: "replacement must cover the same employee and period".to_string(),
            });
        }
        prior.supersede(replacement.id)?;
        records.insert(prior.id, prior);
        records.insert(replacement.id, replacement.clone());
        Ok(replacement)
    }
}

fn find_active<'a>(
    records: &'a HashMap<Uuid, PayrollRecord>,
    employee_id: &str,
    period: PayPeriod,
) -> Option<&'a PayrollRecord> {
    records
        .values()
        .find(|r| r.employee_id == employee_id && r.period == period && r.status.is_active())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordStatus;

    fn period() -> PayPeriod {
        PayPeriod::new(3, 2026).unwrap()
    }

    #[test]
    fn test_one_active_record_per_key() {
        let store = RecordStore::new();
        store.insert(PayrollRecord::draft("emp_001", period(), 1)).unwrap();
        let err = store
            .insert(PayrollRecord::draft("emp_001", period(), 2))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateCalculation { .. }));
        assert!(store.insert(PayrollRecord::draft("emp_002", period(), 1)).is_ok());
    }

    #[test]
    fn test_failed_update_leaves_record_unchanged() {
        let store = RecordStore::new();
        let record = PayrollRecord::draft("emp_001", period(), 1);
        let id = record.id;
        store.insert(record).unwrap();

        assert!(store.update(id, |r| r.approve("mgr_01")).is_err());
        assert_eq!(store.get(id).unwrap().status, RecordStatus::Draft);
    }

    #[test]
    fn test_supersede_swaps_active_record() {
        let store = RecordStore::new();
        let first = PayrollRecord::draft("emp_001", period(), 1);
        let first_id = first.id;
        store.insert(first).unwrap();

        let second = PayrollRecord::draft("emp_001", period(), 2);
        let second_id = second.id;
        store.supersede(first_id, second).unwrap();

        let prior = store.get(first_id).unwrap();
        assert_eq!(prior.status, RecordStatus::Superseded);
        assert_eq!(prior.superseded_by, Some(second_id));
        assert_eq!(store.active("emp_001", period()).unwrap().id, second_id);
        assert_eq!(store.latest_version("emp_001", period()), 2);

        let history: Vec<u32> = store.history("emp_001", period()).iter().map(|r| r.version).collect();
        assert_eq!(history, vec![1, 2]);
    }

    #[test]
    fn test_missing_record() {
        let store = RecordStore::new();
        assert!(matches!(
            store.get(Uuid::nil()),
            Err(EngineError::RecordNotFound { .. })
        ));
    }
}
