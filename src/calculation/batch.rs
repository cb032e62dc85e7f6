//! Bounded, cancellable batch execution.
//!
//! Each employee is processed on the blocking pool under a semaphore permit,
//! so at most `workers` calculations run at once. A failure (or panic) in one
//! employee's job never affects the others.

use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

/// A shared flag requesting that a batch stop early.
///
/// Cancellation is cooperative: it is checked before each employee starts,
/// so in-flight employees finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The outcome for one employee in a batch.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// The employee.
    pub employee_id: String,
    /// The job's result, or [`EngineError::Cancelled`] if it never ran.
    pub result: EngineResult<T>,
}

/// Runs `job` for every employee with at most `workers` running at once.
///
/// Outcomes are returned sorted by employee id.
pub async fn run_batch<T, F>(
    employee_ids: Vec<String>,
    workers: usize,
    cancellation: CancellationToken,
    job: F,
) -> Vec<BatchOutcome<T>>
where
    T: Send + 'static,
    F: Fn(&str) -> EngineResult<T> + Send + Sync + 'static,
{
    let job = Arc::new(job);
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut outcomes = Vec::with_capacity(employee_ids.len());
    let mut handles = Vec::with_capacity(employee_ids.len());

    for employee_id in employee_ids {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                outcomes.push(BatchOutcome {
                    employee_id,
                    result: Err(EngineError::Internal {
                        message: err.to_string(),
                    }),
                });
                continue;
            }
        };
        if cancellation.is_cancelled() {
            outcomes.push(BatchOutcome {
                employee_id,
                result: Err(EngineError::Cancelled),
            });
            continue;
        }

        let job = Arc::clone(&job);
        let task_employee_id = employee_id.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let employee_id = task_employee_id;
            let _permit = permit;
            let result = catch_unwind(AssertUnwindSafe(|| job(employee_id.as_str())))
                .unwrap_or_else(|_| {
                    Err(EngineError::Internal {
                        message: format!("calculation for '{}' panicked", employee_id),
                    })
                });
            BatchOutcome {
                employee_id,
                result,
            }
        });
        handles.push((employee_id, handle));
    }

    for (employee_id, handle) in handles {
        outcomes.push(joined(employee_id, handle.await));
    }

    outcomes.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        employees = outcomes.len(),
        failed,
        cancelled = cancellation.is_cancelled(),
        "Batch finished"
    );
    outcomes
}

/// Turns a worker that could not be joined into a failed outcome.
fn joined<T, E: Display>(employee_id: String, joined: Result<BatchOutcome<T>, E>) -> BatchOutcome<T> {
    joined.unwrap_or_else(|err| {
        warn!(employee_id = %employee_id, error = %err, "Batch worker task failed");
        BatchOutcome {
            result: Err(EngineError::Internal {
                message: format!("worker for '{}' failed: {}", employee_id, err),
            }),
            employee_id,
        }
    })
}
