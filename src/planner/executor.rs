//! Plan executor.
//!
//! Plans are applied one at a time in the order planning produced them.
//! The first failure stops the run; nothing is rolled back.

use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::backend::Action;
use crate::error::{PlanError, Result, SyncError};

use super::PendingChange;

/// Applies pending changes.
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    cancel: CancellationToken,
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Number of targets created.
    pub created: usize,
    /// Number of targets updated.
    pub updated: usize,
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Apply complete: {} created, {} updated",
            self.created, self.updated
        )
    }
}

impl PlanExecutor {
    /// Creates an executor bound to a cancellation token.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Applies `changes` in order.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ApplyFailed`] for the first change that fails;
    /// later changes are not applied. Returns [`SyncError::Cancelled`] if
    /// the run is cancelled.
    pub async fn execute(&self, changes: &[PendingChange]) -> Result<ExecutionResult> {
        info!("Applying {} change(s)", changes.len());

        let mut result = ExecutionResult::default();
        for change in changes {
            info!("Applying {}: {}", change.spec, change.preview());

            let applied = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                applied = change.plan.apply() => applied,
            };

            if let Err(e) = applied {
                error!("Failed to apply {}: {}", change.spec, e);
                return Err(PlanError::ApplyFailed {
                    spec: change.spec.clone(),
                    source: Box::new(e),
                }
                .into());
            }

            match change.action() {
                Action::Create => result.created += 1,
                Action::Update => result.updated += 1,
            }
        }

        Ok(result)
    }
}
