//! Retry/reflect controller: bounds repeated attempts per task.
//!
//! Every failure increments the task's attempt count. While attempts stay
//! within `max_attempts` the task is retried; once the budget is spent the
//! controller asks for a split (at most `max_splits` times along a split
//! lineage, since sub-tasks inherit their parent's split count) and after
//! that gives up. It only decides; the run loop applies the decision.

use crate::errors::LedgerError;
use crate::gate::VerificationResult;
use crate::ledger::Ledger;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Retry,
    Split,
    Abandon,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Retry => "retry",
            Decision::Split => "split",
            Decision::Abandon => "abandon",
        })
    }
}

/// Attempt and split budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_splits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_splits: 1,
        }
    }
}

pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Record a failed attempt and decide what happens next.
    ///
    /// A split decision also bumps the task's split count.
    pub fn on_failure(
        &self,
        task_id: &str,
        ledger: &mut Ledger,
        result: &VerificationResult,
    ) -> Result<Decision, LedgerError> {
        let attempts = ledger.record_attempt(task_id)?;
        let split_count = ledger.get(task_id)?.split_count;

        let decision = if attempts <= self.policy.max_attempts {
            Decision::Retry
        } else if split_count < self.policy.max_splits {
            ledger.record_split(task_id)?;
            Decision::Split
        } else {
            Decision::Abandon
        };

        let stage = result
            .failed_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match decision {
            Decision::Retry => info!(
                task = task_id,
                attempts,
                max = self.policy.max_attempts,
                %stage,
                "Attempt failed, retrying"
            ),
            Decision::Split => warn!(
                task = task_id,
                attempts,
                %stage,
                "Retry budget exhausted, requesting split"
            ),
            Decision::Abandon => warn!(
                task = task_id,
                attempts,
                split_count,
                %stage,
                "Retry and split budgets exhausted, abandoning"
            ),
        }

        Ok(decision)
    }
}
