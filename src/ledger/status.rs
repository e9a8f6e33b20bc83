//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a task in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started; dependencies may be incomplete
    #[default]
    Todo,
    /// All dependencies completed
    Ready,
    /// Currently being worked on (at most one task)
    InProgress,
    /// Waiting on a split or on a failed dependency
    Blocked,
    /// Verified and done
    Completed,
    /// Abandoned after exhausting retries and splits
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Todo,
        TaskStatus::Ready,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Todo, Ready | InProgress | Blocked)
                | (Ready, InProgress | Blocked)
                | (InProgress, Completed | Blocked | Failed)
                | (Blocked, Todo | Completed)
        )
    }

    /// Statuses that are only legal once every dependency is completed.
    pub fn requires_completed_dependencies(self) -> bool {
        matches!(
            self,
            TaskStatus::Ready | TaskStatus::InProgress | TaskStatus::Completed | TaskStatus::Failed
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskStatus::*;

    #[test]
    fn test_allowed_transitions() {
        let allowed = [
            (Todo, Ready),
            (Todo, InProgress),
            (Todo, Blocked),
            (Ready, InProgress),
            (Ready, Blocked),
            (InProgress, Completed),
            (InProgress, Blocked),
            (InProgress, Failed),
            (Blocked, Todo),
            (Blocked, Completed),
        ];

        for from in TaskStatus::ALL {
            for to in TaskStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for to in TaskStatus::ALL {
            assert!(!Completed.can_transition_to(to));
            assert!(!Failed.can_transition_to(to));
        }
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Blocked.is_terminal());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&InProgress).unwrap(), "\"in_progress\"");
        let parsed: TaskStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(parsed, Blocked);
        assert_eq!(InProgress.to_string(), "in_progress");
    }
}
