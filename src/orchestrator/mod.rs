//! The run loop and the state it persists around a run.

pub mod lock;
pub mod report;
pub mod run_log;
pub mod runner;
pub mod split;

pub use lock::RunLock;
pub use report::{RunOutcome, RunReport, TaskRow};
pub use run_log::{EntryOutcome, RunLog, RunLogEntry, RunPhase};
pub use runner::RunLoop;
pub use split::apply_split;
