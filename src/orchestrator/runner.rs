//! The run loop: composes graph, ledger, scheduler, gate and retry controller
//! into one sequential state machine.
//!
//! ```text
//! init ─> plan ─> select_task ─> prepare ─> implement ─> verify ─┐
//!           ^         │  ^                      ^                │
//!           │         │  └──── completed ───────┼────────────────┤
//!           │         v                         └─ retry ─ reflect
//!           │       done / stalled                            │
//!           └──────────────── split ──────────────────────────┘
//! ```
//!
//! The ledger is saved after every status transition and one run-log entry is
//! appended per phase, so a crash at any point can be resumed: a task found
//! in progress at `init` goes straight back to `prepare`.

use crate::agent::{AgentRequest, CodingAgent, Decomposer};
use crate::config::Config;
use crate::errors::{BootstrapError, GraphError, RunError, ScheduleError};
use crate::gate::{FailedStage, VerificationGate, VerificationResult};
use crate::graph::TaskGraph;
use crate::ledger::{Ledger, TaskStatus};
use crate::orchestrator::lock::RunLock;
use crate::orchestrator::report::{RunOutcome, RunReport};
use crate::orchestrator::run_log::{EntryOutcome, RunLog, RunLogEntry, RunPhase};
use crate::orchestrator::split::apply_split;
use crate::reflect::{Decision, RetryController};
use crate::scaffold::Scaffolder;
use crate::scheduler::{self, Selection, StallReport};
use crate::tracker::GitTracker;
use crate::ui::RunUI;
use crate::util::tail_chars;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Longest diagnostics excerpt copied into a run-log message.
const LOG_DIAGNOSTICS_CHARS: usize = 2_000;

/// The task currently being worked on.
#[derive(Debug, Clone)]
struct ActiveTask {
    id: String,
    changed: Vec<PathBuf>,
    feedback: Option<String>,
}

impl ActiveTask {
    fn new(id: String) -> Self {
        Self {
            id,
            changed: Vec::new(),
            feedback: None,
        }
    }
}

enum Step {
    Plan,
    SelectTask,
    Prepare(String),
    Implement(ActiveTask),
    Verify(ActiveTask),
    Reflect(ActiveTask, VerificationResult),
    Done,
    Stalled(StallReport),
}

struct RunState {
    graph: TaskGraph,
    ledger: Ledger,
    validated_version: Option<u32>,
    resume: Option<String>,
    _lock: RunLock,
}

pub struct RunLoop {
    config: Config,
    gate: VerificationGate,
    controller: RetryController,
    scaffolder: Arc<dyn Scaffolder>,
    agent: Arc<dyn CodingAgent>,
    decomposer: Option<Arc<dyn Decomposer>>,
    ui: Option<Arc<RunUI>>,
    run_log: RunLog,
    run_id: Uuid,
}

impl RunLoop {
    pub fn new(
        config: Config,
        gate: VerificationGate,
        controller: RetryController,
        scaffolder: Arc<dyn Scaffolder>,
        agent: Arc<dyn CodingAgent>,
    ) -> Self {
        let run_log = RunLog::new(&config.run_log_file);
        Self {
            config,
            gate,
            controller,
            scaffolder,
            agent,
            decomposer: None,
            ui: None,
            run_log,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_decomposer(mut self, decomposer: Arc<dyn Decomposer>) -> Self {
        self.decomposer = Some(decomposer);
        self
    }

    pub fn with_ui(mut self, ui: Arc<RunUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Drive the loop until every task is completed, the run stalls or a
    /// fatal error occurs. A report is written in every case that got past
    /// `init`.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let mut state = match self.init() {
            Ok(state) => state,
            Err(e) => {
                self.log(None, RunPhase::Init, format!("{}", e), EntryOutcome::Error);
                return Err(e);
            }
        };

        match self.drive(&mut state).await {
            Ok(outcome) => {
                let report = self.finish(started_at, outcome, &state)?;
                Ok(report)
            }
            Err(e) => {
                error!(run_id = %self.run_id, "Run aborted: {}", e);
                let outcome = RunOutcome::Aborted {
                    error: e.to_string(),
                };
                if let Err(report_err) = self.finish(started_at, outcome, &state) {
                    warn!("Failed to write report for aborted run: {}", report_err);
                }
                Err(e)
            }
        }
    }

    fn init(&self) -> Result<RunState, RunError> {
        self.config.ensure_directories()?;
        let lock = RunLock::acquire(&self.config.lock_file)?;

        let graph = TaskGraph::load(&self.config.graph_file)?;
        let mut ledger = Ledger::load(&self.config.ledger_file, &graph).map_err(BootstrapError::from)?;
        ledger.recompute_readiness()?;
        ledger.save(&self.config.ledger_file)?;

        let resume = ledger.in_progress().map(String::from);
        let message = match &resume {
            Some(id) => format!("loaded {} task(s), resuming {}", graph.len(), id),
            None => format!("loaded {} task(s)", graph.len()),
        };
        info!(run_id = %self.run_id, tasks = graph.len(), version = graph.version(), "{}", message);
        self.append(
            resume.as_deref(),
            RunPhase::Init,
            message,
            if resume.is_some() {
                EntryOutcome::Resumed
            } else {
                EntryOutcome::Ok
            },
        )?;

        if let Some(ui) = &self.ui {
            let summary = ledger.summary();
            ui.set_completed(summary.completed as u64, summary.total() as u64);
        }

        Ok(RunState {
            graph,
            ledger,
            validated_version: None,
            resume,
            _lock: lock,
        })
    }

    async fn drive(&self, state: &mut RunState) -> Result<RunOutcome, RunError> {
        let mut step = Step::Plan;
        loop {
            step = match step {
                Step::Plan => self.plan(state)?,
                Step::SelectTask => self.select_task(state)?,
                Step::Prepare(id) => self.prepare(state, id).await?,
                Step::Implement(active) => self.implement(state, active).await?,
                Step::Verify(active) => self.verify(state, active).await?,
                Step::Reflect(active, result) => self.reflect(state, active, result).await?,
                Step::Done => {
                    self.append(None, RunPhase::Done, "all tasks completed", EntryOutcome::Ok)?;
                    return Ok(RunOutcome::Done);
                }
                Step::Stalled(report) => return Ok(RunOutcome::Stalled { report }),
            };
        }
    }

    fn plan(&self, state: &mut RunState) -> Result<Step, RunError> {
        let version = state.graph.version();
        let message = if state.validated_version == Some(version) {
            format!("graph version {} already validated", version)
        } else {
            state.graph.validate()?;
            state.validated_version = Some(version);
            format!("validated graph version {} ({} tasks)", version, state.graph.len())
        };
        self.append(None, RunPhase::Plan, message, EntryOutcome::Ok)?;

        Ok(match state.resume.take() {
            Some(id) => {
                info!(task = %id, "Resuming task left in progress");
                Step::Prepare(id)
            }
            None => Step::SelectTask,
        })
    }

    fn select_task(&self, state: &mut RunState) -> Result<Step, RunError> {
        match scheduler::next_step(&state.graph, &state.ledger) {
            Ok(Selection::Finished) => Ok(Step::Done),
            Ok(Selection::Stalled(report)) => {
                warn!("Run stalled: {}", report);
                if let Some(ui) = &self.ui {
                    ui.show_blocker(&format!("Stalled: {}", report));
                }
                self.append(
                    None,
                    RunPhase::SelectTask,
                    report.to_string(),
                    EntryOutcome::Stalled,
                )?;
                Ok(Step::Stalled(report))
            }
            Ok(Selection::Next(id)) => {
                state
                    .ledger
                    .transition(&id, TaskStatus::InProgress, "selected")?;
                state.ledger.save(&self.config.ledger_file)?;
                info!(task = %id, "Selected task");
                self.append(Some(&id), RunPhase::SelectTask, "selected", EntryOutcome::Selected)?;
                Ok(Step::Prepare(id))
            }
            Err(e @ ScheduleError::Deadlock { .. }) => {
                self.log(None, RunPhase::SelectTask, e.to_string(), EntryOutcome::Deadlock);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn prepare(&self, state: &mut RunState, id: String) -> Result<Step, RunError> {
        let task = state
            .graph
            .get(&id)
            .cloned()
            .ok_or_else(|| GraphError::UnknownTask { id: id.clone() })?;
        let attempts = state.ledger.get(&id)?.attempts;
        if let Some(ui) = &self.ui {
            ui.start_task(&id, &task.title, attempts + 1, self.total_tries());
            ui.log_step("scaffolding");
        }

        let active = ActiveTask::new(id);
        match self.scaffolder.scaffold(&task, &self.config.project_dir).await {
            Ok(created) => {
                self.append(
                    Some(&active.id),
                    RunPhase::Prepare,
                    format!("scaffolded {} file(s)", created.len()),
                    EntryOutcome::Ok,
                )?;
                Ok(Step::Implement(active))
            }
            Err(e) => {
                warn!(task = %active.id, "Scaffolding failed: {:#}", e);
                let result = VerificationResult::failed(FailedStage::Scaffold, format!("{:#}", e));
                self.append(
                    Some(&active.id),
                    RunPhase::Prepare,
                    format!("scaffolding failed: {:#}", e),
                    EntryOutcome::Failed,
                )?;
                Ok(Step::Reflect(active, result))
            }
        }
    }

    async fn implement(&self, state: &mut RunState, active: ActiveTask) -> Result<Step, RunError> {
        let task = state
            .graph
            .get(&active.id)
            .cloned()
            .ok_or_else(|| GraphError::UnknownTask {
                id: active.id.clone(),
            })?;
        let record = state.ledger.get(&active.id)?;

        let mut prior_artifacts: Vec<PathBuf> = Vec::new();
        for dep in state.graph.dependencies(&active.id) {
            if let Ok(dep_record) = state.ledger.get(dep) {
                prior_artifacts.extend(dep_record.artifacts.iter().cloned());
            }
        }
        prior_artifacts.extend(record.artifacts.iter().cloned());

        let request = AgentRequest {
            task: task.clone(),
            attempt: record.attempts + 1,
            max_attempts: self.total_tries(),
            prior_artifacts,
            feedback: active.feedback.clone(),
            workspace: self.config.project_dir.clone(),
        };
        if let Some(ui) = &self.ui {
            ui.log_step("running agent");
        }

        match self.agent.implement(&request).await {
            Ok(report) => {
                let mut changed = report.changed_files;
                if changed.is_empty() {
                    changed = task.resolve_artifacts(&self.config.project_dir);
                }
                state.ledger.set_artifacts(&active.id, changed.clone())?;
                state.ledger.save(&self.config.ledger_file)?;

                let message = match &report.summary {
                    Some(summary) => format!("{} changed file(s): {}", changed.len(), summary),
                    None => format!("{} changed file(s)", changed.len()),
                };
                self.append(Some(&active.id), RunPhase::Implement, message, EntryOutcome::Ok)?;
                Ok(Step::Verify(ActiveTask { changed, ..active }))
            }
            Err(e) => {
                warn!(task = %active.id, "Agent failed: {:#}", e);
                self.append(
                    Some(&active.id),
                    RunPhase::Implement,
                    format!("agent failed: {:#}", e),
                    EntryOutcome::Failed,
                )?;
                let result = VerificationResult::failed(FailedStage::Agent, format!("{:#}", e));
                Ok(Step::Reflect(active, result))
            }
        }
    }

    async fn verify(&self, state: &mut RunState, active: ActiveTask) -> Result<Step, RunError> {
        if let Some(ui) = &self.ui {
            ui.log_step("verifying");
        }
        let result = self
            .gate
            .verify(&active.id, &self.config.project_dir, &active.changed)
            .await;

        if !result.passed {
            let stage = stage_name(&result);
            self.append(
                Some(&active.id),
                RunPhase::Verify,
                format!(
                    "{} failed: {}",
                    stage,
                    tail_chars(&result.diagnostics, LOG_DIAGNOSTICS_CHARS)
                ),
                EntryOutcome::Failed,
            )?;
            return Ok(Step::Reflect(active, result));
        }

        state
            .ledger
            .transition(&active.id, TaskStatus::Completed, "verification passed")?;
        state.ledger.recompute_readiness()?;
        let resolved = state.ledger.resolve_split_parents()?;
        if !resolved.is_empty() {
            state.ledger.recompute_readiness()?;
        }
        state.ledger.save(&self.config.ledger_file)?;

        info!(task = %active.id, "Task completed");
        if let Some(ui) = &self.ui {
            ui.task_passed(&active.id);
            ui.tasks_resolved(&resolved);
        }
        let message = if resolved.is_empty() {
            "verification passed".to_string()
        } else {
            format!("verification passed; completed split parent(s) {}", resolved.join(", "))
        };
        self.append(Some(&active.id), RunPhase::Verify, message, EntryOutcome::Passed)?;
        Ok(Step::SelectTask)
    }

    async fn reflect(
        &self,
        state: &mut RunState,
        active: ActiveTask,
        result: VerificationResult,
    ) -> Result<Step, RunError> {
        let decision = self
            .controller
            .on_failure(&active.id, &mut state.ledger, &result)?;
        state.ledger.save(&self.config.ledger_file)?;

        let attempts = state.ledger.get(&active.id)?.attempts;
        let stage = stage_name(&result);
        if let Some(ui) = &self.ui {
            ui.attempt_failed(&active.id, &stage, decision);
        }

        match decision {
            Decision::Retry => {
                self.append(
                    Some(&active.id),
                    RunPhase::Reflect,
                    format!("{} failure, attempt {} of {}", stage, attempts, self.total_tries()),
                    EntryOutcome::Retry,
                )?;
                Ok(Step::Implement(ActiveTask {
                    feedback: Some(result.diagnostics),
                    ..active
                }))
            }
            Decision::Split => {
                state.ledger.request_split(
                    &active.id,
                    &format!("split requested after {} failed attempt(s)", attempts),
                )?;
                state.ledger.save(&self.config.ledger_file)?;
                self.append(
                    Some(&active.id),
                    RunPhase::Reflect,
                    format!("{} failure, attempt budget exhausted, split requested", stage),
                    EntryOutcome::Split,
                )?;
                self.decompose(state, &active.id, &result.diagnostics).await
            }
            Decision::Abandon => {
                state.ledger.transition(
                    &active.id,
                    TaskStatus::Failed,
                    &format!("abandoned after {} failed attempt(s)", attempts),
                )?;
                let dependents = state.graph.transitive_dependents(&active.id);
                let blocked = state
                    .ledger
                    .block_dependents_of_failed(&active.id, dependents.iter().copied())?;
                state.ledger.save(&self.config.ledger_file)?;

                error!(task = %active.id, blocked = blocked.len(), "Task abandoned");
                let message = if blocked.is_empty() {
                    format!("{} failure, abandoned", stage)
                } else {
                    format!("{} failure, abandoned; blocked {}", stage, blocked.join(", "))
                };
                self.append(Some(&active.id), RunPhase::Reflect, message, EntryOutcome::Abandon)?;
                Ok(Step::SelectTask)
            }
        }
    }

    /// Ask the decomposer for sub-tasks. Without a decomposer, or when it
    /// fails, the task stays blocked awaiting a split.
    async fn decompose(
        &self,
        state: &mut RunState,
        id: &str,
        diagnostics: &str,
    ) -> Result<Step, RunError> {
        let Some(decomposer) = &self.decomposer else {
            return Ok(Step::SelectTask);
        };
        let Some(task) = state.graph.get(id).cloned() else {
            return Ok(Step::SelectTask);
        };
        if let Some(ui) = &self.ui {
            ui.log_step("decomposing");
        }

        let subtasks = match decomposer.decompose(&task, diagnostics).await {
            Ok(subtasks) => subtasks,
            Err(e) => {
                warn!(task = id, "Decomposer failed: {:#}", e);
                self.append(
                    Some(id),
                    RunPhase::Reflect,
                    format!("decomposer failed: {:#}", e),
                    EntryOutcome::Error,
                )?;
                return Ok(Step::SelectTask);
            }
        };
        let sub_ids: Vec<String> = subtasks.iter().map(|t| t.id.clone()).collect();

        match apply_split(
            &state.graph,
            &mut state.ledger,
            id,
            subtasks,
            &self.config.graph_file,
            &self.config.ledger_file,
        ) {
            Ok(next) => {
                state.graph = next;
                if let Some(ui) = &self.ui {
                    ui.task_split(id, &sub_ids);
                }
                self.append(
                    Some(id),
                    RunPhase::Reflect,
                    format!("split into {}", sub_ids.join(", ")),
                    EntryOutcome::Split,
                )?;
                Ok(Step::Plan)
            }
            Err(RunError::Graph(e)) => {
                warn!(task = id, "Rejected decomposition: {}", e);
                self.append(
                    Some(id),
                    RunPhase::Reflect,
                    format!("rejected decomposition: {}", e),
                    EntryOutcome::Error,
                )?;
                Ok(Step::SelectTask)
            }
            Err(e) => Err(e),
        }
    }

    fn finish(
        &self,
        started_at: DateTime<Utc>,
        outcome: RunOutcome,
        state: &RunState,
    ) -> Result<RunReport, RunError> {
        let git_head = GitTracker::new(&self.config.project_dir)
            .ok()
            .and_then(|t| t.head_sha());
        let report = RunReport::new(self.run_id, started_at, outcome, &state.graph, &state.ledger)
            .with_git_head(git_head);
        let path = report.write(&self.config.runs_dir)?;
        info!(run_id = %self.run_id, done = report.is_done(), "Run report written to {}", path.display());

        if let Some(ui) = &self.ui {
            let summary = &report.summary;
            ui.finish(&format!(
                "{} of {} completed",
                summary.completed,
                summary.total()
            ));
        }
        Ok(report)
    }

    /// First try plus the retry budget.
    fn total_tries(&self) -> u32 {
        self.controller.policy().max_attempts.saturating_add(1)
    }

    fn append(
        &self,
        task_id: Option<&str>,
        phase: RunPhase,
        message: impl Into<String>,
        outcome: EntryOutcome,
    ) -> Result<(), RunError> {
        self.run_log
            .append(&RunLogEntry::new(self.run_id, task_id, phase, message, outcome))?;
        Ok(())
    }

    /// Best-effort append for paths that are already failing.
    fn log(&self, task_id: Option<&str>, phase: RunPhase, message: String, outcome: EntryOutcome) {
        if let Err(e) = self.append(task_id, phase, message, outcome) {
            warn!("Failed to append run log entry: {}", e);
        }
    }
}

fn stage_name(result: &VerificationResult) -> String {
    result
        .failed_stage
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
