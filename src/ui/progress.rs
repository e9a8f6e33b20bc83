use crate::reflect::Decision;
use crate::ui::icons::{BLOCKER, CHECK, CROSS, PIVOT, SPARKLE, SPLIT};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Terminal UI for a run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Task bar: completed tasks out of the graph size
/// - Attempt bar: spinner with the active task, attempt and current step
pub struct RunUI {
    multi: MultiProgress,
    task_bar: ProgressBar,
    attempt_bar: ProgressBar,
    verbose: bool,
    current_attempt: AtomicU32,
    max_attempts: AtomicU32,
}

impl RunUI {
    /// Create the UI for a graph of `total_tasks` tasks.
    pub fn new(total_tasks: u64, verbose: bool) -> Self {
        Self::with_target(total_tasks, verbose, ProgressDrawTarget::stderr())
    }

    /// A UI that draws nothing, for non-interactive output.
    pub fn hidden(total_tasks: u64) -> Self {
        Self::with_target(total_tasks, false, ProgressDrawTarget::hidden())
    }

    fn with_target(total_tasks: u64, verbose: bool, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let task_bar = multi.add(ProgressBar::new(total_tasks));
        if let Ok(task_style) = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            task_bar.set_style(task_style.progress_chars("█▓▒░"));
        }
        task_bar.set_prefix("Tasks");

        let attempt_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(spinner_style) =
            ProgressStyle::default_spinner().template("{prefix:.bold.dim} {spinner} {msg}")
        {
            attempt_bar.set_style(spinner_style);
        }
        attempt_bar.set_prefix(" Step");

        Self {
            multi,
            task_bar,
            attempt_bar,
            verbose,
            current_attempt: AtomicU32::new(0),
            max_attempts: AtomicU32::new(0),
        }
    }

    /// Print a line above the bars, falling back to `eprintln!`.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Account for tasks already completed before the run started.
    pub fn set_completed(&self, completed: u64, total: u64) {
        self.task_bar.set_length(total);
        self.task_bar.set_position(completed);
    }

    /// Show the task about to be worked on and start the spinner.
    pub fn start_task(&self, id: &str, title: &str, attempt: u32, max: u32) {
        self.current_attempt.store(attempt, Ordering::SeqCst);
        self.max_attempts.store(max, Ordering::SeqCst);
        self.task_bar
            .set_message(format!("{}: {}", style(id).yellow(), title));
        self.attempt_bar.set_message(format!(
            "Attempt {}/{} {}",
            style(attempt).cyan(),
            max,
            style("(starting...)").dim()
        ));
        self.attempt_bar
            .enable_steady_tick(Duration::from_millis(100));
    }

    /// Update the spinner with a short status string.
    pub fn log_step(&self, msg: &str) {
        let attempt = self.current_attempt.load(Ordering::SeqCst);
        let max = self.max_attempts.load(Ordering::SeqCst);
        self.attempt_bar.set_message(format!(
            "Attempt {}/{} {}",
            style(attempt).cyan(),
            max,
            style(format!("({})", msg)).dim()
        ));
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    pub fn task_passed(&self, id: &str) {
        self.task_bar.inc(1);
        self.attempt_bar.set_message("");
        self.print_line(format!("{} Task {} completed", CHECK, style(id).green().bold()));
    }

    /// Split parents resolved by their sub-tasks.
    pub fn tasks_resolved(&self, ids: &[String]) {
        for id in ids {
            self.task_bar.inc(1);
            self.print_line(format!(
                "{} Task {} completed via its sub-tasks",
                SPARKLE,
                style(id).green().bold()
            ));
        }
    }

    /// Report a failed attempt and what the controller decided.
    pub fn attempt_failed(&self, id: &str, stage: &str, decision: Decision) {
        let icon = match decision {
            Decision::Retry => PIVOT,
            Decision::Split => SPLIT,
            Decision::Abandon => CROSS,
        };
        self.print_line(format!(
            "{} Task {} failed at {} -> {}",
            icon,
            style(id).red().bold(),
            style(stage).yellow(),
            decision
        ));
    }

    /// Sub-tasks were added to the graph.
    pub fn task_split(&self, id: &str, subtasks: &[String]) {
        self.task_bar.inc_length(subtasks.len() as u64);
        self.print_line(format!(
            "{} Task {} split into {}",
            SPLIT,
            style(id).yellow().bold(),
            subtasks.join(", ")
        ));
    }

    pub fn show_blocker(&self, description: &str) {
        self.print_line(format!(
            "{} {}",
            BLOCKER,
            style(description).red().bold()
        ));
    }

    /// Stop both bars.
    pub fn finish(&self, message: &str) {
        self.attempt_bar.finish_and_clear();
        self.task_bar.finish_with_message(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_ui_tracks_progress() {
        let ui = RunUI::hidden(2);
        ui.set_completed(1, 2);
        ui.start_task("B", "Main lemma", 1, 3);
        ui.log_step("verifying");
        ui.attempt_failed("B", "build", Decision::Retry);
        ui.task_split("B", &["B1".to_string(), "B2".to_string()]);
        assert_eq!(ui.task_bar.length(), Some(4));
        ui.task_passed("B1");
        assert_eq!(ui.task_bar.position(), 2);
        ui.finish("done");
    }
}
